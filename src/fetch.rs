use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::SourceAsset;

/// One entry of the remote song list. Only `filename` is required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SongEntry {
    pub filename: String,
}

/// Remote song retrieval: one GET for the list, one per song.
pub trait SongFetcher {
    fn song_list(&self, url: &str) -> Result<Vec<SongEntry>>;
    fn download(&self, url: &str, target: &Path) -> Result<()>;
}

/// Blocking HTTP fetcher with a per-request deadline.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("expeditious/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(url, e))
    }
}

impl SongFetcher for HttpFetcher {
    fn song_list(&self, url: &str) -> Result<Vec<SongEntry>> {
        let body = self.get(url)?.text().map_err(|e| fetch_error(url, e))?;
        parse_song_list(&body).map_err(|e| PipelineError::Fetch {
            url: url.to_string(),
            reason: format!("invalid song list: {}", e),
        })
    }

    fn download(&self, url: &str, target: &Path) -> Result<()> {
        let mut response = self.get(url)?;
        let mut file = File::create(target)?;
        response.copy_to(&mut file).map_err(|e| fetch_error(url, e))?;
        Ok(())
    }
}

fn fetch_error(url: &str, e: reqwest::Error) -> PipelineError {
    PipelineError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

pub fn parse_song_list(body: &str) -> serde_json::Result<Vec<SongEntry>> {
    serde_json::from_str(body)
}

/// `<base><filename>.<extension>`
pub fn song_url(base: &str, filename: &str, extension: &str) -> String {
    format!("{}{}.{}", base, filename, extension)
}

/// Filenames of the remote song list, in list order.
pub fn list_songs(fetcher: &dyn SongFetcher, list_url: &str) -> Result<Vec<String>> {
    info!(url = list_url, "fetching song list");
    let entries = fetcher.song_list(list_url)?;
    info!(count = entries.len(), "songs found");
    Ok(entries.into_iter().map(|e| e.filename).collect())
}

/// Download each of `filenames` into `workdir`, in order.
///
/// The first failure aborts the whole batch.
pub fn download_all(
    fetcher: &dyn SongFetcher,
    base_url: &str,
    extension: &str,
    filenames: &[String],
    workdir: &Path,
) -> Result<Vec<SourceAsset>> {
    let mut songs = Vec::with_capacity(filenames.len());
    for filename in filenames {
        let url = song_url(base_url, filename, extension);
        let target = local_target(workdir, filename, extension).ok_or_else(|| PipelineError::Fetch {
            url: url.clone(),
            reason: format!("unusable filename {:?}", filename),
        })?;
        info!(url = %url, "downloading song");
        fetcher.download(&url, &target)?;
        songs.push(SourceAsset::new(target));
    }
    Ok(songs)
}

/// Where a downloaded song lands: directory parts of the remote name are
/// dropped.
pub fn local_target(workdir: &Path, filename: &str, extension: &str) -> Option<PathBuf> {
    let name = format!("{}.{}", filename, extension);
    Path::new(&name).file_name().map(|n| workdir.join(n))
}
