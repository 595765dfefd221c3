use std::fs::File;
use std::path::Path;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision};
use symphonia::core::probe::Hint;

use crate::error::{PipelineError, Result};

/// Spellings of the artist tag across containers, in lookup order.
pub const ARTIST_KEYS: &[&str] = &["artist", "Artist", "ARTIST", "TPE1"];

/// Spellings of the title tag across containers, in lookup order.
pub const TITLE_KEYS: &[&str] = &["Title", "title", "TITLE", "TIT2"];

/// Raw key/value tags read from a file, in container order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSet {
    entries: Vec<(String, String)>,
}

impl TagSet {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Value of the first alternative key that is present.
    pub fn first_of(&self, alternatives: &[&str]) -> Option<&str> {
        alternatives.iter().find_map(|alt| {
            self.entries
                .iter()
                .find(|(key, _)| key == alt)
                .map(|(_, value)| value.as_str())
        })
    }

    pub fn artist(&self) -> Option<&str> {
        self.first_of(ARTIST_KEYS)
    }

    pub fn title(&self) -> Option<&str> {
        self.first_of(TITLE_KEYS)
    }
}

fn collect(revision: &MetadataRevision, entries: &mut Vec<(String, String)>) {
    for tag in revision.tags() {
        entries.push((tag.key.clone(), tag.value.to_string()));
    }
}

/// Read embedded tags from both the container header and the stream.
pub fn read_tags(path: &Path) -> Result<TagSet> {
    let file = File::open(path).map_err(|_| PipelineError::SourceNotFound(path.to_path_buf()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PipelineError::SourceRejected {
            path: path.to_path_buf(),
            reason: format!("cannot read tags: {}", e),
        })?;

    let mut entries = Vec::new();
    if let Some(metadata) = probed.metadata.get() {
        if let Some(revision) = metadata.current() {
            collect(revision, &mut entries);
        }
    }
    if let Some(revision) = probed.format.metadata().current() {
        collect(revision, &mut entries);
    }
    Ok(TagSet::new(entries))
}
