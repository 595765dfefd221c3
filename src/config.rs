//! Run configuration, loaded once from TOML and passed by reference.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::merge::MonthLocale;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "expeditious.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub trim: TrimConfig,
    pub merge: MergeConfig,
    pub convert: ConvertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub sox: String,
    pub transcoder: String,
    pub normalizer: String,
    /// Deadline for every child process; `None` waits forever.
    pub command_timeout_secs: Option<u64>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sox: "sox".to_string(),
            transcoder: "lame".to_string(),
            normalizer: "normalize-audio".to_string(),
            command_timeout_secs: Some(600),
        }
    }
}

impl ToolsConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Reject sources whose probed sample rate differs.
    pub required_sample_rate: Option<u32>,
    /// RMS level handed to the normalizer (e.g. `-12dBFS`). When set the
    /// source is normalized before it is trimmed.
    pub normalize_rms: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// JSON array of `{"filename": ...}` objects.
    pub song_list_url: Option<String>,
    /// Prefix each filename is appended to when downloading.
    pub song_base_url: Option<String>,
    pub song_extension: String,
    /// Where compilations are written.
    pub music_dest_dir: PathBuf,
    /// Pre-made spacer; generated per run when absent.
    pub silence_file: Option<PathBuf>,
    pub silence_seconds: f64,
    pub silence_sample_rate: u32,
    pub silence_channels: u16,
    pub month_names: bool,
    pub month_locale: MonthLocale,
    pub fetch_timeout_secs: u64,
    pub show_progress: bool,
    /// Container of the concatenated (pre-transcode) file.
    pub concat_extension: String,
    pub transcode: TranscodeConfig,
    pub publish: PublishConfig,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            song_list_url: None,
            song_base_url: None,
            song_extension: "mp3".to_string(),
            music_dest_dir: PathBuf::from("."),
            silence_file: None,
            silence_seconds: 3.0,
            silence_sample_rate: 44100,
            silence_channels: 2,
            month_names: true,
            month_locale: MonthLocale::Norwegian,
            fetch_timeout_secs: 30,
            show_progress: false,
            concat_extension: "flac".to_string(),
            transcode: TranscodeConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl MergeConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn month_locale(&self) -> Option<MonthLocale> {
        self.month_names.then_some(self.month_locale)
    }

    pub fn transcode(&self) -> Option<&TranscodeConfig> {
        self.transcode.enabled.then_some(&self.transcode)
    }

    /// The full-resolution merge and the transcoded copy must be different
    /// files.
    pub fn validate(&self) -> Result<()> {
        if let Some(transcode) = self.transcode() {
            if transcode.extension.eq_ignore_ascii_case(&self.concat_extension) {
                return Err(PipelineError::Config(format!(
                    "merge.concat_extension and merge.transcode.extension are both {:?}; \
                     the transcoder would overwrite its own input",
                    transcode.extension
                )));
            }
        }
        Ok(())
    }
}

/// Fixed quality and tags for the distribution copy. The year tag is
/// always the run year.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// When off, the concatenated file is the final output.
    pub enabled: bool,
    pub quality: String,
    pub extension: String,
    pub title: String,
    pub artist: String,
    pub comment: String,
    pub album: String,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: "-V2".to_string(),
            extension: "mp3".to_string(),
            title: "Toppsang".to_string(),
            artist: "Telemark".to_string(),
            comment: "Compiled by expeditious".to_string(),
            album: "Toppsanger".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Extra directory the final compilation is copied into.
    pub copy_to: Option<PathBuf>,
    /// JSON pointer file naming the newest compilation.
    pub top_meta: Option<PathBuf>,
    /// Public URL prefix used in the pointer file.
    pub public_url_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Output lands in `<target_dir>/<artist>/`.
    pub target_dir: PathBuf,
    pub formats: Vec<OutputFormat>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("."),
            formats: vec![
                OutputFormat {
                    application: "sox".to_string(),
                    arguments: vec![],
                    extension: ".flac".to_string(),
                },
                OutputFormat {
                    application: "lame".to_string(),
                    arguments: vec!["-V2".to_string()],
                    extension: ".mp3".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub application: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    pub extension: String,
}

impl Config {
    /// Load from `path`, or from `expeditious.toml` in the working
    /// directory, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        };

        let Some(file) = candidate else {
            debug!("no config file found, using defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&file)
            .map_err(|e| PipelineError::Config(format!("read {} failed: {}", file.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", file.display(), e)))?;
        config.merge.validate()?;
        info!(path = %file.display(), "loaded configuration");
        debug!(?config, "configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
