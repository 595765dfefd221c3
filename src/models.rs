use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Fade length at both edges of a trim, in seconds (half-sine).
pub const FADE_SECONDS: f64 = 1.5;

/// Peak level trimmed output is normalized to.
pub const TARGET_PEAK_DB: f64 = -1.0;

/// Sample rate and channel count reported by probing a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeInfo {
    pub sample_rate: u32,
    pub channels: Option<u16>,
}

/// An audio file on disk. Never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAsset {
    path: PathBuf,
    probe: Option<ProbeInfo>,
}

impl SourceAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            probe: None,
        }
    }

    pub fn with_probe(self, probe: ProbeInfo) -> Self {
        Self {
            probe: Some(probe),
            ..self
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn probe(&self) -> Option<ProbeInfo> {
        self.probe
    }

    /// File name without directory, as recorded in merge metadata.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Fail fast unless the file exists and is a regular file.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(PipelineError::SourceNotFound(self.path.clone()))
        }
    }
}

/// Trim window plus the fixed fade and peak settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimSpec {
    pub start_seconds: f64,
    pub duration_seconds: f64,
    pub fade_seconds: f64,
    pub peak_db: f64,
}

impl TrimSpec {
    /// The window is not checked against the source length; the external
    /// tool decides how to truncate.
    pub fn new(start_seconds: f64, duration_seconds: f64) -> Result<Self> {
        if !start_seconds.is_finite() || start_seconds < 0.0 {
            return Err(PipelineError::InvalidTrim(format!(
                "start must be a non-negative number of seconds, got {}",
                start_seconds
            )));
        }
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(PipelineError::InvalidTrim(format!(
                "duration must be a positive number of seconds, got {}",
                duration_seconds
            )));
        }
        Ok(Self {
            start_seconds,
            duration_seconds,
            fade_seconds: FADE_SECONDS,
            peak_db: TARGET_PEAK_DB,
        })
    }
}

/// Songs in play order, each followed by the shared spacer.
#[derive(Debug, Clone)]
pub struct MergePlan {
    songs: Vec<SourceAsset>,
    spacer: SourceAsset,
}

impl MergePlan {
    pub fn new(songs: Vec<SourceAsset>, spacer: SourceAsset) -> Result<Self> {
        if songs.is_empty() {
            return Err(PipelineError::EmptyMerge);
        }
        Ok(Self { songs, spacer })
    }

    pub fn songs(&self) -> &[SourceAsset] {
        &self.songs
    }

    pub fn spacer(&self) -> &SourceAsset {
        &self.spacer
    }

    /// Basenames of the songs, in order.
    pub fn members(&self) -> Vec<String> {
        self.songs.iter().map(SourceAsset::basename).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_spec_fixed_settings() {
        let spec = TrimSpec::new(10.0, 30.0).unwrap();
        assert_eq!(spec.fade_seconds, 1.5);
        assert_eq!(spec.peak_db, -1.0);
    }

    #[test]
    fn test_trim_spec_rejects_bad_window() {
        assert!(matches!(TrimSpec::new(-1.0, 30.0), Err(PipelineError::InvalidTrim(_))));
        assert!(matches!(TrimSpec::new(0.0, 0.0), Err(PipelineError::InvalidTrim(_))));
        assert!(matches!(TrimSpec::new(0.0, f64::NAN), Err(PipelineError::InvalidTrim(_))));
        assert!(TrimSpec::new(0.0, 45.0).is_ok());
    }

    #[test]
    fn test_merge_plan_requires_songs() {
        let err = MergePlan::new(vec![], SourceAsset::new("silence.wav")).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyMerge));
    }

    #[test]
    fn test_merge_plan_members_keep_order() {
        let plan = MergePlan::new(
            vec![SourceAsset::new("/s/2.ogg"), SourceAsset::new("/s/1.ogg")],
            SourceAsset::new("/s/silence.wav"),
        )
        .unwrap();
        assert_eq!(plan.members(), vec!["2.ogg", "1.ogg"]);
    }

    #[test]
    fn test_source_asset_missing() {
        let asset = SourceAsset::new("/no/such/file.wav");
        assert!(matches!(asset.ensure_exists(), Err(PipelineError::SourceNotFound(_))));
    }
}
