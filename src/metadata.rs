//! Sidecar records describing how an output was produced.
//!
//! Every path written to a sidecar is relative to the sidecar's own
//! directory, so a tree can be moved as a whole without breaking its
//! records. Older layouts are migrated to the current one on read.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::merge::{MergeParameters, SpacerSource};
use crate::models::{TrimSpec, FADE_SECONDS, TARGET_PEAK_DB};
use crate::paths;
use crate::trim::TrimParameters;

/// Layout written by [`write_report`].
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Parameters of the operation, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationParameters {
    Trim(TrimParameters),
    Merge(MergeParameters),
}

/// In-memory report. Paths here are as the job saw them; they are
/// relativized on write and resolved again on read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub source: Option<PathBuf>,
    pub destination: PathBuf,
    pub parameters: OperationParameters,
    /// Local time, minute precision (`2024-03-01 12:30`).
    pub created_at: Option<String>,
    /// Constituent basenames, in order, for merges.
    pub members: Vec<String>,
}

impl JobReport {
    fn map_paths(&self, f: &dyn Fn(&Path) -> PathBuf) -> JobReport {
        let parameters = match &self.parameters {
            OperationParameters::Trim(trim) => OperationParameters::Trim(trim.clone()),
            OperationParameters::Merge(merge) => {
                let mut merge = merge.clone();
                merge.inputs = merge.inputs.iter().map(|p| f(p)).collect();
                if let SpacerSource::File { path } = &mut merge.spacer {
                    *path = f(path);
                }
                merge.concat_target = f(&merge.concat_target);
                if let Some(transcode) = &mut merge.transcode {
                    transcode.destination = f(&transcode.destination);
                }
                OperationParameters::Merge(merge)
            }
        };
        JobReport {
            source: self.source.as_deref().map(f),
            destination: f(&self.destination),
            parameters,
            created_at: self.created_at.clone(),
            members: self.members.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReportV3 {
    schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_reference: Option<PathBuf>,
    destination_reference: PathBuf,
    operation_parameters: OperationParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    members: Vec<String>,
}

/// First trim layout: window only, destination possibly absolute.
#[derive(Debug, Deserialize)]
struct ReportV1 {
    src_file: PathBuf,
    destination: PathBuf,
    start: f64,
    duration: f64,
}

/// Second trim layout: the raw argument vector.
#[derive(Debug, Deserialize)]
struct ReportV2 {
    src_file: PathBuf,
    destination: PathBuf,
    sox_args: Vec<String>,
}

/// Serialize `report` to `sidecar`, replacing whatever was there.
pub fn write_report(report: &JobReport, sidecar: &Path) -> Result<()> {
    let relative = report.map_paths(&|p| paths::relativize(sidecar, p));
    let persisted = ReportV3 {
        schema_version: CURRENT_SCHEMA_VERSION,
        source_reference: relative.source,
        destination_reference: relative.destination,
        operation_parameters: relative.parameters,
        created_at: relative.created_at,
        members: relative.members,
    };
    let yaml = serde_yaml::to_string(&persisted).map_err(|e| write_error(sidecar, e.to_string()))?;
    std::fs::write(sidecar, yaml).map_err(|e| write_error(sidecar, e.to_string()))
}

/// Load a sidecar of any known layout, migrated to the current one, with
/// paths resolved against the sidecar's directory.
pub fn read_report(sidecar: &Path) -> Result<JobReport> {
    let text = std::fs::read_to_string(sidecar).map_err(|e| read_error(sidecar, e.to_string()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|e| read_error(sidecar, e.to_string()))?;
    let version = schema_version(&value).ok_or_else(|| read_error(sidecar, "missing schema version".to_string()))?;
    let base = paths::parent_dir(sidecar);

    let relative = match version {
        1 => from_v1(decode(sidecar, value)?, base),
        2 => from_v2(decode(sidecar, value)?, sidecar)?,
        3 => from_v3(decode(sidecar, value)?),
        found => {
            return Err(PipelineError::UnsupportedSchema {
                found,
                newest: CURRENT_SCHEMA_VERSION,
            })
        }
    };
    Ok(relative.map_paths(&|p| paths::resolve(base, p)))
}

fn schema_version(value: &serde_yaml::Value) -> Option<u64> {
    value
        .get("schema_version")
        .or_else(|| value.get("_version"))
        .and_then(serde_yaml::Value::as_u64)
}

fn decode<T: serde::de::DeserializeOwned>(sidecar: &Path, value: serde_yaml::Value) -> Result<T> {
    serde_yaml::from_value(value).map_err(|e| read_error(sidecar, e.to_string()))
}

fn from_v3(record: ReportV3) -> JobReport {
    JobReport {
        source: record.source_reference,
        destination: record.destination_reference,
        parameters: record.operation_parameters,
        created_at: record.created_at,
        members: record.members,
    }
}

fn from_v1(record: ReportV1, base: &Path) -> JobReport {
    // Absolute destinations are made relative so the migrated record
    // follows the same rule as a freshly written one.
    let destination = if record.destination.is_absolute() && base.is_absolute() {
        paths::relative_path(base, &record.destination)
    } else {
        record.destination
    };
    JobReport {
        source: Some(record.src_file),
        destination,
        parameters: OperationParameters::Trim(TrimParameters {
            program: "sox".to_string(),
            window: TrimSpec {
                start_seconds: record.start,
                duration_seconds: record.duration,
                fade_seconds: FADE_SECONDS,
                peak_db: TARGET_PEAK_DB,
            },
            normalize: None,
        }),
        created_at: None,
        members: Vec::new(),
    }
}

fn from_v2(record: ReportV2, sidecar: &Path) -> Result<JobReport> {
    let args = &record.sox_args;
    let program = args
        .first()
        .cloned()
        .ok_or_else(|| read_error(sidecar, "empty sox_args".to_string()))?;

    let value_after = |keyword: &str, offset: usize| -> Option<f64> {
        let index = args.iter().position(|a| a == keyword)?;
        args.get(index + offset)?.parse().ok()
    };
    let start_seconds = value_after("trim", 1)
        .ok_or_else(|| read_error(sidecar, "sox_args has no trim window".to_string()))?;
    let duration_seconds = value_after("trim", 2)
        .ok_or_else(|| read_error(sidecar, "sox_args has no trim duration".to_string()))?;

    Ok(JobReport {
        source: Some(record.src_file),
        destination: record.destination,
        parameters: OperationParameters::Trim(TrimParameters {
            program,
            window: TrimSpec {
                start_seconds,
                duration_seconds,
                fade_seconds: value_after("fade", 2).unwrap_or(FADE_SECONDS),
                peak_db: value_after("gain", 2).unwrap_or(TARGET_PEAK_DB),
            },
            normalize: None,
        }),
        created_at: None,
        members: Vec::new(),
    })
}

fn write_error(path: &Path, reason: String) -> PipelineError {
    PipelineError::MetadataWrite {
        path: path.to_path_buf(),
        reason,
    }
}

fn read_error(path: &Path, reason: String) -> PipelineError {
    PipelineError::MetadataRead {
        path: path.to_path_buf(),
        reason,
    }
}
