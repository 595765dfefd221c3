//! Sequences path resolution, the job, and the sidecar write, and owns
//! cleanup of intermediate files.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::convert::{self, ConvertOutcome};
use crate::error::{PipelineError, Result};
use crate::fetch::SongFetcher;
use crate::merge::{MergeJob, MergeOutcome, MergeSources};
use crate::metadata::{self, JobReport, OperationParameters};
use crate::models::{SourceAsset, TrimSpec};
use crate::paths;
use crate::process::{CommandRunner, ScratchFile};
use crate::tags;
use crate::trim::{TrimJob, TrimOutcome};

#[derive(Debug, Clone)]
pub struct TrimRequest {
    pub input: PathBuf,
    pub start_seconds: f64,
    pub duration_seconds: f64,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub outcome: MergeOutcome,
    pub sidecar: PathBuf,
    pub report: JobReport,
}

/// Pointer to the newest compilation.
#[derive(Debug, Serialize)]
struct TopMeta {
    last_updated: String,
    url: String,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    fetcher: &'a dyn SongFetcher,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn CommandRunner, fetcher: &'a dyn SongFetcher) -> Self {
        Self { config, runner, fetcher }
    }

    pub fn trim(&self, request: &TrimRequest) -> Result<TrimOutcome> {
        let spec = TrimSpec::new(request.start_seconds, request.duration_seconds)?;
        let source = paths::absolutize(&request.input)?;
        let override_dst = request.output.as_deref().map(paths::absolutize).transpose()?;
        let destination = paths::trim_destination(&source, override_dst.as_deref());
        let sidecar = paths::sidecar_path(&source);
        info!(source = %source.display(), "trimming");

        TrimJob::new(self.config, self.runner, SourceAsset::new(source), destination, spec)
            .validate()?
            .process()?
            .report(&sidecar)
    }

    pub fn merge(&self, sources: &MergeSources, run_at: NaiveDateTime) -> Result<MergeSummary> {
        let outcome = MergeJob::new(self.config, self.runner, self.fetcher).run(sources, run_at)?;
        let sidecar = paths::sidecar_path(&outcome.output);
        let report = JobReport {
            source: None,
            destination: outcome.output.clone(),
            parameters: OperationParameters::Merge(outcome.parameters.clone()),
            created_at: Some(run_at.format("%Y-%m-%d %H:%M").to_string()),
            members: outcome.members.clone(),
        };
        metadata::write_report(&report, &sidecar)?;
        info!(output = %outcome.output.display(), sidecar = %sidecar.display(), "compilation finished");

        self.publish(&outcome.output, run_at)?;
        Ok(MergeSummary {
            outcome,
            sidecar,
            report,
        })
    }

    fn publish(&self, output: &Path, run_at: NaiveDateTime) -> Result<()> {
        let publish = &self.config.merge.publish;
        let filename = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Some(dir) = &publish.copy_to {
            std::fs::create_dir_all(dir)?;
            let target = dir.join(&filename);
            std::fs::copy(output, &target)?;
            info!(target = %target.display(), "copied compilation");
        }

        if let Some(top_meta) = &publish.top_meta {
            let pointer = TopMeta {
                last_updated: run_at.format("%Y-%m-%d %H:%M").to_string(),
                url: format!("{}{}", publish.public_url_base.as_deref().unwrap_or(""), filename),
            };
            let json = serde_json::to_string_pretty(&pointer).map_err(|e| PipelineError::MetadataWrite {
                path: top_meta.clone(),
                reason: e.to_string(),
            })?;
            std::fs::write(top_meta, json).map_err(|e| PipelineError::MetadataWrite {
                path: top_meta.clone(),
                reason: e.to_string(),
            })?;
            info!(path = %top_meta.display(), "updated newest-compilation pointer");
        }
        Ok(())
    }

    pub fn convert(&self, input: &Path) -> Result<ConvertOutcome> {
        let source = SourceAsset::new(paths::absolutize(input)?);
        source.ensure_exists()?;
        let tags = tags::read_tags(source.path())?;
        let intermediate = paths::convert_intermediate(source.path());
        convert::convert(self.config, self.runner, &source, &tags, &intermediate)
    }

    /// Redo the operation a sidecar describes, then rewrite the sidecar in
    /// the current layout.
    pub fn replay(&self, sidecar: &Path) -> Result<JobReport> {
        let sidecar = paths::absolutize(sidecar)?;
        let report = metadata::read_report(&sidecar)?;

        match &report.parameters {
            OperationParameters::Trim(parameters) => {
                let source = report.source.clone().ok_or_else(|| PipelineError::MetadataRead {
                    path: sidecar.clone(),
                    reason: "trim record has no source_reference".to_string(),
                })?;
                SourceAsset::new(&source).ensure_exists()?;
                let _scratch = parameters
                    .normalize
                    .is_some()
                    .then(|| ScratchFile::new(paths::normalized_intermediate(&source)));
                for invocation in parameters.invocations(&source, &report.destination) {
                    self.runner.run(&invocation)?;
                }
            }
            OperationParameters::Merge(parameters) => {
                MergeJob::new(self.config, self.runner, self.fetcher).replay(parameters)?;
            }
        }

        metadata::write_report(&report, &sidecar)?;
        info!(sidecar = %sidecar.display(), "replayed");
        Ok(report)
    }
}
