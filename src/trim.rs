use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::metadata::{self, JobReport, OperationParameters};
use crate::models::{ProbeInfo, SourceAsset, TrimSpec};
use crate::paths;
use crate::process::{CommandRunner, Invocation, ScratchFile};

/// Separate loudness pass run before trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeParameters {
    pub program: String,
    pub rms_level: String,
}

/// Everything needed to redo a trim, given its source and destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimParameters {
    pub program: String,
    pub window: TrimSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<NormalizeParameters>,
}

impl TrimParameters {
    /// The commands, in order, that turn `source` into `destination`.
    ///
    /// With a normalize pass the source is first rendered to an
    /// intermediate WAV, normalized in place, then trimmed without the
    /// peak gain step.
    pub fn invocations(&self, source: &Path, destination: &Path) -> Vec<Invocation> {
        match &self.normalize {
            None => vec![trim_invocation(&self.program, source, destination, &self.window, true)],
            Some(normalize) => {
                let intermediate = paths::normalized_intermediate(source);
                vec![
                    Invocation::new(self.program.clone(), vec![path_arg(source), path_arg(&intermediate)]),
                    Invocation::new(
                        normalize.program.clone(),
                        vec!["-a".to_string(), normalize.rms_level.clone(), path_arg(&intermediate)],
                    ),
                    trim_invocation(&self.program, &intermediate, destination, &self.window, false),
                ]
            }
        }
    }
}

/// `sox <src> <dst> trim <start> <dur> [gain -n <peak>] fade h <fade> <dur>`
pub fn trim_invocation(program: &str, source: &Path, destination: &Path, spec: &TrimSpec, with_gain: bool) -> Invocation {
    let mut args = vec![
        path_arg(source),
        path_arg(destination),
        "trim".to_string(),
        format_seconds(spec.start_seconds),
        format_seconds(spec.duration_seconds),
    ];
    if with_gain {
        args.extend(["gain".to_string(), "-n".to_string(), format_level(spec.peak_db)]);
    }
    args.extend([
        "fade".to_string(),
        "h".to_string(),
        format_seconds(spec.fade_seconds),
        format_seconds(spec.duration_seconds),
    ]);
    Invocation::new(program, args)
}

/// Seconds always carry a decimal point: `10.0`, `1.5`.
pub fn format_seconds(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Whole decibel levels print without a fraction: `-1`.
fn format_level(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Pull `Sample Rate` and `Channels` out of `sox --i` output.
pub fn parse_probe(output: &str) -> Option<ProbeInfo> {
    let mut sample_rate = None;
    let mut channels = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Sample Rate" => sample_rate = value.trim().parse().ok(),
            "Channels" => channels = value.trim().parse().ok(),
            _ => {}
        }
    }
    sample_rate.map(|sample_rate| ProbeInfo { sample_rate, channels })
}

pub fn probe(runner: &dyn CommandRunner, program: &str, source: &Path) -> Result<ProbeInfo> {
    let invocation = Invocation::new(program, vec!["--i".to_string(), path_arg(source)]);
    let output = runner.run(&invocation)?;
    parse_probe(&output.stdout).ok_or_else(|| PipelineError::SourceRejected {
        path: source.to_path_buf(),
        reason: "no sample rate reported by probe".to_string(),
    })
}

/// A trim that has been set up but not checked.
pub struct TrimJob<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    source: SourceAsset,
    destination: PathBuf,
    spec: TrimSpec,
}

/// Source exists and passed the sample-rate gate.
pub struct ValidatedTrim<'a> {
    job: TrimJob<'a>,
}

/// External tool ran successfully.
pub struct ProcessedTrim {
    source: SourceAsset,
    destination: PathBuf,
    parameters: TrimParameters,
    invocations: Vec<Invocation>,
}

/// Trim finished and its sidecar written.
#[derive(Debug, Clone)]
pub struct TrimOutcome {
    pub destination: PathBuf,
    pub sidecar: PathBuf,
    pub report: JobReport,
    pub invocations: Vec<Invocation>,
}

impl<'a> TrimJob<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn CommandRunner,
        source: SourceAsset,
        destination: PathBuf,
        spec: TrimSpec,
    ) -> Self {
        Self {
            config,
            runner,
            source,
            destination,
            spec,
        }
    }

    pub fn validate(self) -> Result<ValidatedTrim<'a>> {
        self.source.ensure_exists()?;

        let Some(required) = self.config.trim.required_sample_rate else {
            return Ok(ValidatedTrim { job: self });
        };

        let probed = probe(self.runner, &self.config.tools.sox, self.source.path())?;
        if probed.sample_rate != required {
            warn!(
                path = %self.source.path().display(),
                sample_rate = probed.sample_rate,
                required,
                "rejecting source"
            );
            return Err(PipelineError::SourceRejected {
                path: self.source.path().to_path_buf(),
                reason: format!("sample rate {} Hz, expected {} Hz", probed.sample_rate, required),
            });
        }
        let source = self.source.with_probe(probed);
        Ok(ValidatedTrim {
            job: TrimJob { source, ..self },
        })
    }
}

impl<'a> ValidatedTrim<'a> {
    pub fn source(&self) -> &SourceAsset {
        &self.job.source
    }

    pub fn parameters(&self) -> TrimParameters {
        let config = self.job.config;
        TrimParameters {
            program: config.tools.sox.clone(),
            window: self.job.spec,
            normalize: config.trim.normalize_rms.as_ref().map(|level| NormalizeParameters {
                program: config.tools.normalizer.clone(),
                rms_level: level.clone(),
            }),
        }
    }

    pub fn process(self) -> Result<ProcessedTrim> {
        let parameters = self.parameters();
        let TrimJob {
            runner,
            source,
            destination,
            ..
        } = self.job;

        let invocations = parameters.invocations(source.path(), &destination);
        let _scratch = parameters
            .normalize
            .is_some()
            .then(|| ScratchFile::new(paths::normalized_intermediate(source.path())));
        for invocation in &invocations {
            runner.run(invocation)?;
        }
        info!(destination = %destination.display(), "trimmed");

        Ok(ProcessedTrim {
            source,
            destination,
            parameters,
            invocations,
        })
    }
}

impl ProcessedTrim {
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Write the reproducibility record to `sidecar`, replacing any old one.
    pub fn report(self, sidecar: &Path) -> Result<TrimOutcome> {
        let report = JobReport {
            source: Some(self.source.path().to_path_buf()),
            destination: self.destination.clone(),
            parameters: OperationParameters::Trim(self.parameters),
            created_at: None,
            members: Vec::new(),
        };
        metadata::write_report(&report, sidecar)?;
        info!(sidecar = %sidecar.display(), "trim data saved");
        Ok(TrimOutcome {
            destination: self.destination,
            sidecar: sidecar.to_path_buf(),
            report,
            invocations: self.invocations,
        })
    }
}
