use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{Config, OutputFormat};
use crate::error::{PipelineError, Result};
use crate::models::SourceAsset;
use crate::paths;
use crate::process::{CommandRunner, Invocation, ScratchFile};
use crate::tags::TagSet;

#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    pub artist: String,
    pub title: Option<String>,
    pub outputs: Vec<PathBuf>,
}

/// Render `source` to `intermediate` WAV, then encode it once per
/// configured format into `<target_dir>/<artist>/<stem><ext>`. The WAV is
/// removed afterwards.
pub fn convert(
    config: &Config,
    runner: &dyn CommandRunner,
    source: &SourceAsset,
    tags: &TagSet,
    intermediate: &Path,
) -> Result<ConvertOutcome> {
    source.ensure_exists()?;
    let artist = tags
        .artist()
        .map(str::to_string)
        .ok_or_else(|| PipelineError::SourceRejected {
            path: source.path().to_path_buf(),
            reason: "no artist tag".to_string(),
        })?;
    let folder = paths::path_component(&artist).ok_or_else(|| PipelineError::SourceRejected {
        path: source.path().to_path_buf(),
        reason: format!("unusable artist tag {:?}", artist),
    })?;

    let _scratch = ScratchFile::new(intermediate.to_path_buf());
    runner.run(&Invocation::new(
        config.tools.sox.clone(),
        vec![path_arg(source.path()), path_arg(intermediate)],
    ))?;

    let target_dir = paths::absolutize(&config.convert.target_dir)?.join(&folder);
    std::fs::create_dir_all(&target_dir)?;
    let stem = source
        .path()
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut outputs = Vec::with_capacity(config.convert.formats.len());
    for format in &config.convert.formats {
        let target = target_dir.join(format!("{}{}", stem, format.extension));
        runner.run(&format_invocation(format, intermediate, &target))?;
        info!(target = %target.display(), "converted");
        outputs.push(target);
    }

    Ok(ConvertOutcome {
        artist,
        title: tags.title().map(str::to_string),
        outputs,
    })
}

/// `<application> <arguments...> <source> <target>`
pub fn format_invocation(format: &OutputFormat, source: &Path, target: &Path) -> Invocation {
    let mut args = format.arguments.clone();
    args.push(path_arg(source));
    args.push(path_arg(target));
    Invocation::new(format.application.clone(), args)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
