use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("source rejected: {}: {reason}", .path.display())]
    SourceRejected { path: PathBuf, reason: String },

    #[error(
        "external tool failed: `{command} {}` ({}){}",
        .arguments.join(" "),
        describe_status(.status),
        output_suffix(.captured_output)
    )]
    ExternalTool {
        command: String,
        arguments: Vec<String>,
        status: Option<i32>,
        captured_output: String,
    },

    #[error("external tool timed out after {timeout_ms}ms: `{command} {}`", .arguments.join(" "))]
    ExternalToolTimeout {
        command: String,
        arguments: Vec<String>,
        timeout_ms: u64,
    },

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("cannot write metadata sidecar {}: {reason}", .path.display())]
    MetadataWrite { path: PathBuf, reason: String },

    #[error("cannot read metadata sidecar {}: {reason}", .path.display())]
    MetadataRead { path: PathBuf, reason: String },

    #[error("unsupported metadata schema version {found} (newest supported is {newest})")]
    UnsupportedSchema { found: u64, newest: u32 },

    #[error("merge requires at least one song")]
    EmptyMerge,

    #[error("invalid trim: {0}")]
    InvalidTrim(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "failed to launch".to_string(),
    }
}

fn output_suffix(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("; output: {}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_tool_message_names_command_and_arguments() {
        let err = PipelineError::ExternalTool {
            command: "sox".to_string(),
            arguments: vec!["in.wav".to_string(), "out.flac".to_string()],
            status: Some(2),
            captured_output: "sox FAIL formats: can't open input file\n".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("`sox in.wav out.flac`"), "{text}");
        assert!(text.contains("exit status 2"), "{text}");
        assert!(text.contains("can't open input file"), "{text}");
    }

    #[test]
    fn test_launch_failure_message() {
        let err = PipelineError::ExternalTool {
            command: "lame".to_string(),
            arguments: vec![],
            status: None,
            captured_output: String::new(),
        };
        let text = err.to_string();
        assert!(text.contains("failed to launch"), "{text}");
        assert!(!text.contains("output:"), "{text}");
    }

    #[test]
    fn test_fetch_message_names_url() {
        let err = PipelineError::Fetch {
            url: "http://example.org/songs.json".to_string(),
            reason: "404 Not Found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "fetch failed for http://example.org/songs.json: 404 Not Found"
        );
    }
}
