use std::path::Path;

use crate::convert::ConvertOutcome;
use crate::metadata::{JobReport, OperationParameters};
use crate::process::Invocation;

/// Format a duration in seconds as "M:SS".
pub fn format_duration(secs: f64) -> String {
    let total_secs = secs.round() as u64;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    format!("{}:{:02}", minutes, seconds)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Summary of a finished job: what was made, where the record went, and
/// the exact commands that made it.
pub fn format_report(report: &JobReport, sidecar: &Path, invocations: &[Invocation]) -> String {
    let separator = "\u{2500}".repeat(58);
    let mut output = String::new();

    match &report.parameters {
        OperationParameters::Trim(trim) => {
            let window = &trim.window;
            output.push_str(&format!("{:<12} {}\n", "Operation", "trim"));
            if let Some(source) = &report.source {
                output.push_str(&format!("{:<12} {}\n", "Source", source.display()));
            }
            output.push_str(&format!(
                "{:<12} {} + {} (fade {:.1}s, peak {:.1} dB)\n",
                "Window",
                format_duration(window.start_seconds),
                format_duration(window.duration_seconds),
                window.fade_seconds,
                window.peak_db,
            ));
            if let Some(normalize) = &trim.normalize {
                output.push_str(&format!("{:<12} {}\n", "Normalize", normalize.rms_level));
            }
        }
        OperationParameters::Merge(_) => {
            output.push_str(&format!("{:<12} {}\n", "Operation", "merge"));
            if let Some(created_at) = &report.created_at {
                output.push_str(&format!("{:<12} {}\n", "Created", created_at));
            }
        }
    }

    if !report.members.is_empty() {
        output.push_str(&separator);
        output.push('\n');
        for (i, member) in report.members.iter().enumerate() {
            output.push_str(&format!("{:>3}. {}\n", i + 1, member));
        }
    }

    output.push_str(&separator);
    output.push('\n');
    for invocation in invocations {
        output.push_str(&format!("$ {}\n", invocation));
    }
    output.push_str(&separator);
    output.push('\n');

    output.push_str(&format!(
        "Result:   {}\n\
         Metadata: {}",
        report.destination.display(),
        sidecar.display(),
    ));
    output
}

pub fn format_convert(outcome: &ConvertOutcome) -> String {
    let separator = "\u{2500}".repeat(58);
    let mut output = format!(
        "{:<12} {}\n{:<12} {}\n{}\n",
        "Artist",
        outcome.artist,
        "Title",
        outcome.title.as_deref().unwrap_or("-"),
        separator,
    );
    for path in &outcome.outputs {
        output.push_str(&format!("{}\n", display_name(path)));
    }
    output.push_str(&format!("Number of files: {}", outcome.outputs.len()));
    output
}

/// Format a report as pretty-printed JSON.
pub fn format_json(report: &JobReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}
