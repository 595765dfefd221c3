use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{Datelike, NaiveDate};

use crate::merge::MonthLocale;

/// Suffix appended to the source stem for trimmed output.
pub const TRIM_SUFFIX: &str = "_trimmed";

/// Trimmed output is always lossless, whatever the source container.
pub const LOSSLESS_EXTENSION: &str = "flac";

pub const SIDECAR_EXTENSION: &str = "yaml";

const NORMALIZED_SUFFIX: &str = "_normalized";
const CONVERT_SUFFIX: &str = "_convert";

/// Default destination for a trim: `<dir>/<stem>_trimmed.flac`.
/// An explicit override always wins.
pub fn trim_destination(source: &Path, override_dst: Option<&Path>) -> PathBuf {
    if let Some(dst) = override_dst {
        return dst.to_path_buf();
    }
    with_stem_suffix(source, TRIM_SUFFIX, LOSSLESS_EXTENSION)
}

/// Sidecar for a media file: same directory and stem, `.yaml` extension.
pub fn sidecar_path(media: &Path) -> PathBuf {
    media.with_extension(SIDECAR_EXTENSION)
}

/// Intermediate WAV used by the loudness-aware trim.
pub fn normalized_intermediate(source: &Path) -> PathBuf {
    with_stem_suffix(source, NORMALIZED_SUFFIX, "wav")
}

/// Intermediate WAV used by the multi-format conversion.
pub fn convert_intermediate(source: &Path) -> PathBuf {
    with_stem_suffix(source, CONVERT_SUFFIX, "wav")
}

/// Name of a compilation built on `date`, e.g. `2024.03.01 - mars`.
pub fn merge_stem(date: NaiveDate, locale: Option<MonthLocale>) -> String {
    let stamp = date.format("%Y.%m.%d").to_string();
    match locale.and_then(|l| l.month_name(date.month())) {
        Some(month) => format!("{} - {}", stamp, month),
        None => stamp,
    }
}

fn with_stem_suffix(source: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    source.with_file_name(format!("{}{}.{}", stem, suffix, extension))
}

/// Lexically normalize a path: drop `.` and fold `name/..` pairs.
/// Leading `..` on relative paths is kept; `..` above the root is dropped.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Make a path absolute against the working directory and normalize it.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    Ok(normalize(&std::path::absolute(path)?))
}

/// Express `target` relative to the directory `base_dir`.
///
/// Both paths are normalized first. When they cannot be related (one
/// absolute and one relative, different prefixes, or a base that climbs
/// above its own start) the normalized target is returned unchanged.
pub fn relative_path(base_dir: &Path, target: &Path) -> PathBuf {
    let base = normalize(base_dir);
    let target = normalize(target);

    if base.is_absolute() != target.is_absolute() {
        return target;
    }

    let base_parts: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();
    let target_parts: Vec<Component> = target.components().filter(|c| *c != Component::CurDir).collect();

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if base.is_absolute() && common == 0 {
        return target;
    }
    if base_parts[common..].iter().any(|c| *c == Component::ParentDir) {
        return target;
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

/// Path of `to` relative to the directory containing `from`.
pub fn relativize(from: &Path, to: &Path) -> PathBuf {
    relative_path(parent_dir(from), to)
}

/// Resolve a sidecar-relative reference back against `base_dir`.
pub fn resolve(base_dir: &Path, reference: &Path) -> PathBuf {
    normalize(&base_dir.join(reference))
}

/// Directory containing `path`; `.` for bare file names.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Reduce an untrusted name, such as a tag value, to a single path
/// component. Separators become `_`; surrounding whitespace and leading
/// dots are dropped. `None` when nothing usable is left.
pub fn path_component(name: &str) -> Option<String> {
    let replaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let cleaned = replaced.trim().trim_start_matches('.').trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}
