use std::path::{Path, PathBuf};

/// First free path in `dir` among `stem.ext`, `stem(1).ext`, `stem(2).ext`, ...
///
/// An empty `extension` yields names without a dot.
#[must_use]
pub fn unique_download_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    let name = |suffix: Option<u32>| {
        let base = match suffix {
            Some(n) => format!("{stem}({n})"),
            None => stem.to_string(),
        };
        if extension.is_empty() {
            base
        } else {
            format!("{base}.{extension}")
        }
    };

    let first = dir.join(name(None));
    if !first.exists() {
        return first;
    }

    (1..)
        .map(|n| dir.join(name(Some(n))))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Last non-empty path segment of `url`, if it has one.
#[must_use]
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}
