//! Hook file discovery

use crate::config::HookfilesPattern;
use crate::error::HooksError;
use path_absolutize::Absolutize;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

/// Expand the configured patterns into absolute hook file paths.
///
/// Patterns are resolved against `base_dir`. The result is sorted and free of
/// duplicates; a pattern matching nothing contributes nothing. Without a
/// pattern the filesystem is not touched at all.
pub fn resolve_hookfiles(
    patterns: Option<&HookfilesPattern>,
    base_dir: &Path,
) -> Result<Vec<PathBuf>, HooksError> {
    let Some(patterns) = patterns else {
        return Ok(Vec::new());
    };

    let mut files = BTreeSet::new();
    for pattern in patterns.iter() {
        let absolute = Path::new(pattern)
            .absolutize_from(base_dir)
            .map_err(|err| resolution_error(pattern, err))?;
        let absolute = absolute.to_string_lossy();

        let matches = glob::glob(&absolute).map_err(|err| resolution_error(pattern, err))?;
        let before = files.len();
        for entry in matches {
            let path = entry.map_err(|err| resolution_error(pattern, err))?;
            files.insert(path);
        }
        tracing::debug!(
            "Hookfiles pattern '{}' matched {} file(s)",
            pattern,
            files.len() - before
        );
    }

    Ok(files.into_iter().collect())
}

fn resolution_error(pattern: &str, cause: impl std::fmt::Display) -> HooksError {
    HooksError::Resolution {
        pattern: pattern.to_string(),
        cause: cause.to_string(),
    }
}
