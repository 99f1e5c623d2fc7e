use std::path::PathBuf;

use tracing::warn;

/// Expand a glob pattern to absolute paths of regular files.
///
/// A malformed pattern is an error; entries that cannot be read while
/// walking are logged and skipped.
pub fn expand(pattern: &str) -> Result<Vec<PathBuf>, glob::PatternError> {
    let mut paths = Vec::new();

    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) => {
                if !path.is_file() {
                    continue;
                }
                let path = std::path::absolute(&path).unwrap_or(path);
                paths.push(path);
            }
            Err(err) => {
                warn!(pattern, error = %err, "skipping unreadable glob match");
            }
        }
    }

    Ok(paths)
}
