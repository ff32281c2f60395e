//! File staging helpers shared by the image, log and NetCDF writers
//!
//! Outputs are written to a temporary file next to their destination and then
//! renamed into place, so a destination is either fully written or untouched.

use crate::errors::{ClimError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

/// Directory a staged file for `path` must live in (same filesystem as the target).
pub(crate) fn staging_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Create an empty temporary file next to `path`, keeping its extension.
pub(crate) fn staged_file(path: &Path) -> Result<NamedTempFile> {
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    Builder::new()
        .prefix(".precip_clim-")
        .suffix(&suffix)
        .tempfile_in(staging_dir(path))
        .map_err(|e| ClimError::io(path, e))
}

/// Stage `bytes` for `path` without touching `path` itself.
pub(crate) fn stage_bytes(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let mut staged = staged_file(path)?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|e| ClimError::io(path, e))?;
    Ok(staged)
}

/// Rename every staged file onto its destination.
///
/// If one rename fails, the destinations already committed by this call are
/// removed before the error is returned.
pub(crate) fn commit_all(staged: Vec<(NamedTempFile, PathBuf)>) -> Result<Vec<PathBuf>> {
    let mut committed: Vec<PathBuf> = Vec::with_capacity(staged.len());

    for (file, destination) in staged {
        if let Err(err) = file.persist(&destination) {
            for path in &committed {
                if let Err(cleanup) = fs::remove_file(path) {
                    warn!("Could not remove {} after failed write: {cleanup}", path.display());
                }
            }
            return Err(ClimError::io(&destination, err.error));
        }
        debug!("Committed {}", destination.display());
        committed.push(destination);
    }

    Ok(committed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_stage_and_commit() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("a.txt");

        let staged = vec![
            (stage_bytes(&a, b"image").unwrap(), a.clone()),
            (stage_bytes(&b, b"log").unwrap(), b.clone()),
        ];
        assert!(!a.exists());

        let written = commit_all(staged).unwrap();
        assert_eq!(written, vec![a.clone(), b.clone()]);
        assert_eq!(fs::read(&a).unwrap(), b"image");
        assert_eq!(fs::read_to_string(&b).unwrap(), "log");
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        // a directory in the way makes the second rename fail
        let blocked = dir.path().join("blocked.txt");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), "x").unwrap();

        let staged = vec![
            (stage_bytes(&a, b"image").unwrap(), a.clone()),
            (stage_bytes(&blocked, b"log").unwrap(), blocked.clone()),
        ];
        assert!(commit_all(staged).is_err());
        assert!(!a.exists());
        assert!(blocked.is_dir());
    }

    #[test]
    fn test_staging_dir_for_bare_file_name() {
        assert_eq!(staging_dir(Path::new("map.png")), Path::new("."));
        assert_eq!(staging_dir(Path::new("out/map.png")), Path::new("out"));
    }
}
