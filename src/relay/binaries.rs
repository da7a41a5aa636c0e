//! Locating the external binaries the relay drives

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::RelayError;
use crate::BinaryConfig;

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Resolve a binary: explicit path first, then each search dir in order,
/// then `PATH`.
pub fn locate(binary: &BinaryConfig, search_dirs: &[PathBuf]) -> Result<PathBuf, RelayError> {
    if let Some(path) = &binary.path {
        return if is_executable(path) {
            Ok(path.clone())
        } else {
            Err(RelayError::BinaryNotFound(path.display().to_string()))
        };
    }

    for dir in search_dirs {
        let candidate = dir.join(&binary.name);
        if is_executable(&candidate) {
            debug!("Found {} at {}", binary.name, candidate.display());
            return Ok(candidate);
        }
    }

    which::which(&binary.name).map_err(|_| RelayError::BinaryNotFound(binary.name.clone()))
}
