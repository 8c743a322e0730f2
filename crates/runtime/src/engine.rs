//! Locating the mirroring engine executable.

use std::path::PathBuf;

use tracing::warn;

use crate::error::{Error, Result};

/// Finds the mirroring engine (scrcpy).
///
/// Search order:
/// 1. `MIRCAST_SCRCPY` environment variable (runtime override)
/// 2. `scrcpy` on PATH
/// 3. Common install locations
pub fn find_engine_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MIRCAST_SCRCPY") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        warn!(
            target = "mircast.engine",
            path = %path.display(),
            "MIRCAST_SCRCPY is set but does not exist; falling back"
        );
    }

    if let Ok(path) = which::which("scrcpy") {
        return Ok(path);
    }

    #[cfg(not(windows))]
    let common_locations = [
        "/usr/bin/scrcpy",
        "/usr/local/bin/scrcpy",
        "/opt/homebrew/bin/scrcpy",
    ];

    #[cfg(windows)]
    let common_locations = [
        "C:\\scrcpy\\scrcpy.exe",
        "C:\\Program Files\\scrcpy\\scrcpy.exe",
    ];

    for location in &common_locations {
        let path = PathBuf::from(location);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(Error::EngineNotFound)
}
