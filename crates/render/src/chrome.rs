use crate::error::{ErrorKind, Result};
use std::path::{Path, PathBuf};

/// Executable names tried, in order, when no explicit path is configured.
const EXECUTABLES: [&str; 6] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "headless_shell",
];

/// A Chrome/Chromium executable, located once at startup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chrome {
    path: PathBuf,
}
impl Chrome {
    /// Uses `configured` when given, otherwise searches `PATH`.
    pub fn discover(configured: Option<&Path>) -> Result<Self> {
        if let Some(path) = configured {
            if path.is_file() {
                return Ok(Self { path: path.to_path_buf() });
            }
            // Might be a bare name rather than a path.
            if let Ok(path) = which::which(path) {
                return Ok(Self { path });
            }
            tracing::warn!(path = %path.display(), "Configured Chrome executable not found");
            exn::bail!(ErrorKind::ChromeNotFound);
        }
        for exe in EXECUTABLES {
            if let Ok(path) = which::which(exe) {
                tracing::debug!(path = %path.display(), "Discovered Chrome executable");
                return Ok(Self { path });
            }
        }
        tracing::info!("Chrome executable not found in PATH");
        exn::bail!(ErrorKind::ChromeNotFound);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configured_path() {
        let err = Chrome::discover(Some(Path::new("/definitely/not/a/chrome"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::ChromeNotFound));
    }

    #[test]
    fn test_configured_file_is_used_as_is() {
        // Any existing file will do; discovery does not execute it.
        let this = std::env::current_exe().unwrap();
        let chrome = Chrome::discover(Some(&this)).unwrap();
        assert_eq!(chrome.path(), this);
    }
}
