//! Render Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! The `Display` text of every kind is what ends up in the body of a failed
//! `POST /pdf`, so keep it short and free of secrets.

use derive_more::{Display, Error};

/// A render error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for render operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request body had no `url`, or an empty one.
    #[display("missing url")]
    MissingUrl,
    /// A request field was present but could not be understood.
    #[display("invalid {_0}")]
    InvalidField(#[error(not(source))] &'static str),
    #[display("chrome/chromium not detected on your system")]
    ChromeNotFound,
    /// The browser process could not be started.
    #[display("browser launch failed: {_0}")]
    Launch(#[error(not(source))] String),
    /// A browser command outside navigation/printing failed (viewport, media, cookies).
    #[display("browser error: {_0}")]
    Browser(#[error(not(source))] String),
    #[display("navigation failed: {_0}")]
    Navigation(#[error(not(source))] String),
    /// A caller-bounded wait ran out of time.
    #[display("timed out after {millis}ms waiting for {stage}")]
    Timeout { stage: &'static str, millis: u64 },
    /// In-page script threw or returned something unusable.
    #[display("evaluation failed: {_0}")]
    Evaluation(#[error(not(source))] String),
    /// `margin` or `format` could not be turned into print parameters.
    #[display("invalid print option: {_0}")]
    InvalidPrintOption(#[error(not(source))] String),
    #[display("pdf generation failed: {_0}")]
    Pdf(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if the caller sent something unusable (HTTP 400), as
    /// opposed to the render itself failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingUrl | Self::InvalidField(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::MissingUrl, "missing url")]
    #[case(ErrorKind::InvalidField("wait"), "invalid wait")]
    #[case(ErrorKind::Timeout { stage: "navigation", millis: 100 }, "timed out after 100ms waiting for navigation")]
    #[case(ErrorKind::Pdf("boom".into()), "pdf generation failed: boom")]
    fn test_display(#[case] kind: ErrorKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }

    #[test]
    fn test_client_errors() {
        assert!(ErrorKind::MissingUrl.is_client_error());
        assert!(ErrorKind::InvalidField("url").is_client_error());
        assert!(!ErrorKind::ChromeNotFound.is_client_error());
        assert!(!ErrorKind::Navigation("net::ERR_NAME_NOT_RESOLVED".into()).is_client_error());
    }
}
