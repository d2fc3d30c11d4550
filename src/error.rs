//! Startup Error Types
//!
//! Request-time failures never surface here; they become HTTP responses in
//! [`crate::http`].

use derive_more::{Display, Error};

/// A startup error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for startup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not install log subscriber: {_0}")]
    Telemetry(#[error(not(source))] String),
    /// No usable Chrome on this host.
    #[display("could not set up the browser")]
    Browser,
    #[display("could not listen on {_0}")]
    Bind(#[error(not(source))] String),
    #[display("server stopped unexpectedly")]
    Serve,
}
