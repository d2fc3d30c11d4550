//! HTTP front end for rendering web pages to PDF with headless Chrome.
//!
//! The heavy lifting lives in `pdf-renderer-render`; this crate adds the
//! request authorizer, the axum router and process setup.

pub mod auth;
pub mod error;
pub mod http;
pub mod telemetry;

pub use crate::http::{AppState, router};
