//! The browser seam.
//!
//! Everything the readiness controller and PDF producer need from a browser
//! goes through [`BrowserEngine`] and [`BrowserPage`]. The real
//! implementation drives Chrome over the DevTools protocol (see
//! [`CdpEngine`](crate::CdpEngine)); tests use the in-memory engine behind
//! the `mock` feature.

use crate::error::Result;
use crate::options::{Cookie, MediaType, Viewport, WaitUntil};
use crate::print::PrintOptions;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Owned handle to one page in one freshly launched browser.
pub type PageHandle = Box<dyn BrowserPage>;

/// Launches isolated browsers. One launch per render; nothing is pooled.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Starts a new browser process and opens a blank page in it.
    ///
    /// A single browser command (navigation, printing) may run for up to
    /// `command_timeout` before the engine abandons it.
    async fn launch(&self, command_timeout: Duration) -> Result<PageHandle>;
}

/// A single page, owned by exactly one render.
///
/// Implementations must make [`close()`](Self::close) tear down the whole
/// browser, not just the page. Dropping a page without closing it must
/// still release the browser process, only less gracefully.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn set_viewport(&self, viewport: &Viewport) -> Result<()>;

    async fn emulate_media(&self, media: MediaType) -> Result<()>;

    /// Installs cookies before navigation. Cookies without `url` or `domain`
    /// are scoped to `url`.
    async fn set_cookies(&self, cookies: &[Cookie], url: &str) -> Result<()>;

    /// Navigates and waits for `wait`. Implementations may honour `timeout`
    /// themselves; callers bound the whole call regardless.
    async fn goto(&self, url: &str, wait: WaitUntil, timeout: Duration) -> Result<()>;

    /// Appends a `<style>` element with `css` to the loaded document.
    async fn add_style(&self, css: &str) -> Result<()>;

    /// Evaluates `script` in the page, awaiting a returned promise.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Returns whether an element matching `selector` exists right now.
    async fn query_selector(&self, selector: &str) -> Result<bool>;

    /// Evaluates `expression` once, awaiting a returned promise, and returns
    /// the JavaScript truthiness of the result.
    async fn evaluate_truthy(&self, expression: &str) -> Result<bool>;

    async fn print_to_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>>;

    /// Closes the page and its browser. Called at most once per page.
    async fn close(&self) -> Result<()>;
}
