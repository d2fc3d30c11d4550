use crate::engine::{BrowserEngine, BrowserPage, PageHandle};
use crate::error::{ErrorKind, Result};
use std::time::{Duration, Instant};

/// One browser and one page, owned by a single render.
///
/// Call [`close()`](Self::close) on every path once the session exists. If
/// the owning future is cancelled first (client went away), dropping the
/// session drops the page handle, which releases the browser without the
/// graceful shutdown.
pub struct RenderSession {
    page: PageHandle,
    started: Instant,
    closed: bool,
}

impl RenderSession {
    pub async fn start(engine: &dyn BrowserEngine, command_timeout: Duration) -> Result<Self> {
        let page = engine.launch(command_timeout).await?;
        tracing::debug!("Browser session started");
        Ok(Self { page, started: Instant::now(), closed: false })
    }

    pub fn page(&self) -> &dyn BrowserPage {
        self.page.as_ref()
    }

    /// Tears the browser down. Failures are logged and swallowed so they
    /// never mask the outcome of the render itself.
    pub async fn close(mut self) {
        self.closed = true;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match self.page.close().await {
            Ok(()) => tracing::debug!(elapsed_ms, "Browser session closed"),
            Err(error) => {
                let error: &ErrorKind = &error;
                tracing::warn!(elapsed_ms, %error, "Failed to close browser session");
            }
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("Browser session dropped without closing; releasing browser on drop");
        }
    }
}
