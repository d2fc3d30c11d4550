//! Page readiness: everything that has to happen between "blank page" and
//! "safe to print".
//!
//! The order is fixed. Cookies go in before navigation because pages may
//! gate their first paint on them, and the generic settle steps (fonts,
//! images, delay) run before the page's own readiness signal, which is
//! expected to flip only once assets are in place.
//!
//! Every wait the caller can influence is bounded by the request timeout.
//! The settle steps are best-effort: a page that has no `document.fonts`
//! or throws in an image handler still gets printed.

use crate::engine::BrowserPage;
use crate::error::{ErrorKind, Result};
use crate::options::RenderRequest;
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

/// Interval between checks of `readySelector` / `readyFunction`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Knobs for the in-page settle routine. Process-wide, not per request.
#[derive(Clone, Debug, PartialEq)]
pub struct SettleOptions {
    /// Wait for `document.fonts.ready`.
    pub fonts: bool,
    /// Dispatch a synthetic `beforeprint` event for listening page scripts.
    pub before_print: bool,
    /// Switch lazy images to eager loading and await every pending image.
    pub eager_images: bool,
    /// Upper bound for each in-page settle wait (further capped by the request timeout).
    pub asset_timeout: Duration,
    /// Fixed pause after the in-page steps so layout can reflow.
    pub delay: Duration,
}
impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            fonts: true,
            before_print: false,
            eager_images: true,
            asset_timeout: Duration::from_secs(5),
            delay: Duration::from_millis(50),
        }
    }
}

/// Runs every readiness step against `page`, stopping at the first failure.
#[instrument(skip_all, fields(wait = %request.wait, timeout_ms = request.timeout_ms()))]
pub async fn prepare(page: &dyn BrowserPage, request: &RenderRequest, settle: &SettleOptions) -> Result<()> {
    if let Some(viewport) = &request.viewport {
        page.set_viewport(viewport).await?;
    }
    page.emulate_media(request.emulate_media).await?;
    if !request.cookies.is_empty() {
        page.set_cookies(&request.cookies, &request.url).await?;
        tracing::debug!(count = request.cookies.len(), "Cookies installed");
    }

    bounded("navigation", request.timeout, page.goto(&request.url, request.wait, request.timeout)).await?;
    tracing::debug!("Navigation complete");

    if let Some(css) = &request.extra_css {
        page.add_style(css).await?;
        tracing::debug!(bytes = css.len(), "Extra CSS injected");
    }

    settle_page(page, settle, request.timeout).await;

    if let Some(selector) = &request.ready_selector {
        bounded("readySelector", request.timeout, poll(|| page.query_selector(selector))).await?;
        tracing::debug!(selector, "Ready selector matched");
    }
    if let Some(expression) = &request.ready_function {
        bounded("readyFunction", request.timeout, poll(|| page.evaluate_truthy(expression))).await?;
        tracing::debug!("Ready function returned truthy");
    }
    Ok(())
}

/// The best-effort checklist. Each step is independent; failures are logged
/// and otherwise ignored.
async fn settle_page(page: &dyn BrowserPage, settle: &SettleOptions, timeout: Duration) {
    let cap = settle.asset_timeout.min(timeout);
    let cap_ms = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);

    if settle.fonts {
        best_effort("fonts", cap, page.evaluate(&fonts_script(cap_ms))).await;
    }
    if settle.before_print {
        best_effort("beforeprint", cap, page.evaluate(BEFORE_PRINT_SCRIPT)).await;
    }
    if settle.eager_images {
        best_effort("images", cap, page.evaluate(&images_script(cap_ms))).await;
    }
    if !settle.delay.is_zero() {
        tokio::time::sleep(settle.delay).await;
    }
}

async fn best_effort<F, T>(step: &'static str, cap: Duration, future: F)
where
    F: Future<Output = Result<T>>,
    T: std::fmt::Debug,
{
    // Pad the outer bound so the in-page timer gets to resolve first.
    match tokio::time::timeout(cap + Duration::from_millis(250), future).await {
        Ok(Ok(outcome)) => tracing::debug!(step, ?outcome, "Settle step finished"),
        Ok(Err(error)) => {
            let error: &ErrorKind = &error;
            tracing::debug!(step, %error, "Settle step failed; continuing");
        }
        Err(_) => tracing::debug!(step, "Settle step timed out; continuing"),
    }
}

/// Fails with [`ErrorKind::Timeout`] if `future` does not finish within `limit`.
async fn bounded<F, T>(stage: &'static str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => exn::bail!(ErrorKind::Timeout {
            stage,
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Re-runs `check` until it reports `true`. Errors end the wait immediately.
async fn poll<F, Fut>(mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    loop {
        if check().await? {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

const BEFORE_PRINT_SCRIPT: &str = "window.dispatchEvent(new Event('beforeprint')); true";

fn fonts_script(cap_ms: u64) -> String {
    format!(
        r#"(async () => {{
  if (!document.fonts || !document.fonts.ready) return false;
  const timer = new Promise((resolve) => setTimeout(() => resolve(false), {cap_ms}));
  return await Promise.race([document.fonts.ready.then(() => true), timer]);
}})()"#
    )
}

fn images_script(cap_ms: u64) -> String {
    format!(
        r#"(async () => {{
  const images = Array.from(document.images);
  for (const img of images) {{
    if (img.loading === 'lazy') img.loading = 'eager';
    if (img.dataset && img.dataset.src && !img.getAttribute('src')) img.src = img.dataset.src;
  }}
  const pending = images
    .filter((img) => !img.complete)
    .map((img) => new Promise((resolve) => {{
      img.addEventListener('load', resolve, {{ once: true }});
      img.addEventListener('error', resolve, {{ once: true }});
    }}));
  const timer = new Promise((resolve) => setTimeout(resolve, {cap_ms}));
  await Promise.race([Promise.all(pending), timer]);
  return pending.length;
}})()"#
    )
}
