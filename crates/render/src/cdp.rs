//! [`BrowserEngine`] backed by Chrome over the DevTools protocol.

use crate::chrome::Chrome;
use crate::engine::{BrowserEngine, BrowserPage, PageHandle};
use crate::error::{ErrorKind, Result};
use crate::options::{Cookie, MediaType, Viewport, WaitUntil};
use crate::print::PrintOptions;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{SetDeviceMetricsOverrideParams, SetEmulatedMediaParams};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, CookieSameSite, SetCookiesParams, TimeSinceEpoch};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, NavigateParams, PrintToPdfParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Launches a fresh headless Chrome for every render.
#[derive(Clone, Debug)]
pub struct CdpEngine {
    chrome: Chrome,
    sandbox: bool,
    args: Vec<String>,
}

impl CdpEngine {
    pub fn new(chrome: Chrome) -> Self {
        Self { chrome, sandbox: false, args: Vec::new() }
    }

    /// Keep Chrome's sandbox on. Off by default since containers rarely
    /// grant the privileges it needs.
    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Extra command-line arguments passed to every launch.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl BrowserEngine for CdpEngine {
    #[instrument(skip_all)]
    async fn launch(&self, command_timeout: Duration) -> Result<PageHandle> {
        // Concurrent browsers must not share a profile directory.
        let profile = tempfile::Builder::new()
            .prefix("pdf-renderer-")
            .tempdir()
            .map_err(|e| ErrorKind::Launch(format!("cannot create profile directory: {e}")))?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(self.chrome.path())
            .user_data_dir(profile.path())
            .request_timeout(command_timeout)
            .args(self.args.iter().cloned());
        if !self.sandbox {
            builder = builder.no_sandbox().arg("--disable-setuid-sandbox");
        }
        let config = builder.build().map_err(ErrorKind::Launch)?;

        let (browser, mut handler) =
            Browser::launch(config).await.map_err(|e| ErrorKind::Launch(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(error) = event {
                    tracing::trace!(%error, "Browser handler event error");
                }
            }
        });

        // From here on the browser has to be released on failure.
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let failed = CdpPage::unopened(browser, handler, profile);
                if let Err(error) = failed.shutdown().await {
                    let error: &ErrorKind = &error;
                    tracing::warn!(%error, "Failed to close browser after page creation failed");
                }
                exn::bail!(ErrorKind::Launch(format!("cannot open page: {e}")));
            }
        };
        let enabled = page.execute(SetLifecycleEventsEnabledParams::new(true)).await;
        let opened = CdpPage {
            page: Some(page),
            browser: Mutex::new(Some(browser)),
            handler,
            _profile: profile,
        };
        if let Err(e) = enabled {
            if let Err(error) = opened.shutdown().await {
                let error: &ErrorKind = &error;
                tracing::warn!(%error, "Failed to close browser after enabling lifecycle events failed");
            }
            exn::bail!(ErrorKind::Browser(format!("cannot enable lifecycle events: {e}")));
        }
        Ok(Box::new(opened))
    }
}

/// One page in its own browser process.
pub struct CdpPage {
    page: Option<Page>,
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
    // Declared after `browser` so the directory outlives the process.
    _profile: TempDir,
}

impl CdpPage {
    fn unopened(browser: Browser, handler: JoinHandle<()>, profile: TempDir) -> Self {
        Self { page: None, browser: Mutex::new(Some(browser)), handler, _profile: profile }
    }

    fn page(&self) -> Result<&Page> {
        match &self.page {
            Some(page) => Ok(page),
            None => exn::bail!(ErrorKind::Browser("page is not open".into())),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let closed = browser.close().await.map_err(|e| ErrorKind::Browser(e.to_string()));
                // Reap the child even if the close command failed.
                if let Err(error) = browser.wait().await {
                    tracing::debug!(%error, "Failed to reap browser process");
                }
                closed.map(|_| ())
            }
            None => Ok(()),
        };
        self.handler.abort();
        Ok(result?)
    }

    async fn run_script(&self, script: String) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(ErrorKind::Evaluation)?;
        let response = self.page()?.execute(params).await.map_err(|e| ErrorKind::Evaluation(e.to_string()))?;
        if let Some(details) = &response.result.exception_details {
            let message = details
                .exception
                .as_ref()
                .and_then(|exception| exception.description.clone())
                .unwrap_or_else(|| details.text.clone());
            exn::bail!(ErrorKind::Evaluation(message));
        }
        Ok(response.result.result.value.clone().unwrap_or(Value::Null))
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        // Dropping the `Browser` kills the child process; the handler task
        // would otherwise keep polling a dead connection.
        self.handler.abort();
    }
}

fn lifecycle_name(wait: WaitUntil) -> &'static str {
    match wait {
        WaitUntil::Load => "load",
        WaitUntil::DomContentLoaded => "DOMContentLoaded",
        WaitUntil::NetworkIdle0 => "networkIdle",
        WaitUntil::NetworkIdle2 => "networkAlmostIdle",
    }
}

/// JavaScript truthiness of a by-value evaluation result. `undefined`
/// arrives as `null`.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn cookie_param(cookie: &Cookie, url: &str) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    param.url = cookie.url.clone();
    param.domain = cookie.domain.clone();
    if param.url.is_none() && param.domain.is_none() {
        param.url = Some(url.to_string());
    }
    param.path = cookie.path.clone();
    param.secure = cookie.secure;
    param.http_only = cookie.http_only;
    param.same_site = cookie.same_site.as_deref().and_then(|s| match s.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" => Some(CookieSameSite::None),
        _ => None,
    });
    param.expires = cookie.expires.filter(|e| *e > 0.0).map(TimeSinceEpoch::new);
    param
}

fn pdf_params(options: &PrintOptions) -> PrintToPdfParams {
    let mut builder = PrintToPdfParams::builder()
        .print_background(options.print_background)
        .margin_top(options.margin)
        .margin_right(options.margin)
        .margin_bottom(options.margin)
        .margin_left(options.margin)
        .scale(options.scale)
        .prefer_css_page_size(options.prefer_css_page_size)
        .display_header_footer(options.display_header_footer);
    // Chrome prints its own date/title/url/page furniture for a missing template.
    if options.display_header_footer {
        builder = builder
            .header_template(options.header_template.clone().unwrap_or_default())
            .footer_template(options.footer_template.clone().unwrap_or_default());
    }
    if let Some(paper) = options.paper {
        builder = builder.paper_width(paper.width).paper_height(paper.height);
    }
    builder.build()
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn set_viewport(&self, viewport: &Viewport) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            viewport.device_scale_factor,
            false,
        );
        self.page()?.execute(params).await.map_err(|e| ErrorKind::Browser(e.to_string()))?;
        Ok(())
    }

    async fn emulate_media(&self, media: MediaType) -> Result<()> {
        let params = SetEmulatedMediaParams::builder().media(media.as_str()).build();
        self.page()?.execute(params).await.map_err(|e| ErrorKind::Browser(e.to_string()))?;
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[Cookie], url: &str) -> Result<()> {
        let params = SetCookiesParams::new(cookies.iter().map(|c| cookie_param(c, url)).collect::<Vec<_>>());
        self.page()?.execute(params).await.map_err(|e| ErrorKind::Browser(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self, _timeout))]
    async fn goto(&self, url: &str, wait: WaitUntil, _timeout: Duration) -> Result<()> {
        let page = self.page()?;
        let target = lifecycle_name(wait);
        // Subscribe first so an early event cannot slip past.
        let mut events = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| ErrorKind::Navigation(e.to_string()))?;
        let navigation = page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| ErrorKind::Navigation(e.to_string()))?
            .result;
        if let Some(error_text) = navigation.error_text.filter(|t| !t.is_empty()) {
            exn::bail!(ErrorKind::Navigation(error_text));
        }
        while let Some(event) = events.next().await {
            let same_loader = navigation.loader_id.as_ref().is_none_or(|loader| *loader == event.loader_id);
            if event.frame_id == navigation.frame_id && same_loader && event.name == target {
                return Ok(());
            }
        }
        exn::bail!(ErrorKind::Navigation("browser closed during navigation".into()));
    }

    async fn add_style(&self, css: &str) -> Result<()> {
        let css = serde_json::to_string(css).map_err(|e| ErrorKind::Evaluation(e.to_string()))?;
        let script = format!(
            "(() => {{ const style = document.createElement('style'); style.textContent = {css}; \
             (document.head || document.documentElement).appendChild(style); return true; }})()"
        );
        self.run_script(script).await.map(|_| ())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.run_script(script.to_string()).await
    }

    async fn query_selector(&self, selector: &str) -> Result<bool> {
        let selector = serde_json::to_string(selector).map_err(|e| ErrorKind::Evaluation(e.to_string()))?;
        let found = self.run_script(format!("document.querySelector({selector}) !== null")).await?;
        Ok(found.as_bool().unwrap_or(false))
    }

    async fn evaluate_truthy(&self, expression: &str) -> Result<bool> {
        let value = self.run_script(expression.to_string()).await?;
        Ok(truthy(&value))
    }

    async fn print_to_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>> {
        let bytes = self.page()?.pdf(pdf_params(options)).await.map_err(|e| ErrorKind::Pdf(e.to_string()))?;
        Ok(bytes)
    }

    async fn close(&self) -> Result<()> {
        self.shutdown().await
    }
}
