//! In-memory browser engine for testing.

use crate::engine::{BrowserEngine, BrowserPage, PageHandle};
use crate::error::{ErrorKind, Result};
use crate::options::{Cookie, MediaType, Viewport, WaitUntil};
use crate::print::PrintOptions;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Minimal bytes that still look like a PDF to anything sniffing the header.
pub const MOCK_PDF: &[u8] = b"%PDF-1.7\n%mock\n%%EOF\n";

/// Every page operation, in the order it was requested.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    SetViewport(Viewport),
    EmulateMedia(MediaType),
    SetCookies { count: usize, url: String },
    Goto { url: String, wait: WaitUntil },
    AddStyle(String),
    Evaluate(String),
    QuerySelector(String),
    EvaluateTruthy(String),
    PrintToPdf(PrintOptions),
    Close,
}

/// A step that can be made to fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MockStep {
    Launch,
    SetViewport,
    EmulateMedia,
    SetCookies,
    Goto,
    AddStyle,
    Evaluate,
    QuerySelector,
    EvaluateTruthy,
    PrintToPdf,
    Close,
}

/// How pages launched by a [`MockEngine`] behave.
#[derive(Clone, Debug, Default)]
pub struct MockBehaviour {
    /// Fail this step with the error kind the real engine would use.
    pub fail_at: Option<MockStep>,
    /// Never finish navigating.
    pub hang_navigation: bool,
    /// `query_selector` turns `true` this long after navigation; `None` means immediately.
    pub selector_after: Option<Duration>,
    /// `evaluate_truthy` turns `true` this long after navigation; `None` means immediately.
    pub function_after: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<Call>>,
    command_timeouts: Mutex<Vec<Duration>>,
    launched: AtomicUsize,
    closed: AtomicUsize,
}
impl Shared {
    fn calls(&self) -> MutexGuard<'_, Vec<Call>> {
        // A poisoned lock means another test thread already panicked.
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Browser engine that records calls instead of driving a browser.
///
/// Launch and close counts are tracked across every page it hands out, so
/// tests can assert that each launched browser was closed exactly once.
///
/// # Examples
///
/// ```
/// use pdf_renderer_render::mock::{MockBehaviour, MockEngine, MockStep};
/// use pdf_renderer_render::{RenderRequest, Renderer};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = Arc::new(MockEngine::new(MockBehaviour {
///     fail_at: Some(MockStep::Goto),
///     ..Default::default()
/// }));
/// let renderer = Renderer::new(engine.clone());
/// assert!(renderer.render(&RenderRequest::new("https://example.com")).await.is_err());
/// assert_eq!(engine.launched(), 1);
/// assert_eq!(engine.closed(), 1);
/// # }
/// ```
#[derive(Default)]
pub struct MockEngine {
    behaviour: MockBehaviour,
    shared: Arc<Shared>,
}

impl MockEngine {
    pub fn new(behaviour: MockBehaviour) -> Self {
        Self { behaviour, shared: Arc::default() }
    }

    /// All calls made on every page this engine launched.
    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls().clone()
    }

    /// The `command_timeout` of every successful launch, in order.
    pub fn command_timeouts(&self) -> Vec<Duration> {
        self.shared.command_timeouts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn launched(&self) -> usize {
        self.shared.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserEngine for MockEngine {
    async fn launch(&self, command_timeout: Duration) -> Result<PageHandle> {
        if self.behaviour.fail_at == Some(MockStep::Launch) {
            exn::bail!(ErrorKind::Launch("mock launch failure".into()));
        }
        self.shared.launched.fetch_add(1, Ordering::SeqCst);
        self.shared.command_timeouts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(command_timeout);
        Ok(Box::new(MockPage {
            behaviour: self.behaviour.clone(),
            shared: Arc::clone(&self.shared),
            navigated: Mutex::new(None),
        }))
    }
}

/// Page handed out by [`MockEngine`].
pub struct MockPage {
    behaviour: MockBehaviour,
    shared: Arc<Shared>,
    navigated: Mutex<Option<Instant>>,
}

impl MockPage {
    fn record(&self, call: Call, step: MockStep) -> Result<()> {
        self.shared.calls().push(call);
        if self.behaviour.fail_at != Some(step) {
            return Ok(());
        }
        let kind = match step {
            MockStep::Launch => ErrorKind::Launch("mock failure".into()),
            MockStep::SetViewport | MockStep::EmulateMedia | MockStep::SetCookies | MockStep::Close => {
                ErrorKind::Browser("mock failure".into())
            }
            MockStep::Goto => ErrorKind::Navigation("net::ERR_NAME_NOT_RESOLVED".into()),
            MockStep::AddStyle | MockStep::Evaluate | MockStep::QuerySelector | MockStep::EvaluateTruthy => {
                ErrorKind::Evaluation("mock exception".into())
            }
            MockStep::PrintToPdf => ErrorKind::Pdf("mock failure".into()),
        };
        exn::bail!(kind);
    }

    fn ready_after(&self, delay: Option<Duration>) -> bool {
        let Some(delay) = delay else {
            return true;
        };
        let navigated = *self.navigated.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        navigated.is_some_and(|at| at.elapsed() >= delay)
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn set_viewport(&self, viewport: &Viewport) -> Result<()> {
        self.record(Call::SetViewport(*viewport), MockStep::SetViewport)
    }

    async fn emulate_media(&self, media: MediaType) -> Result<()> {
        self.record(Call::EmulateMedia(media), MockStep::EmulateMedia)
    }

    async fn set_cookies(&self, cookies: &[Cookie], url: &str) -> Result<()> {
        let call = Call::SetCookies { count: cookies.len(), url: url.to_string() };
        self.record(call, MockStep::SetCookies)
    }

    async fn goto(&self, url: &str, wait: WaitUntil, _timeout: Duration) -> Result<()> {
        self.record(Call::Goto { url: url.to_string(), wait }, MockStep::Goto)?;
        if self.behaviour.hang_navigation {
            std::future::pending::<()>().await;
        }
        *self.navigated.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
        Ok(())
    }

    async fn add_style(&self, css: &str) -> Result<()> {
        self.record(Call::AddStyle(css.to_string()), MockStep::AddStyle)
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.record(Call::Evaluate(script.to_string()), MockStep::Evaluate)?;
        Ok(Value::Bool(true))
    }

    async fn query_selector(&self, selector: &str) -> Result<bool> {
        self.record(Call::QuerySelector(selector.to_string()), MockStep::QuerySelector)?;
        Ok(self.ready_after(self.behaviour.selector_after))
    }

    async fn evaluate_truthy(&self, expression: &str) -> Result<bool> {
        self.record(Call::EvaluateTruthy(expression.to_string()), MockStep::EvaluateTruthy)?;
        Ok(self.ready_after(self.behaviour.function_after))
    }

    async fn print_to_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>> {
        self.record(Call::PrintToPdf(options.clone()), MockStep::PrintToPdf)?;
        Ok(MOCK_PDF.to_vec())
    }

    async fn close(&self) -> Result<()> {
        // Counted even when it fails: the attempt is what matters for leaks.
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Close, MockStep::Close)
    }
}
