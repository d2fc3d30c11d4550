mod cdp;
mod chrome;
pub mod engine;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod options;
pub mod print;
pub mod readiness;
mod render;
mod session;

pub use crate::cdp::CdpEngine;
pub use crate::chrome::Chrome;
use crate::engine::BrowserEngine;
pub use crate::options::{RenderRequest, body_token, resolve};
pub use crate::readiness::SettleOptions;
pub use crate::session::RenderSession;
use std::sync::Arc;

/// Renders pages to PDF, one isolated browser per call.
///
/// Cheap to clone; the engine is shared, browsers are not.
#[derive(Clone)]
pub struct Renderer {
    engine: Arc<dyn BrowserEngine>,
    settle: SettleOptions,
}
impl Renderer {
    pub fn new(engine: Arc<dyn BrowserEngine>) -> Self {
        Self { engine, settle: SettleOptions::default() }
    }

    pub fn with_settle(mut self, settle: SettleOptions) -> Self {
        self.settle = settle;
        self
    }
}
