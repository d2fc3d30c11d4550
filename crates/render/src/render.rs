use crate::Renderer;
use crate::engine::BrowserPage;
use crate::error::Result;
use crate::print::PrintOptions;
use crate::readiness;
use crate::{RenderRequest, RenderSession};
use std::time::{Duration, Instant};
use tracing::instrument;

/// Lower bound for a single browser command. Request timeouts only bound
/// the readiness waits, so short ones must not starve printing.
const MIN_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

impl Renderer {
    /// Loads `request.url` in a fresh browser, waits until it is ready and
    /// prints it. The browser is closed before this returns, whatever the
    /// outcome.
    #[instrument(skip_all, fields(url = %request.url))]
    pub async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>> {
        // Bad margins or formats fail here, before a browser is spent on them.
        let print = PrintOptions::try_from(request)?;
        let started = Instant::now();

        let command_timeout = request.timeout.max(MIN_COMMAND_TIMEOUT);
        let session = RenderSession::start(self.engine.as_ref(), command_timeout).await?;
        let outcome = self.drive(session.page(), request, &print).await;
        session.close().await;

        if let Ok(pdf) = &outcome {
            tracing::debug!(bytes = pdf.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Page rendered");
        }
        outcome
    }

    async fn drive(&self, page: &dyn BrowserPage, request: &RenderRequest, print: &PrintOptions) -> Result<Vec<u8>> {
        readiness::prepare(page, request, &self.settle).await?;
        page.print_to_pdf(print).await
    }
}
