//! Routes and handlers.

use crate::auth;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use pdf_renderer_config::{AuthConfig, DEFAULT_BODY_LIMIT};
use pdf_renderer_render::error::{Error as RenderError, ErrorKind as RenderErrorKind};
use pdf_renderer_render::{Renderer, body_token, resolve};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Span, field, instrument};

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    auth: Arc<AuthConfig>,
    renderer: Renderer,
    body_limit: usize,
}
impl AppState {
    pub fn new(auth: AuthConfig, renderer: Renderer) -> Self {
        Self { auth: Arc::new(auth), renderer, body_limit: DEFAULT_BODY_LIMIT }
    }

    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/", get(ready))
        .route("/healthz", get(healthz))
        .route("/pdf", post(render_pdf))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ready() -> &'static str {
    "pdf-renderer ready"
}

/// Failures of `POST /pdf`, each a plain-text response.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    InvalidRequest(String),
    RenderFailure(String),
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        let kind: &RenderErrorKind = &err;
        if kind.is_client_error() {
            Self::InvalidRequest(kind.to_string())
        } else {
            Self::RenderFailure(kind.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            Self::InvalidRequest(text) => (StatusCode::BAD_REQUEST, text),
            Self::RenderFailure(text) => (StatusCode::INTERNAL_SERVER_ERROR, text),
        }
        .into_response()
    }
}

#[instrument(skip_all, fields(url = field::Empty))]
async fn render_pdf(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    // An empty body is an empty object, which then fails on the missing url.
    let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::InvalidRequest("invalid json".to_string()))?
    };

    let header = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    if !auth::authorize(&state.auth, header, body_token(&body)) {
        tracing::warn!("Unauthorized render request");
        return Err(ApiError::Unauthorized);
    }

    let request = resolve(&body)?;
    Span::current().record("url", request.url.as_str());

    let started = Instant::now();
    match state.renderer.render(&request).await {
        Ok(pdf) => {
            tracing::info!(bytes = pdf.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Rendered PDF");
            let headers = [
                (CONTENT_TYPE, "application/pdf"),
                (CACHE_CONTROL, "private, no-store"),
                (CONTENT_DISPOSITION, "inline; filename=\"render.pdf\""),
            ];
            Ok((headers, pdf).into_response())
        }
        Err(err) => {
            let kind: &RenderErrorKind = &err;
            tracing::warn!(error = %kind, "Render failed");
            Err(err.into())
        }
    }
}
