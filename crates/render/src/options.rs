//! Render request options and their resolution from a raw JSON body.
//!
//! Resolution is deliberately permissive: only `url` is required, and most
//! malformed optional fields fall back to their default with a warning. The
//! two enumerated tokens (`wait`, `emulateMedia`) are the exception; an
//! unknown token is rejected since there is nothing sensible to pass on.

use crate::error::{ErrorKind, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MARGIN: &str = "10mm";
pub const DEFAULT_SCALE: f64 = 1.0;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_VIEWPORT: Viewport = Viewport { width: 1280, height: 1600, device_scale_factor: 2.0 };

/// Navigation-completion policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum WaitUntil {
    /// The `load` event fired.
    Load,
    /// `DOMContentLoaded` fired.
    DomContentLoaded,
    /// No network connections for at least 500ms.
    #[default]
    NetworkIdle0,
    /// No more than two network connections for at least 500ms.
    NetworkIdle2,
}
impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle0 => "networkidle0",
            Self::NetworkIdle2 => "networkidle2",
        }
    }
}
impl FromStr for WaitUntil {
    type Err = ErrorKind;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "load" => Ok(Self::Load),
            "domcontentloaded" => Ok(Self::DomContentLoaded),
            "networkidle0" => Ok(Self::NetworkIdle0),
            "networkidle2" => Ok(Self::NetworkIdle2),
            _ => Err(ErrorKind::InvalidField("wait")),
        }
    }
}
impl Display for WaitUntil {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Which set of CSS media rules the page should apply.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MediaType {
    #[default]
    Print,
    Screen,
}
impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Screen => "screen",
        }
    }
}
impl FromStr for MediaType {
    type Err = ErrorKind;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "print" => Ok(Self::Print),
            "screen" => Ok(Self::Screen),
            _ => Err(ErrorKind::InvalidField("emulateMedia")),
        }
    }
}
impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}
impl Default for Viewport {
    fn default() -> Self {
        DEFAULT_VIEWPORT
    }
}

/// A cookie to install before navigation. Field names follow the wire format.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: Option<bool>,
    pub http_only: Option<bool>,
    pub same_site: Option<String>,
    /// Seconds since the Unix epoch.
    pub expires: Option<f64>,
}

/// A fully resolved render request: every optional field has its value.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRequest {
    pub url: String,
    /// Paper token; `None` lets the page's `@page` rule decide.
    pub format: Option<String>,
    pub margin: String,
    pub scale: f64,
    pub display_header_footer: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    pub prefer_css_page_size: bool,
    pub wait: WaitUntil,
    pub timeout: Duration,
    pub emulate_media: MediaType,
    /// `None` when the caller explicitly sent `"viewport": null`.
    pub viewport: Option<Viewport>,
    pub cookies: Vec<Cookie>,
    pub ready_selector: Option<String>,
    pub ready_function: Option<String>,
    pub extra_css: Option<String>,
}
impl RenderRequest {
    /// A request for `url` with every other field at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: None,
            margin: DEFAULT_MARGIN.to_string(),
            scale: DEFAULT_SCALE,
            display_header_footer: false,
            header_template: None,
            footer_template: None,
            prefer_css_page_size: true,
            wait: WaitUntil::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            emulate_media: MediaType::default(),
            viewport: Some(Viewport::default()),
            cookies: Vec::new(),
            ready_selector: None,
            ready_function: None,
            extra_css: None,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Extracts the body `token` without resolving anything else, so that the
/// caller can authorize before validating.
pub fn body_token(body: &Value) -> Option<&str> {
    body.get("token").and_then(Value::as_str).filter(|t| !t.is_empty())
}

/// Merges a caller-supplied JSON body with defaults.
///
/// A body that is not a JSON object is treated as an empty one (and so fails
/// on the missing `url`).
pub fn resolve(body: &Value) -> Result<RenderRequest> {
    let empty = Map::new();
    let fields = body.as_object().unwrap_or(&empty);

    let url = match fields.get("url") {
        None | Some(Value::Null) => exn::bail!(ErrorKind::MissingUrl),
        Some(Value::String(url)) if url.trim().is_empty() => exn::bail!(ErrorKind::MissingUrl),
        Some(Value::String(url)) => url.trim().to_string(),
        Some(_) => exn::bail!(ErrorKind::InvalidField("url")),
    };

    let mut request = RenderRequest::new(url);
    request.format = string(fields, "format");
    if let Some(margin) = string(fields, "margin") {
        request.margin = margin;
    }
    if let Some(scale) = number(fields, "scale") {
        if scale > 0.0 {
            request.scale = scale;
        } else {
            tracing::warn!(scale, "Ignoring non-positive scale");
        }
    }
    request.display_header_footer = boolean(fields, "displayHeaderFooter").unwrap_or(false);
    request.header_template = template(fields, "headerTemplate");
    request.footer_template = template(fields, "footerTemplate");
    request.prefer_css_page_size = boolean(fields, "preferCSSPageSize").unwrap_or(true);
    if let Some(wait) = string(fields, "wait") {
        request.wait = wait.parse()?;
    }
    if let Some(millis) = number(fields, "timeout_ms") {
        if millis >= 1.0 && millis.is_finite() {
            request.timeout = Duration::from_millis(millis as u64);
        } else {
            tracing::warn!(timeout_ms = millis, "Ignoring non-positive timeout");
        }
    }
    if let Some(media) = string(fields, "emulateMedia") {
        request.emulate_media = media.parse()?;
    }
    request.viewport = viewport(fields.get("viewport"));
    request.cookies = cookies(fields.get("cookies"));
    request.ready_selector = string(fields, "readySelector");
    request.ready_function = string(fields, "readyFunction");
    request.extra_css = string(fields, "extraCss");
    Ok(request)
}

/// Non-empty string value, `None` for absent, null, empty or non-string values.
fn string(fields: &Map<String, Value>, key: &'static str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => {
            tracing::warn!(field = key, kind = json_kind(other), "Ignoring non-string field");
            None
        }
    }
}

/// Like [`string`], but an empty template is kept: it asks for a blank band.
fn template(fields: &Map<String, Value>, key: &'static str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) if s.is_empty() => Some(String::new()),
        _ => string(fields, key),
    }
}

/// Accepts JSON numbers and numeric strings.
fn number(fields: &Map<String, Value>, key: &'static str) -> Option<f64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Some(n),
            _ => {
                tracing::warn!(field = key, "Ignoring non-numeric field");
                None
            }
        },
        Value::Null => None,
        other => {
            tracing::warn!(field = key, kind = json_kind(other), "Ignoring non-numeric field");
            None
        }
    }
}

fn boolean(fields: &Map<String, Value>, key: &'static str) -> Option<bool> {
    match fields.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        Value::Null => None,
        other => {
            tracing::warn!(field = key, kind = json_kind(other), "Ignoring non-boolean field");
            None
        }
    }
}

fn viewport(value: Option<&Value>) -> Option<Viewport> {
    let fields = match value {
        None => return Some(Viewport::default()),
        Some(Value::Null) | Some(Value::Bool(false)) => return None,
        Some(Value::Object(fields)) => fields,
        Some(other) => {
            tracing::warn!(kind = json_kind(other), "Ignoring malformed viewport");
            return Some(Viewport::default());
        }
    };
    let dimension = |key| {
        number(fields, key)
            .filter(|n| *n >= 1.0 && *n <= f64::from(u32::MAX))
            .map(|n| n as u32)
    };
    Some(Viewport {
        width: dimension("width").unwrap_or(DEFAULT_VIEWPORT.width),
        height: dimension("height").unwrap_or(DEFAULT_VIEWPORT.height),
        device_scale_factor: number(fields, "deviceScaleFactor")
            .filter(|n| *n > 0.0)
            .unwrap_or(DEFAULT_VIEWPORT.device_scale_factor),
    })
}

fn cookies(value: Option<&Value>) -> Vec<Cookie> {
    let Some(Value::Array(items)) = value else {
        if let Some(other) = value.filter(|v| !v.is_null()) {
            tracing::warn!(kind = json_kind(other), "Ignoring cookies that are not a list");
        }
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match Cookie::deserialize(item) {
            Ok(cookie) if !cookie.name.is_empty() => Some(cookie),
            Ok(_) => {
                tracing::warn!(index, "Ignoring cookie without a name");
                None
            }
            Err(error) => {
                tracing::warn!(index, %error, "Ignoring malformed cookie");
                None
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::PrintOptions;
    use rstest::rstest;
    use serde_json::json;

    fn kind(body: Value) -> ErrorKind {
        let err = resolve(&body).unwrap_err();
        match &*err {
            ErrorKind::MissingUrl => ErrorKind::MissingUrl,
            ErrorKind::InvalidField(f) => ErrorKind::InvalidField(f),
            other => panic!("unexpected error kind: {other}"),
        }
    }

    #[test]
    fn test_defaults() {
        let request = resolve(&json!({ "url": "https://example.com" })).unwrap();
        assert_eq!(request, RenderRequest::new("https://example.com"));
        assert_eq!(request.margin, "10mm");
        assert_eq!(request.scale, 1.0);
        assert!(!request.display_header_footer);
        assert!(request.prefer_css_page_size);
        assert_eq!(request.wait, WaitUntil::NetworkIdle0);
        assert_eq!(request.timeout_ms(), 60_000);
        assert_eq!(request.emulate_media, MediaType::Print);
        assert_eq!(request.viewport, Some(Viewport { width: 1280, height: 1600, device_scale_factor: 2.0 }));
        assert!(request.cookies.is_empty());
        assert!(request.format.is_none());
        assert!(request.extra_css.is_none());
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({ "url": "" }))]
    #[case(json!({ "url": "   " }))]
    #[case(json!({ "url": null }))]
    #[case(json!({ "format": "A4", "scale": 2, "token": "abc" }))]
    #[case(json!("https://example.com"))]
    #[case(json!(null))]
    fn test_missing_url(#[case] body: Value) {
        assert!(matches!(kind(body), ErrorKind::MissingUrl));
    }

    #[test]
    fn test_non_string_url() {
        assert!(matches!(kind(json!({ "url": 42 })), ErrorKind::InvalidField("url")));
    }

    #[rstest]
    #[case("load", WaitUntil::Load)]
    #[case("domcontentloaded", WaitUntil::DomContentLoaded)]
    #[case("networkidle0", WaitUntil::NetworkIdle0)]
    #[case("networkidle2", WaitUntil::NetworkIdle2)]
    #[case("NetworkIdle2", WaitUntil::NetworkIdle2)]
    fn test_wait_tokens(#[case] token: &str, #[case] expected: WaitUntil) {
        let request = resolve(&json!({ "url": "https://example.com", "wait": token })).unwrap();
        assert_eq!(request.wait, expected);
    }

    #[test]
    fn test_unknown_tokens_rejected() {
        let wait = kind(json!({ "url": "https://example.com", "wait": "networkidle5" }));
        assert!(matches!(wait, ErrorKind::InvalidField("wait")));
        let media = kind(json!({ "url": "https://example.com", "emulateMedia": "tv" }));
        assert!(matches!(media, ErrorKind::InvalidField("emulateMedia")));
    }

    #[test]
    fn test_empty_media_is_print() {
        let request = resolve(&json!({ "url": "https://example.com", "emulateMedia": "" })).unwrap();
        assert_eq!(request.emulate_media, MediaType::Print);
        let request = resolve(&json!({ "url": "https://example.com", "emulateMedia": "screen" })).unwrap();
        assert_eq!(request.emulate_media, MediaType::Screen);
    }

    #[rstest]
    #[case(json!(5000), 5000)]
    #[case(json!("250"), 250)]
    #[case(json!("soon"), DEFAULT_TIMEOUT_MS)]
    #[case(json!(0), DEFAULT_TIMEOUT_MS)]
    #[case(json!(-10), DEFAULT_TIMEOUT_MS)]
    #[case(json!([1]), DEFAULT_TIMEOUT_MS)]
    fn test_timeout(#[case] value: Value, #[case] expected: u64) {
        let request = resolve(&json!({ "url": "https://example.com", "timeout_ms": value })).unwrap();
        assert_eq!(request.timeout_ms(), expected);
    }

    #[test]
    fn test_explicit_fields() {
        let body = json!({
            "url": "https://example.com/resume",
            "format": "A4",
            "margin": "0",
            "scale": 0.8,
            "displayHeaderFooter": true,
            "headerTemplate": "<span class=title></span>",
            "footerTemplate": "<span class=pageNumber></span>",
            "preferCSSPageSize": false,
            "readySelector": "#resume-root.ready",
            "readyFunction": "window.ready === true",
            "extraCss": "body { margin: 0 }",
            "token": "abc123",
        });
        let request = resolve(&body).unwrap();
        assert_eq!(request.format.as_deref(), Some("A4"));
        assert_eq!(request.margin, "0");
        assert_eq!(request.scale, 0.8);
        assert!(request.display_header_footer);
        assert_eq!(request.header_template.as_deref(), Some("<span class=title></span>"));
        assert_eq!(request.footer_template.as_deref(), Some("<span class=pageNumber></span>"));
        assert!(!request.prefer_css_page_size);
        assert_eq!(request.ready_selector.as_deref(), Some("#resume-root.ready"));
        assert_eq!(request.ready_function.as_deref(), Some("window.ready === true"));
        assert_eq!(request.extra_css.as_deref(), Some("body { margin: 0 }"));
    }

    #[test]
    fn test_blank_templates_are_kept() {
        let body = json!({
            "url": "https://example.com",
            "displayHeaderFooter": true,
            "headerTemplate": "",
            "footerTemplate": "",
        });
        let request = resolve(&body).unwrap();
        assert_eq!(request.header_template.as_deref(), Some(""));
        assert_eq!(request.footer_template.as_deref(), Some(""));
        let print = PrintOptions::try_from(&request).unwrap();
        assert_eq!(print.header_template.as_deref(), Some(""));

        let absent = resolve(&json!({ "url": "https://example.com" })).unwrap();
        assert_eq!(absent.header_template, None);
    }

    #[test]
    fn test_viewport() {
        let null = resolve(&json!({ "url": "https://example.com", "viewport": null })).unwrap();
        assert_eq!(null.viewport, None);
        let partial = resolve(&json!({ "url": "https://example.com", "viewport": { "width": 800 } })).unwrap();
        assert_eq!(partial.viewport, Some(Viewport { width: 800, height: 1600, device_scale_factor: 2.0 }));
        let full = json!({ "url": "https://example.com", "viewport": { "width": 1024, "height": 768, "deviceScaleFactor": 1 } });
        let full = resolve(&full).unwrap();
        assert_eq!(full.viewport, Some(Viewport { width: 1024, height: 768, device_scale_factor: 1.0 }));
    }

    #[test]
    fn test_cookies() {
        let body = json!({
            "url": "https://example.com",
            "cookies": [
                { "name": "session", "value": "s3cr3t", "httpOnly": true, "sameSite": "Lax" },
                { "name": "", "value": "nameless" },
                { "value": "missing name" },
                "not a cookie",
            ],
        });
        let request = resolve(&body).unwrap();
        assert_eq!(request.cookies.len(), 1);
        let cookie = &request.cookies[0];
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "s3cr3t");
        assert_eq!(cookie.http_only, Some(true));
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
    }

    #[test]
    fn test_cookies_not_a_list() {
        let request = resolve(&json!({ "url": "https://example.com", "cookies": { "name": "a" } })).unwrap();
        assert!(request.cookies.is_empty());
    }

    #[test]
    fn test_malformed_fields_fall_back() {
        let body = json!({ "url": "https://example.com", "scale": "big", "margin": 5, "preferCSSPageSize": "nope" });
        let request = resolve(&body).unwrap();
        assert_eq!(request.scale, DEFAULT_SCALE);
        assert_eq!(request.margin, DEFAULT_MARGIN);
        assert!(request.prefer_css_page_size);
    }

    #[test]
    fn test_body_token() {
        assert_eq!(body_token(&json!({ "token": "abc" })), Some("abc"));
        assert_eq!(body_token(&json!({ "token": "" })), None);
        assert_eq!(body_token(&json!({ "token": 123 })), None);
        assert_eq!(body_token(&json!([])), None);
    }
}
