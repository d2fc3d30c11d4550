//! Print-to-PDF parameters derived from a [`RenderRequest`].
//!
//! Chrome wants inches; callers send CSS-ish lengths (`"10mm"`, `"0.5in"`,
//! `"24px"`). Paper tokens map to the usual sizes. Nothing here talks to
//! the browser, so a bad `margin` or `format` fails before one is launched.

use crate::error::{ErrorKind, Result};
use crate::options::RenderRequest;

const PX_PER_INCH: f64 = 96.0;
const CM_PER_INCH: f64 = 2.54;
const MM_PER_INCH: f64 = 25.4;

/// Paper dimensions in inches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaperSize {
    pub width: f64,
    pub height: f64,
}
impl PaperSize {
    /// Looks up a paper token, ignoring case.
    pub fn from_format(format: &str) -> Option<Self> {
        let (width, height) = match format.trim().to_ascii_lowercase().as_str() {
            "letter" => (8.5, 11.0),
            "legal" => (8.5, 14.0),
            "tabloid" => (11.0, 17.0),
            "ledger" => (17.0, 11.0),
            "a0" => (33.1102, 46.811),
            "a1" => (23.3858, 33.1102),
            "a2" => (16.5354, 23.3858),
            "a3" => (11.6929, 16.5354),
            "a4" => (8.2677, 11.6929),
            "a5" => (5.8268, 8.2677),
            "a6" => (4.1339, 5.8268),
            _ => return None,
        };
        Some(Self { width, height })
    }
}

/// Converts a length such as `"10mm"` to inches. Bare numbers are pixels.
pub fn length_to_inches(length: &str) -> Option<f64> {
    let length = length.trim().to_ascii_lowercase();
    let (number, per_inch) = if let Some(n) = length.strip_suffix("px") {
        (n, PX_PER_INCH)
    } else if let Some(n) = length.strip_suffix("in") {
        (n, 1.0)
    } else if let Some(n) = length.strip_suffix("cm") {
        (n, CM_PER_INCH)
    } else if let Some(n) = length.strip_suffix("mm") {
        (n, MM_PER_INCH)
    } else {
        (length.as_str(), PX_PER_INCH)
    };
    let value: f64 = number.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value / per_inch)
}

/// Normalized arguments for the browser's print pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PrintOptions {
    /// Always on: pages rely on background colours and images.
    pub print_background: bool,
    /// Uniform margin in inches, applied to all four sides.
    pub margin: f64,
    pub scale: f64,
    pub prefer_css_page_size: bool,
    pub display_header_footer: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    /// Only set when the caller named a format; otherwise `@page` decides.
    pub paper: Option<PaperSize>,
}

impl TryFrom<&RenderRequest> for PrintOptions {
    type Error = crate::error::Error;

    fn try_from(request: &RenderRequest) -> Result<Self> {
        let Some(margin) = length_to_inches(&request.margin) else {
            exn::bail!(ErrorKind::InvalidPrintOption(format!("unparseable margin `{}`", request.margin)));
        };
        let paper = match request.format.as_deref() {
            None => None,
            Some(format) => match PaperSize::from_format(format) {
                Some(paper) => Some(paper),
                None => exn::bail!(ErrorKind::InvalidPrintOption(format!("unknown paper format `{format}`"))),
            },
        };
        Ok(Self {
            print_background: true,
            margin,
            scale: request.scale,
            prefer_css_page_size: request.prefer_css_page_size,
            display_header_footer: request.display_header_footer,
            header_template: request.header_template.clone(),
            footer_template: request.footer_template.clone(),
            paper,
        })
    }
}
