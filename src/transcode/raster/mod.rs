//! Page rasterizers.
//!
//! The transcoder only needs "give me this page as pixels at this scale"; the
//! backends differ in fidelity and in what they need at runtime.

mod decode;
#[cfg(feature = "pdfium")]
mod pdfium;
mod xobject;

pub use decode::decode_image_xobject;
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRenderer;
pub use xobject::XObjectRenderer;

use image::DynamicImage;

use crate::cli::RendererKind;
#[cfg(not(feature = "pdfium"))]
use crate::error::CompressError;
use crate::error::Result;

use super::source::{SourceDocument, SourcePage};

/// A rasterizer backend
pub trait PageRenderer: Send {
    /// Short backend name for log lines
    fn name(&self) -> &'static str;

    /// Prepare to render the pages of `source`.
    ///
    /// The session holds whatever per-document state the backend needs and is
    /// dropped once the document's pages are done.
    fn open<'r>(&'r self, source: &SourceDocument) -> Result<Box<dyn RenderSession + 'r>>;
}

/// Renders the pages of one open document
pub trait RenderSession {
    /// Render `page` with `scale` device pixels per PDF point.
    ///
    /// The returned buffer covers the page's visible box and may carry alpha.
    fn render_page(
        &self,
        source: &SourceDocument,
        page: &SourcePage,
        scale: f32,
    ) -> Result<DynamicImage>;
}

/// Pick a backend for `kind`.
///
/// `Auto` prefers pdfium and falls back to the builtin renderer when this
/// build or this machine has no libpdfium.
pub fn select_renderer(kind: RendererKind) -> Result<Box<dyn PageRenderer>> {
    match kind {
        RendererKind::Builtin => Ok(Box::new(XObjectRenderer::new())),
        RendererKind::Pdfium => bind_pdfium(),
        RendererKind::Auto => match bind_pdfium() {
            Ok(renderer) => Ok(renderer),
            Err(e) => {
                log::warn!(
                    "{}; using the builtin renderer, which only paints embedded images",
                    e
                );
                Ok(Box::new(XObjectRenderer::new()))
            }
        },
    }
}

#[cfg(feature = "pdfium")]
fn bind_pdfium() -> Result<Box<dyn PageRenderer>> {
    Ok(Box::new(PdfiumRenderer::bind()?))
}

#[cfg(not(feature = "pdfium"))]
fn bind_pdfium() -> Result<Box<dyn PageRenderer>> {
    Err(CompressError::Render {
        page: 0,
        reason: "this build has no pdfium support".to_string(),
    })
}

/// Slack for f32 rounding before a pixel dimension is rounded up
const PIXEL_EPSILON: f32 = 1e-3;

/// Pixel size of a page box at `scale`, never smaller than 1x1
pub fn pixel_size(width_pt: f32, height_pt: f32, scale: f32) -> (u32, u32) {
    let w = (width_pt * scale - PIXEL_EPSILON).ceil().max(1.0) as u32;
    let h = (height_pt * scale - PIXEL_EPSILON).ceil().max(1.0) as u32;
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size_letter_at_96_dpi() {
        assert_eq!(pixel_size(612.0, 792.0, 96.0 / 72.0), (816, 1056));
    }

    #[test]
    fn test_builtin_selection() {
        let renderer = select_renderer(RendererKind::Builtin).unwrap();
        assert_eq!(renderer.name(), "builtin");
    }

    #[test]
    fn test_auto_selection_always_yields_a_renderer() {
        let renderer = select_renderer(RendererKind::Auto).unwrap();
        assert!(["builtin", "pdfium"].contains(&renderer.name()));
    }

    #[test]
    fn test_pixel_size_never_zero() {
        assert_eq!(pixel_size(0.0, 0.1, 1.0), (1, 1));
    }
}
