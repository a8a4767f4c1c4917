use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;

use crate::error::{CompressError, Result};
use crate::transcode::source::{SourceDocument, SourcePage};

use super::{PageRenderer, RenderSession};

/// Full-fidelity rasterizer backed by libpdfium
pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfiumRenderer {
    /// Bind to a libpdfium next to the executable, falling back to the system copy
    pub fn bind() -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| CompressError::Render {
                page: 0,
                reason: format!("failed to bind to pdfium: {}", e),
            })?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    /// Parse the source file once; every page of it renders from this handle
    fn open<'r>(&'r self, source: &SourceDocument) -> Result<Box<dyn RenderSession + 'r>> {
        let document = self
            .pdfium
            .load_pdf_from_file(source.path(), None)
            .map_err(|e| CompressError::Render {
                page: 0,
                reason: format!("pdfium could not open {}: {}", source.path().display(), e),
            })?;
        log::debug!("pdfium opened {} page(s)", document.pages().len());
        Ok(Box::new(PdfiumSession { document }))
    }
}

struct PdfiumSession<'a> {
    document: PdfDocument<'a>,
}

impl RenderSession for PdfiumSession<'_> {
    fn render_page(
        &self,
        _source: &SourceDocument,
        page: &SourcePage,
        scale: f32,
    ) -> Result<DynamicImage> {
        let render_err = |e: PdfiumError| CompressError::Render {
            page: page.index + 1,
            reason: e.to_string(),
        };

        let index = u16::try_from(page.index).map_err(|_| CompressError::Render {
            page: page.index + 1,
            reason: "page index out of range for pdfium".to_string(),
        })?;
        let pdf_page = self.document.pages().get(index).map_err(render_err)?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = pdf_page.render_with_config(&config).map_err(render_err)?;

        let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
        let canvas = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(|| {
            CompressError::Render {
                page: page.index + 1,
                reason: format!("pdfium returned a short {}x{} bitmap", width, height),
            }
        })?;
        Ok(DynamicImage::ImageRgba8(canvas))
    }
}
