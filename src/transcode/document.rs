use std::path::Path;

use crate::config::CompressionSettings;
use crate::error::Result;

use super::annotations::strip_annotations;
use super::page::{PageOutcome, PageTranscoder, SourceSizeFlags};
use super::profile::SaveProfile;
use super::raster::PageRenderer;
use super::source::SourceDocument;
use super::strategy::PageStrategy;

/// Tally of what assembling one document did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyReport {
    pub pages: usize,
    pub copied: usize,
    pub rasterized: usize,
    pub text_only: usize,
    pub annotations_removed: usize,
}

/// Transcodes every page of a source document in order, strips annotations
/// when asked, and writes the result with the job's save profile.
pub struct DocumentAssembler<'a> {
    settings: &'a CompressionSettings,
    renderer: &'a dyn PageRenderer,
    transcoder: PageTranscoder<'a>,
    profile: SaveProfile,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(settings: &'a CompressionSettings, renderer: &'a dyn PageRenderer) -> Self {
        Self {
            settings,
            renderer,
            transcoder: PageTranscoder::new(settings),
            profile: SaveProfile::for_level(settings.compression_level, settings.compress_fonts),
        }
    }

    pub fn strategy(&self) -> PageStrategy {
        self.transcoder.strategy()
    }

    pub fn profile(&self) -> &SaveProfile {
        &self.profile
    }

    /// Transcode all pages of `source` in place.
    ///
    /// `on_page(index, total)` runs after each page; an error from it stops
    /// the document before the next page starts.
    pub fn assemble<F>(&self, source: &mut SourceDocument, mut on_page: F) -> Result<AssemblyReport>
    where
        F: FnMut(usize, usize) -> Result<()>,
    {
        let flags = SourceSizeFlags::from_size(source.size_bytes());
        let pages = source.pages();
        let total = pages.len();
        let mut report = AssemblyReport {
            pages: total,
            ..Default::default()
        };

        // One render session per document, released when assembly returns
        let session = match self.strategy() {
            PageStrategy::RasterRecompress => Some(self.renderer.open(source)?),
            _ => None,
        };

        for page in &pages {
            match self.transcoder.transcode(source, page, flags, session.as_deref())? {
                PageOutcome::Copied => report.copied += 1,
                PageOutcome::Rasterized {
                    width,
                    height,
                    bytes,
                } => {
                    log::debug!(
                        "Page {}/{}: {}x{} JPEG, {} bytes",
                        page.index + 1,
                        total,
                        width,
                        height,
                        bytes
                    );
                    report.rasterized += 1;
                }
                PageOutcome::TextOnly { runs } => {
                    log::debug!("Page {}/{}: kept {} text run(s)", page.index + 1, total, runs);
                    report.text_only += 1;
                }
            }
            on_page(page.index, total)?;
        }

        if self.settings.remove_annotations {
            let stripped = strip_annotations(source.document_mut())?;
            report.annotations_removed = stripped.annotations_removed;
        }
        Ok(report)
    }

    /// Write the assembled document to `output` with the job's save profile
    pub fn write(&self, source: SourceDocument, output: &Path) -> Result<()> {
        let mut doc = source.into_document();
        self.profile.write(&mut doc, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompressError, ErrorKind};
    use crate::transcode::raster::{RenderSession, XObjectRenderer};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn source(pages: usize) -> SourceDocument {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids = Vec::new();
        for n in 0..pages {
            // Invisible text, like the OCR layer of a scan
            let text = format!("BT 3 Tr /F1 12 Tf 72 700 Td (Page {}) Tj ET", n + 1);
            let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
            let annot = doc.add_object(dictionary! { "Type" => "Annot", "Subtype" => "Text" });
            kids.push(Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 200.into(), 200.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font } },
                "Contents" => content_id,
                "Annots" => vec![annot.into()],
            })));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        SourceDocument::from_document("in.pdf", 2048, doc).unwrap()
    }

    #[test]
    fn test_callback_sees_every_page_in_order() {
        let settings = CompressionSettings::default();
        let renderer = XObjectRenderer::new();
        let assembler = DocumentAssembler::new(&settings, &renderer);
        let mut src = source(3);

        let mut seen = Vec::new();
        let report = assembler
            .assemble(&mut src, |index, total| {
                seen.push((index, total));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![(0, 3), (1, 3), (2, 3)]);
        assert_eq!(report.rasterized, 3);
    }

    #[test]
    fn test_callback_error_stops_assembly() {
        let settings = CompressionSettings {
            remove_images: true,
            ..Default::default()
        };
        let renderer = XObjectRenderer::new();
        let assembler = DocumentAssembler::new(&settings, &renderer);
        let mut src = source(4);

        let mut calls = 0;
        let err = assembler
            .assemble(&mut src, |_, _| {
                calls += 1;
                if calls == 2 {
                    Err(CompressError::Cancelled)
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_annotations_stripped_when_requested() {
        let settings = CompressionSettings {
            quality: 100,
            remove_annotations: true,
            ..Default::default()
        };
        let renderer = XObjectRenderer::new();
        let assembler = DocumentAssembler::new(&settings, &renderer);
        let mut src = source(2);

        let report = assembler.assemble(&mut src, |_, _| Ok(())).unwrap();
        assert_eq!(report.copied, 2);
        assert_eq!(report.annotations_removed, 2);
    }

    /// Counts sessions and pages while delegating to the builtin renderer
    #[derive(Default)]
    struct CountingRenderer {
        opened: AtomicUsize,
        rendered: Arc<AtomicUsize>,
    }

    struct CountingSession {
        rendered: Arc<AtomicUsize>,
    }

    impl PageRenderer for CountingRenderer {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn open<'r>(&'r self, _source: &SourceDocument) -> Result<Box<dyn RenderSession + 'r>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingSession {
                rendered: Arc::clone(&self.rendered),
            }))
        }
    }

    impl RenderSession for CountingSession {
        fn render_page(
            &self,
            source: &SourceDocument,
            page: &crate::transcode::SourcePage,
            scale: f32,
        ) -> Result<image::DynamicImage> {
            self.rendered.fetch_add(1, Ordering::SeqCst);
            XObjectRenderer::new().render_page(source, page, scale)
        }
    }

    #[test]
    fn test_renderer_opened_once_per_document() {
        let settings = CompressionSettings::default();
        let renderer = CountingRenderer::default();
        let assembler = DocumentAssembler::new(&settings, &renderer);
        let mut src = source(5);

        assembler.assemble(&mut src, |_, _| Ok(())).unwrap();
        assert_eq!(renderer.opened.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.rendered.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_renderer_not_opened_without_rasterizing() {
        let settings = CompressionSettings {
            quality: 100,
            ..Default::default()
        };
        let renderer = CountingRenderer::default();
        let assembler = DocumentAssembler::new(&settings, &renderer);
        let mut src = source(2);

        assembler.assemble(&mut src, |_, _| Ok(())).unwrap();
        assert_eq!(renderer.opened.load(Ordering::SeqCst), 0);
    }
}
