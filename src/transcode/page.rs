use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::config::defaults::{ADVISORY_THRESHOLD_BYTES, PRESHRINK_THRESHOLD_BYTES};
use crate::config::CompressionSettings;
use crate::error::{CompressError, Result};
use crate::pdf::Rect;

use super::image::{reduce_image, EncodedImage};
use super::raster::RenderSession;
use super::source::{SourceDocument, SourcePage};
use super::strategy::PageStrategy;
use super::text::{build_text_page, extract_text_runs};

/// Name of the single image on a rasterized page
const PAGE_IMAGE_NAME: &str = "Im0";

/// Size flags of the file a page comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSizeFlags {
    /// Above the pre-shrink threshold: large pages get a smaller render matrix
    pub exceeds_preshrink: bool,
    /// Above the advisory threshold; affects logging only
    pub exceeds_advisory: bool,
}

impl SourceSizeFlags {
    pub fn from_size(size_bytes: u64) -> Self {
        Self {
            exceeds_preshrink: size_bytes > PRESHRINK_THRESHOLD_BYTES,
            exceeds_advisory: size_bytes > ADVISORY_THRESHOLD_BYTES,
        }
    }
}

/// What happened to one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Copied,
    Rasterized { width: u32, height: u32, bytes: usize },
    TextOnly { runs: usize },
}

/// Applies the job's strategy to one page at a time, replacing the page
/// object in place so the page tree and page order are untouched.
pub struct PageTranscoder<'a> {
    settings: &'a CompressionSettings,
    strategy: PageStrategy,
}

impl<'a> PageTranscoder<'a> {
    pub fn new(settings: &'a CompressionSettings) -> Self {
        Self {
            settings,
            strategy: PageStrategy::select(settings),
        }
    }

    pub fn strategy(&self) -> PageStrategy {
        self.strategy
    }

    /// Device pixels per point for rendering `rect`
    pub fn raster_scale(&self, rect: &Rect, flags: SourceSizeFlags) -> f32 {
        let mut scale = self.settings.dpi_scale();
        let max = self.settings.max_image_dimension as f32;
        let (width, height) = (rect.width(), rect.height());
        if flags.exceeds_preshrink && (width > max || height > max) {
            scale *= (max / width).min(max / height);
        }
        scale
    }

    /// Rewrite `page` in place. Rasterizing needs the document's open
    /// render `session`; the other strategies ignore it.
    pub fn transcode(
        &self,
        source: &mut SourceDocument,
        page: &SourcePage,
        flags: SourceSizeFlags,
        session: Option<&dyn RenderSession>,
    ) -> Result<PageOutcome> {
        match self.strategy {
            PageStrategy::VerbatimCopy => Ok(PageOutcome::Copied),
            PageStrategy::RasterRecompress => {
                let session = session.ok_or_else(|| CompressError::Render {
                    page: page.index + 1,
                    reason: "no renderer is open for this document".to_string(),
                })?;
                self.rasterize(source, page, flags, session)
            }
            PageStrategy::TextOnlyExtract => {
                let doc = source.document_mut();
                let runs = extract_text_runs(doc, page.id)?;
                let parent = parent_of(doc, page.id);
                build_text_page(
                    doc,
                    page.id,
                    parent,
                    rect_array(&page.rect),
                    page.rotation,
                    &runs,
                )?;
                Ok(PageOutcome::TextOnly { runs: runs.len() })
            }
        }
    }

    fn rasterize(
        &self,
        source: &mut SourceDocument,
        page: &SourcePage,
        flags: SourceSizeFlags,
        session: &dyn RenderSession,
    ) -> Result<PageOutcome> {
        let scale = self.raster_scale(&page.rect, flags);
        if flags.exceeds_advisory {
            log::debug!(
                "Page {}: large source, rendering at {:.3} px/pt",
                page.index + 1,
                scale
            );
        }

        let rendered = session.render_page(source, page, scale)?;
        let encoded = reduce_image(
            rendered,
            self.settings.max_image_dimension,
            self.settings.quality as u8,
        )?;
        let outcome = PageOutcome::Rasterized {
            width: encoded.width,
            height: encoded.height,
            bytes: encoded.data.len(),
        };

        let doc = source.document_mut();
        let parent = parent_of(doc, page.id);
        replace_with_image(doc, page, parent, encoded)?;
        Ok(outcome)
    }
}

fn parent_of(doc: &Document, page_id: ObjectId) -> Option<ObjectId> {
    doc.get_dictionary(page_id)
        .and_then(|page| page.get(b"Parent"))
        .and_then(Object::as_reference)
        .ok()
}

fn rect_array(rect: &Rect) -> [f32; 4] {
    [rect.x0, rect.y0, rect.x1, rect.y1]
}

/// Swap the page object for one that only paints `image` over the page box
fn replace_with_image(
    doc: &mut Document,
    page: &SourcePage,
    parent: Option<ObjectId>,
    image: EncodedImage,
) -> Result<()> {
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        image.data,
    ));

    let rect = &page.rect;
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(rect.width()),
                    0.into(),
                    0.into(),
                    Object::Real(rect.height()),
                    Object::Real(rect.x0),
                    Object::Real(rect.y0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(PAGE_IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let mut page_dict = dictionary! {
        "Type" => "Page",
        "MediaBox" => rect_array(rect).iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
        "Resources" => dictionary! {
            "XObject" => dictionary! { PAGE_IMAGE_NAME => image_id },
        },
        "Contents" => content_id,
    };
    if let Some(parent) = parent {
        page_dict.set("Parent", parent);
    }
    if page.rotation != 0 {
        page_dict.set("Rotate", page.rotation);
    }
    doc.objects.insert(page.id, Object::Dictionary(page_dict));
    Ok(())
}
