use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, Stream};

use crate::error::{CompressError, Result};
use crate::pdf::objects::{
    dict_of, name_of, operand_numbers, page_content, page_resources, resolve, resource_entry,
    stream_bytes,
};
use crate::pdf::{Matrix, Rect};
use crate::transcode::source::{SourceDocument, SourcePage};

use super::decode::decode_image_xobject;
use super::{pixel_size, PageRenderer, RenderSession};

/// Nesting limit for form XObjects drawing other forms
const MAX_FORM_DEPTH: usize = 12;

/// Text render modes that put no ink on the page (invisible, clip only)
const INKLESS_TEXT_MODES: [i64; 2] = [3, 7];

/// Operators that paint something other than an image XObject
const UNPAINTED_OPERATORS: &[&str] = &["S", "s", "f", "F", "f*", "B", "B*", "b", "b*", "sh", "BI", "ID", "EI"];

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Pure-Rust rasterizer that paints only the raster images placed on a page.
///
/// Each image XObject is drawn through the CTM in effect at its `Do`,
/// including images nested inside form XObjects, with `/SMask` alpha applied.
/// Glyphs and vector paths are not painted. A page that draws visible text or
/// vector art fails with a render error instead of coming out blank; invisible
/// text (render mode 3, as in OCR layers over scans) is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct XObjectRenderer;

impl XObjectRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl PageRenderer for XObjectRenderer {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn open<'r>(&'r self, _source: &SourceDocument) -> Result<Box<dyn RenderSession + 'r>> {
        Ok(Box::new(*self))
    }
}

impl RenderSession for XObjectRenderer {
    fn render_page(
        &self,
        source: &SourceDocument,
        page: &SourcePage,
        scale: f32,
    ) -> Result<DynamicImage> {
        let doc = source.document();
        let (width, height) = pixel_size(page.rect.width(), page.rect.height(), scale);
        let mut canvas = RgbaImage::from_pixel(width, height, PAPER);

        // User space -> canvas pixels, y axis pointing down
        let device = Matrix::translate(-page.rect.x0, -page.rect.y1)
            .concat(&Matrix::scale(scale, -scale));

        let content = page_content(doc, page.id)?;
        let mut painter = Painter {
            doc,
            canvas: &mut canvas,
            device,
            painted: 0,
            unpainted: None,
        };
        let state = GraphicsState {
            ctm: Matrix::identity(),
            text_mode: 0,
        };
        painter.walk(&content, page_resources(doc, page.id), state, 0);

        if let Some(operator) = painter.unpainted {
            return Err(CompressError::Render {
                page: page.index + 1,
                reason: format!(
                    "the builtin renderer cannot paint `{}`; use the pdfium renderer or quality 100",
                    operator
                ),
            });
        }
        log::debug!(
            "Page {}: composited {} image(s) onto {}x{} canvas",
            page.index + 1,
            painter.painted,
            width,
            height
        );

        Ok(DynamicImage::ImageRgba8(canvas))
    }
}

/// The part of the graphics state the painter follows across q/Q
#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: Matrix,
    text_mode: i64,
}

struct Painter<'a> {
    doc: &'a Document,
    canvas: &'a mut RgbaImage,
    device: Matrix,
    painted: usize,
    /// First operator met that would put ink this painter cannot draw
    unpainted: Option<String>,
}

impl<'a> Painter<'a> {
    fn walk(
        &mut self,
        content: &[u8],
        resources: Option<&'a Dictionary>,
        state: GraphicsState,
        depth: usize,
    ) {
        let content = match Content::decode(content) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("Skipping undecodable content stream: {}", e);
                return;
            }
        };

        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut state = state;

        for op in &content.operations {
            let operator = op.operator.as_str();
            match operator {
                "q" => stack.push(state),
                "Q" => state = stack.pop().unwrap_or(state),
                "cm" => {
                    if let Some(m) = Matrix::from_operands(&operand_numbers(&op.operands)) {
                        state.ctm = m.concat(&state.ctm);
                    }
                }
                "Tr" => {
                    if let Some(mode) = op.operands.first().and_then(|o| o.as_i64().ok()) {
                        state.text_mode = mode;
                    }
                }
                "Tj" | "TJ" | "'" | "\"" => {
                    if !INKLESS_TEXT_MODES.contains(&state.text_mode) {
                        self.unpainted.get_or_insert_with(|| operator.to_string());
                    }
                }
                "Do" => {
                    if let Some(name) = op.operands.first().and_then(name_of) {
                        self.draw_xobject(name, resources, state, depth);
                    }
                }
                _ if UNPAINTED_OPERATORS.contains(&operator) => {
                    self.unpainted.get_or_insert_with(|| operator.to_string());
                }
                _ => {}
            }
        }
    }

    fn draw_xobject(
        &mut self,
        name: &[u8],
        resources: Option<&'a Dictionary>,
        state: GraphicsState,
        depth: usize,
    ) {
        let doc = self.doc;
        let stream = match resource_entry(doc, resources, b"XObject", name).and_then(|o| resolve(doc, o)) {
            Some(Object::Stream(stream)) => stream,
            _ => return,
        };

        match stream.dict.get(b"Subtype").ok().and_then(name_of) {
            Some(b"Image") => self.draw_image(stream, state.ctm),
            Some(b"Form") if depth < MAX_FORM_DEPTH => {
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|m| resolve(doc, m))
                    .and_then(|m| m.as_array().ok())
                    .and_then(|values| Matrix::from_operands(&operand_numbers(values)))
                    .unwrap_or_default();
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| dict_of(doc, r))
                    .or(resources);
                match stream_bytes(stream) {
                    Ok(bytes) => {
                        let inner = GraphicsState {
                            ctm: form_matrix.concat(&state.ctm),
                            ..state
                        };
                        self.walk(&bytes, form_resources, inner, depth + 1)
                    }
                    Err(e) => log::debug!("Skipping form XObject: {}", e),
                }
            }
            _ => {}
        }
    }

    fn draw_image(&mut self, stream: &Stream, ctm: Matrix) {
        let transform = ctm.concat(&self.device);
        let bounds = transform.unit_square_bounds();
        let (cw, ch) = self.canvas.dimensions();

        let clip = Rect::new(
            bounds.x0.max(0.0),
            bounds.y0.max(0.0),
            bounds.x1.min(cw as f32),
            bounds.y1.min(ch as f32),
        );
        if clip.width() <= 0.0 || clip.height() <= 0.0 {
            return;
        }

        // Decoding never upsamples; only the clipped area is painted
        let placed_w = transform.scale_x().round().max(1.0) as u32;
        let placed_h = transform.scale_y().round().max(1.0) as u32;

        let Some(inverse) = transform.invert() else {
            return;
        };

        let image = match load_with_alpha(self.doc, stream, placed_w, placed_h) {
            Ok(image) => image,
            Err(reason) => {
                log::debug!("Skipping image XObject: {}", reason);
                return;
            }
        };
        let (iw, ih) = image.dimensions();

        for py in clip.y0.floor() as u32..(clip.y1.ceil() as u32).min(ch) {
            for px in clip.x0.floor() as u32..(clip.x1.ceil() as u32).min(cw) {
                let (u, v) = inverse.apply(px as f32 + 0.5, py as f32 + 0.5);
                if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                    continue;
                }
                // Image row 0 sits at the top of the unit square
                let sx = ((u * iw as f32) as u32).min(iw - 1);
                let sy = (((1.0 - v) * ih as f32) as u32).min(ih - 1);
                blend(self.canvas.get_pixel_mut(px, py), image.get_pixel(sx, sy));
            }
        }
        self.painted += 1;
    }
}

/// Decode an image, shrink it to its placed size and attach its soft mask
fn load_with_alpha(
    doc: &Document,
    stream: &Stream,
    placed_w: u32,
    placed_h: u32,
) -> std::result::Result<RgbaImage, String> {
    let decoded = decode_image_xobject(doc, stream)?;
    let decoded = shrink_to(decoded, placed_w, placed_h);
    let (w, h) = decoded.dimensions();
    let mut rgba = decoded.to_rgba8();

    let smask = stream
        .dict
        .get(b"SMask")
        .ok()
        .and_then(|m| resolve(doc, m))
        .and_then(|m| m.as_stream().ok());
    if let Some(mask_stream) = smask {
        match decode_image_xobject(doc, mask_stream) {
            Ok(mask) => {
                let mask = mask.resize_exact(w, h, image::imageops::FilterType::Triangle);
                let alpha = mask.to_luma8();
                for (pixel, a) in rgba.pixels_mut().zip(alpha.pixels()) {
                    pixel.0[3] = a.0[0];
                }
            }
            Err(reason) => log::debug!("Ignoring soft mask: {}", reason),
        }
    }
    Ok(rgba)
}

fn shrink_to(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if width < w && height < h {
        image.thumbnail_exact(width, height)
    } else {
        image
    }
}

fn blend(dst: &mut Rgba<u8>, src: &Rgba<u8>) {
    let alpha = src.0[3] as u32;
    if alpha == 255 {
        *dst = *src;
        return;
    }
    for channel in 0..3 {
        let fg = src.0[channel] as u32 * alpha;
        let bg = dst.0[channel] as u32 * (255 - alpha);
        dst.0[channel] = ((fg + bg + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    /// One-page document whose content draws `image` under `cm`
    fn page_with_image(cm: &str, image: Stream) -> SourceDocument {
        page_with_content(&format!("q {} cm /Im0 Do Q", cm), image)
    }

    /// One-page 100x100 document with `image` available as `/Im0`
    fn page_with_content(content: &str, image: Stream) -> SourceDocument {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(image);
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        SourceDocument::from_document("test.pdf", 0, doc).unwrap()
    }

    fn red_pixel() -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![255, 0, 0],
        )
    }

    #[test]
    fn test_image_is_placed_through_ctm() {
        // Image covers the lower-left quarter of the page
        let source = page_with_image("50 0 0 50 0 0", red_pixel());
        let page = source.pages()[0];
        let canvas = XObjectRenderer.render_page(&source, &page, 1.0).unwrap().to_rgba8();

        assert_eq!(canvas.dimensions(), (100, 100));
        assert_eq!(canvas.get_pixel(10, 90).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(10, 10).0, [255, 255, 255, 255]);
        assert_eq!(canvas.get_pixel(90, 90).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_scale_changes_canvas_size() {
        let source = page_with_image("100 0 0 100 0 0", red_pixel());
        let page = source.pages()[0];
        let canvas = XObjectRenderer.render_page(&source, &page, 2.0).unwrap();
        assert_eq!(canvas.dimensions(), (200, 200));
        assert_eq!(canvas.to_rgba8().get_pixel(199, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_vertical_flip_follows_matrix() {
        // Two-row image: top row red, bottom row blue; drawn upside down
        let image = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 2,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![255, 0, 0, 0, 0, 255],
        );
        let source = page_with_image("100 0 0 -100 0 100", image);
        let page = source.pages()[0];
        let canvas = XObjectRenderer.render_page(&source, &page, 1.0).unwrap().to_rgba8();
        assert_eq!(canvas.get_pixel(50, 10).0, [0, 0, 255, 255]);
        assert_eq!(canvas.get_pixel(50, 90).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_oversized_placement_is_clipped() {
        // 10x the page, centred on it
        let source = page_with_image("1000 0 0 1000 -450 -450", red_pixel());
        let page = source.pages()[0];
        let canvas = XObjectRenderer.render_page(&source, &page, 1.0).unwrap().to_rgba8();
        assert_eq!(canvas.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(99, 99).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_visible_text_is_a_render_error() {
        let source = page_with_content(
            "q 100 0 0 100 0 0 cm /Im0 Do Q BT /F1 12 Tf 10 10 Td (Hello) Tj ET",
            red_pixel(),
        );
        let page = source.pages()[0];
        let err = XObjectRenderer.render_page(&source, &page, 1.0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Render);
        assert!(err.to_string().contains("`Tj`"), "{}", err);
    }

    #[test]
    fn test_vector_fill_is_a_render_error() {
        let source = page_with_content("0 0 1 rg 10 10 50 50 re f", red_pixel());
        let page = source.pages()[0];
        let err = XObjectRenderer.render_page(&source, &page, 1.0).unwrap_err();
        assert!(err.to_string().contains("`f`"), "{}", err);
    }

    #[test]
    fn test_invisible_text_over_scan_is_accepted() {
        let source = page_with_content(
            "q 100 0 0 100 0 0 cm /Im0 Do Q BT 3 Tr /F1 12 Tf 10 10 Td (OCR) Tj ET \
             q 10 10 20 20 re W n Q",
            red_pixel(),
        );
        let page = source.pages()[0];
        let canvas = XObjectRenderer.render_page(&source, &page, 1.0).unwrap().to_rgba8();
        assert_eq!(canvas.get_pixel(50, 50).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_text_mode_restored_by_q() {
        let source = page_with_content("q 3 Tr Q BT /F1 12 Tf (Seen) Tj ET", red_pixel());
        let page = source.pages()[0];
        assert!(XObjectRenderer.render_page(&source, &page, 1.0).is_err());
    }

    #[test]
    fn test_blend_half_alpha() {
        let mut dst = Rgba([255, 255, 255, 255]);
        blend(&mut dst, &Rgba([0, 0, 0, 128]));
        assert_eq!(dst.0[0], 127);
        assert_eq!(dst.0[3], 255);
    }
}
