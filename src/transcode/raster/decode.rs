//! Decoding of image XObjects into pixel buffers.

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, Stream};

use crate::pdf::objects::{name_of, number, resolve, stream_bytes};

const MAX_COLOR_SPACE_DEPTH: usize = 4;

/// Palette entry used when an index points past the lookup table
static MISSING_ENTRY: [u8; 4] = [0; 4];

#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed { base: Box<ColorSpace>, lookup: Vec<u8> },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    fn parse(doc: &Document, obj: &Object, depth: usize) -> Option<ColorSpace> {
        if depth > MAX_COLOR_SPACE_DEPTH {
            return None;
        }
        match resolve(doc, obj)? {
            Object::Name(name) => Self::from_family(name),
            Object::Array(items) => {
                let family = items.first().and_then(|o| resolve(doc, o)).and_then(name_of)?;
                match family {
                    b"ICCBased" => {
                        let profile = match resolve(doc, items.get(1)?)? {
                            Object::Stream(stream) => stream,
                            _ => return None,
                        };
                        match profile.dict.get(b"N").ok().and_then(number) {
                            Some(n) if n == 1.0 => Some(ColorSpace::Gray),
                            Some(n) if n == 3.0 => Some(ColorSpace::Rgb),
                            Some(n) if n == 4.0 => Some(ColorSpace::Cmyk),
                            _ => profile
                                .dict
                                .get(b"Alternate")
                                .ok()
                                .and_then(|alt| Self::parse(doc, alt, depth + 1)),
                        }
                    }
                    b"Indexed" | b"I" => {
                        let base = Self::parse(doc, items.get(1)?, depth + 1)?;
                        let lookup = match resolve(doc, items.get(3)?)? {
                            Object::String(bytes, _) => bytes.clone(),
                            Object::Stream(stream) => stream_bytes(stream).ok()?,
                            _ => return None,
                        };
                        Some(ColorSpace::Indexed {
                            base: Box::new(base),
                            lookup,
                        })
                    }
                    other => Self::from_family(other),
                }
            }
            _ => None,
        }
    }

    fn from_family(name: &[u8]) -> Option<ColorSpace> {
        match name {
            b"DeviceGray" | b"CalGray" | b"G" => Some(ColorSpace::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
            _ => None,
        }
    }
}

fn dict_u32(stream: &Stream, key: &[u8]) -> Option<u32> {
    stream
        .dict
        .get(key)
        .ok()
        .and_then(number)
        .filter(|n| *n > 0.0)
        .map(|n| n as u32)
}

fn filter_names(doc: &Document, stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter").ok().and_then(|f| resolve(doc, f)) {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| resolve(doc, item).and_then(name_of).map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode an image XObject stream into an 8-bit buffer.
///
/// Errors describe why the image was skipped; callers treat them as "not
/// paintable" rather than as job failures.
pub fn decode_image_xobject(doc: &Document, stream: &Stream) -> Result<DynamicImage, String> {
    let is_mask = stream
        .dict
        .get(b"ImageMask")
        .ok()
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false);
    if is_mask {
        return Err("stencil masks carry no colour".to_string());
    }

    let filters = filter_names(doc, stream);
    match filters.last().map(Vec::as_slice) {
        Some(b"DCTDecode") | Some(b"DCT") if filters.len() == 1 => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|e| format!("JPEG decode failed: {}", e));
        }
        Some(b"DCTDecode") | Some(b"DCT") => {
            return Err("chained DCT filters are not supported".to_string());
        }
        Some(b"JPXDecode") | Some(b"JBIG2Decode") | Some(b"CCITTFaxDecode") => {
            return Err(format!(
                "{} images are not supported",
                String::from_utf8_lossy(filters.last().map(Vec::as_slice).unwrap_or_default())
            ));
        }
        _ => {}
    }

    let width = dict_u32(stream, b"Width").ok_or("missing /Width")?;
    let height = dict_u32(stream, b"Height").ok_or("missing /Height")?;
    let bpc = dict_u32(stream, b"BitsPerComponent").unwrap_or(8);
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(format!("unsupported bit depth {}", bpc));
    }

    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|cs| ColorSpace::parse(doc, cs, 0))
        .ok_or("unsupported colour space")?;

    let data = stream_bytes(stream).map_err(|e| format!("stream decode failed: {}", e))?;
    let samples = unpack_samples(&data, width, height, color_space.components(), bpc)?;

    let invert = color_space == ColorSpace::Gray && decode_is_inverted(doc, stream);
    to_image(samples, width, height, bpc, &color_space, invert)
}

fn decode_is_inverted(doc: &Document, stream: &Stream) -> bool {
    match stream.dict.get(b"Decode").ok().and_then(|d| resolve(doc, d)) {
        Some(Object::Array(items)) => {
            let nums: Vec<f32> = items.iter().filter_map(number).collect();
            matches!(nums.as_slice(), [lo, hi] if lo > hi)
        }
        _ => false,
    }
}

/// Split packed rows into one byte per sample, keeping the raw sample values
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bpc: u32,
) -> Result<Vec<u8>, String> {
    let per_row = width as usize * components;
    let row_bytes = (per_row * bpc as usize).div_ceil(8);
    let needed = row_bytes * height as usize;
    if data.len() < needed {
        return Err(format!(
            "image data too short: {} bytes, expected {}",
            data.len(),
            needed
        ));
    }

    if bpc == 8 {
        return Ok(data[..needed].to_vec());
    }

    let mut samples = Vec::with_capacity(per_row * height as usize);
    for row in data[..needed].chunks_exact(row_bytes) {
        if bpc == 16 {
            samples.extend(row.chunks_exact(2).take(per_row).map(|pair| pair[0]));
            continue;
        }
        let mask = (1u16 << bpc) - 1;
        for i in 0..per_row {
            let bit = i * bpc as usize;
            let byte = row[bit / 8] as u16;
            let shift = 8 - bpc as usize - (bit % 8);
            samples.push(((byte >> shift) & mask) as u8);
        }
    }
    Ok(samples)
}

fn scale_sample(value: u8, bpc: u32) -> u8 {
    match bpc {
        1 => value * 255,
        2 => value * 85,
        4 => value * 17,
        _ => value,
    }
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let k = 255 - k as u32;
    [
        ((255 - c as u32) * k / 255) as u8,
        ((255 - m as u32) * k / 255) as u8,
        ((255 - y as u32) * k / 255) as u8,
    ]
}

fn to_image(
    samples: Vec<u8>,
    width: u32,
    height: u32,
    bpc: u32,
    color_space: &ColorSpace,
    invert: bool,
) -> Result<DynamicImage, String> {
    let image = match color_space {
        ColorSpace::Gray => {
            let pixels: Vec<u8> = samples
                .into_iter()
                .map(|s| scale_sample(s, bpc))
                .map(|s| if invert { 255 - s } else { s })
                .collect();
            DynamicImage::ImageLuma8(
                GrayImage::from_raw(width, height, pixels).ok_or("gray buffer size mismatch")?,
            )
        }
        ColorSpace::Rgb => {
            let pixels: Vec<u8> = samples.into_iter().map(|s| scale_sample(s, bpc)).collect();
            DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, pixels).ok_or("rgb buffer size mismatch")?,
            )
        }
        ColorSpace::Cmyk => {
            let mut pixels = Vec::with_capacity(samples.len() / 4 * 3);
            for px in samples.chunks_exact(4) {
                let [c, m, y, k] = [px[0], px[1], px[2], px[3]].map(|s| scale_sample(s, bpc));
                pixels.extend(cmyk_to_rgb(c, m, y, k));
            }
            DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, pixels).ok_or("cmyk buffer size mismatch")?,
            )
        }
        ColorSpace::Indexed { base, lookup } => {
            let n = base.components();
            let mut pixels = Vec::with_capacity(samples.len() * 3);
            for index in samples {
                let start = index as usize * n;
                let entry = lookup.get(start..start + n).unwrap_or(&MISSING_ENTRY[..n]);
                let rgb = match base.as_ref() {
                    ColorSpace::Gray => [entry[0]; 3],
                    ColorSpace::Rgb => [entry[0], entry[1], entry[2]],
                    ColorSpace::Cmyk => cmyk_to_rgb(entry[0], entry[1], entry[2], entry[3]),
                    ColorSpace::Indexed { .. } => return Err("nested indexed colour space".into()),
                };
                pixels.extend(rgb);
            }
            DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, pixels).ok_or("indexed buffer size mismatch")?,
            )
        }
    };
    Ok(image)
}
