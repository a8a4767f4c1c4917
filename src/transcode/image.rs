//! Image reduction: clamp dimensions, flatten alpha, re-encode as baseline JPEG.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

use crate::error::{CompressError, Result};

/// Background that transparent pixels are composited onto
const FLATTEN_BACKGROUND: [u8; 3] = [255, 255, 255];

/// A baseline JPEG ready to be embedded as a `/DCTDecode` image XObject
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

/// Downsample, flatten and encode a pixel buffer.
///
/// Buffers whose longest side exceeds `max_dimension` are resampled with a
/// Lanczos filter so the longest side equals `max_dimension`; smaller buffers
/// keep their size. Re-encoding an image that was already lossy is fine.
pub fn reduce_image(image: DynamicImage, max_dimension: u32, quality: u8) -> Result<EncodedImage> {
    let image = downsample(image, max_dimension);
    let rgb = flatten_alpha(&image);
    drop(image);

    let data = encode_jpeg(&rgb, quality)?;
    Ok(EncodedImage {
        data,
        width: rgb.width(),
        height: rgb.height(),
        quality,
    })
}

/// Target size with the longest side clamped to `max_dimension`, or `None`
/// when the image already fits
pub fn clamped_dimensions(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return None;
    }
    let ratio = max_dimension as f64 / width.max(height) as f64;
    let w = ((width as f64 * ratio).round() as u32).clamp(1, max_dimension);
    let h = ((height as f64 * ratio).round() as u32).clamp(1, max_dimension);
    Some((w, h))
}

pub fn downsample(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    match clamped_dimensions(width, height, max_dimension) {
        Some((w, h)) => {
            log::debug!("Downsampling {}x{} -> {}x{}", width, height, w, h);
            image.resize_exact(w, h, FilterType::Lanczos3)
        }
        None => image,
    }
}

/// Composite any alpha channel onto an opaque white background
pub fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let alpha = src.0[3] as u32;
        for channel in 0..3 {
            let fg = src.0[channel] as u32 * alpha;
            let bg = FLATTEN_BACKGROUND[channel] as u32 * (255 - alpha);
            dst.0[channel] = ((fg + bg + 127) / 255) as u8;
        }
    }
    rgb
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(CompressError::EncodingFailure(
            "cannot encode an empty pixel buffer".to_string(),
        ));
    }
    let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(CompressError::EncodingFailure(format!(
                "{}x{} exceeds the JPEG size limit",
                width, height
            )))
        }
    };

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality.clamp(1, 100));
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| CompressError::EncodingFailure(e.to_string()))?;

    Ok(jpeg_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_clamped_dimensions() {
        assert_eq!(clamped_dimensions(4000, 3000, 1600), Some((1600, 1200)));
        assert_eq!(clamped_dimensions(1000, 3000, 1200), Some((400, 1200)));
        assert_eq!(clamped_dimensions(1600, 1600, 1600), None);
        assert_eq!(clamped_dimensions(10, 20, 800), None);
    }

    #[test]
    fn test_extreme_aspect_keeps_one_pixel() {
        assert_eq!(clamped_dimensions(10_000, 1, 800), Some((800, 1)));
    }

    #[test]
    fn test_reduce_large_image() {
        let encoded = reduce_image(gradient(2000, 1000), 800, 50).unwrap();
        assert_eq!((encoded.width, encoded.height), (800, 400));
        assert_eq!(&encoded.data[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&encoded.data).unwrap();
        assert_eq!(decoded.dimensions(), (800, 400));
    }

    #[test]
    fn test_small_image_keeps_size() {
        let encoded = reduce_image(gradient(300, 200), 800, 80).unwrap();
        assert_eq!((encoded.width, encoded.height), (300, 200));
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let low = reduce_image(gradient(400, 400), 800, 10).unwrap();
        let high = reduce_image(gradient(400, 400), 800, 95).unwrap();
        assert!(low.data.len() < high.data.len());
    }

    #[test]
    fn test_flatten_transparent_to_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let rgb = flatten_alpha(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_recompressing_jpeg_is_not_an_error() {
        let first = reduce_image(gradient(256, 256), 800, 40).unwrap();
        let decoded = image::load_from_memory(&first.data).unwrap();
        let second = reduce_image(decoded, 800, 40).unwrap();
        assert_eq!((second.width, second.height), (256, 256));
    }
}
