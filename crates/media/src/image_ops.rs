//! Image processing for chat attachments.
//!
//! Two families of operations live here:
//! - [`ImageOptimizer`]: the final pass before bytes are sent to a model. It
//!   bounds the longest edge and recompresses at a fixed quality, so the same
//!   input always yields the same output.
//! - [`crop_to_square`] / [`fit_to_square`]: the raster transforms behind
//!   cached thumbnail and AI-sized representations.

use std::io::Cursor;

use {
    image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, imageops::FilterType},
    tracing::debug,
};

use crate::{Error, Result};

/// Longest edge the optimizer lets through.
pub const DEFAULT_MAX_DIMENSION: u32 = 1568;

/// Maximum encoded size accepted by vision APIs (5MB).
pub const MAX_FILE_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// JPEG quality used by the optimizer (0-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Output of the optimizer or a square transform.
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub data: Vec<u8>,
    /// MIME type of `data`.
    pub mime: String,
    pub original_width: u32,
    pub original_height: u32,
    pub final_width: u32,
    pub final_height: u32,
    pub was_resized: bool,
}

/// Deterministic recompression of raw image bytes.
///
/// Implementations must produce identical output for identical input. Callers
/// treat any `Err` as a failed stage and move on to their next strategy.
pub trait ImageOptimizer: Send + Sync {
    fn optimize(&self, raw: &[u8], mime_hint: &str) -> Result<OptimizedImage>;
}

/// Default optimizer backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct BoundedImageOptimizer {
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for BoundedImageOptimizer {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageOptimizer for BoundedImageOptimizer {
    fn optimize(&self, raw: &[u8], mime_hint: &str) -> Result<OptimizedImage> {
        let img = decode(raw, mime_hint)?;
        let (orig_width, orig_height) = img.dimensions();

        let (final_width, final_height, resized) = resize_to_fit(&img, self.max_dimension);
        let has_alpha = has_alpha(&img);
        let (mut data, mime) = encode(&resized, self.quality, has_alpha)?;

        if data.len() > MAX_FILE_SIZE_BYTES && !has_alpha {
            data = reduce_size_to_fit(&resized, MAX_FILE_SIZE_BYTES)?;
        }

        debug!(
            orig_width,
            orig_height,
            final_width,
            final_height,
            bytes_in = raw.len(),
            bytes_out = data.len(),
            "optimized image"
        );

        Ok(OptimizedImage {
            data,
            mime: mime.to_string(),
            original_width: orig_width,
            original_height: orig_height,
            final_width,
            final_height,
            was_resized: (final_width, final_height) != (orig_width, orig_height),
        })
    }
}

/// Width and height of an image without decoding the pixel data.
pub fn image_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| Error::invalid_input(format!("failed to guess image format: {e}")))?
        .into_dimensions()
        .map_err(|e| Error::image("failed to read image dimensions", e))
}

/// Centre-crop to a square and scale it down to `size` pixels.
///
/// Sources whose short edge is already below `size` are cropped but not
/// upscaled.
pub fn crop_to_square(data: &[u8], mime_hint: &str, size: u32, quality: u8) -> Result<OptimizedImage> {
    let img = decode(data, mime_hint)?;
    let (width, height) = img.dimensions();
    let side = width.min(height);
    if side == 0 {
        return Err(Error::invalid_input("image has no pixels"));
    }

    let x = (width - side) / 2;
    let y = (height - side) / 2;
    let mut square = img.crop_imm(x, y, side, side);
    if side > size {
        square = square.resize_exact(size, size, FilterType::Lanczos3);
    }

    let (final_width, final_height) = square.dimensions();
    let (out, mime) = encode(&square, quality, has_alpha(&img))?;
    Ok(OptimizedImage {
        data: out,
        mime: mime.to_string(),
        original_width: width,
        original_height: height,
        final_width,
        final_height,
        was_resized: side > size,
    })
}

/// Scale so the longest edge is at most `size`, preserving aspect ratio.
pub fn fit_to_square(data: &[u8], mime_hint: &str, size: u32, quality: u8) -> Result<OptimizedImage> {
    let img = decode(data, mime_hint)?;
    let (width, height) = img.dimensions();
    let (final_width, final_height, resized) = resize_to_fit(&img, size);
    let (out, mime) = encode(&resized, quality, has_alpha(&img))?;
    Ok(OptimizedImage {
        data: out,
        mime: mime.to_string(),
        original_width: width,
        original_height: height,
        final_width,
        final_height,
        was_resized: (final_width, final_height) != (width, height),
    })
}

fn decode(data: &[u8], mime_hint: &str) -> Result<DynamicImage> {
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| Error::invalid_input(format!("failed to guess image format: {e}")))?;

    if reader.format().is_none() {
        match ImageFormat::from_mime_type(mime_hint) {
            Some(format) => reader.set_format(format),
            None => {
                return Err(Error::invalid_input(format!(
                    "unrecognized image data (hint: {mime_hint})"
                )));
            },
        }
    }

    reader
        .decode()
        .map_err(|e| Error::image("failed to decode image", e))
}

fn has_alpha(img: &DynamicImage) -> bool {
    img.color().has_alpha()
}

/// Resize image to fit within max dimension, preserving aspect ratio.
fn resize_to_fit(img: &DynamicImage, max_dimension: u32) -> (u32, u32, DynamicImage) {
    let (width, height) = img.dimensions();

    if width <= max_dimension && height <= max_dimension {
        return (width, height, img.clone());
    }

    let ratio = if width > height {
        max_dimension as f64 / width as f64
    } else {
        max_dimension as f64 / height as f64
    };

    let new_width = ((width as f64 * ratio).round() as u32).max(1);
    let new_height = ((height as f64 * ratio).round() as u32).max(1);

    let resized = img.resize_exact(new_width, new_height, FilterType::Lanczos3);
    (new_width, new_height, resized)
}

/// PNG when transparency must survive, JPEG at `quality` otherwise.
fn encode(img: &DynamicImage, quality: u8, keep_alpha: bool) -> Result<(Vec<u8>, &'static str)> {
    if keep_alpha {
        let mut output = Cursor::new(Vec::new());
        img.write_to(&mut output, ImageFormat::Png)
            .map_err(|e| Error::image("failed to encode as PNG", e))?;
        return Ok((output.into_inner(), "image/png"));
    }
    encode_jpeg_with_quality(img, quality)
}

fn encode_jpeg_with_quality(img: &DynamicImage, quality: u8) -> Result<(Vec<u8>, &'static str)> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut output = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| Error::image("failed to encode as JPEG", e))?;
    Ok((output.into_inner(), "image/jpeg"))
}

/// Progressively reduce quality, then dimensions, until the image fits.
fn reduce_size_to_fit(img: &DynamicImage, max_bytes: usize) -> Result<Vec<u8>> {
    for quality in [80, 70, 60, 50, 40, 30] {
        let (data, _) = encode_jpeg_with_quality(img, quality)?;
        if data.len() <= max_bytes {
            return Ok(data);
        }
    }

    let (width, height) = img.dimensions();
    let smaller = (width.max(height) as f64 * 0.75).round() as u32;
    if smaller < 256 {
        return Err(Error::invalid_input(
            "image cannot be reduced to fit within size limit",
        ));
    }

    let (_, _, resized) = resize_to_fit(img, smaller);
    reduce_size_to_fit(&resized, max_bytes)
}
