use std::fs;
use std::io::Cursor;
use std::path::Path;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Files at or below this size are stored exactly as uploaded.
pub const SIZE_THRESHOLD: u64 = 1024 * 1024;
/// Longest edge allowed after downsampling.
pub const MAX_DIMENSION: u32 = 1200;
pub const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalized {
    Untouched { bytes: u64 },
    Rewritten { before: u64, after: u64, width: u32, height: u32 },
}

/// Downsamples the image at `path` in place when it is larger than
/// [`SIZE_THRESHOLD`]. If decoding or encoding fails the file is removed
/// and the error returned.
pub fn normalize_in_place(path: &Path) -> Result<Normalized> {
    let before = fs::metadata(path)?.len();
    if before <= SIZE_THRESHOLD {
        return Ok(Normalized::Untouched { bytes: before });
    }

    match rewrite(path, before) {
        Ok(outcome) => {
            if let Normalized::Rewritten { after, width, height, .. } = outcome {
                info!("Downsampled {:?}: {} -> {} bytes, {}x{}", path, before, after, width, height);
            }
            Ok(outcome)
        }
        Err(e) => {
            warn!("Failed to downsample {:?}, removing it: {}", path, e);
            if let Err(rm) = fs::remove_file(path) {
                warn!("Could not remove {:?}: {}", path, rm);
            }
            Err(e)
        }
    }
}

fn rewrite(path: &Path, before: u64) -> Result<Normalized> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .or_else(|| ImageFormat::from_path(path).ok())
        .unwrap_or(ImageFormat::Jpeg);
    let image = reader.decode()?;

    let original = image.dimensions();
    let image = fit_within(image, MAX_DIMENSION);
    let (width, height) = image.dimensions();

    let encoded = encode(&image, format)?;
    let after = encoded.len() as u64;
    // Re-encoding alone must never grow the file.
    if (width, height) == original && after >= before {
        debug!("Keeping {:?} as uploaded, re-encoding gives {} bytes", path, after);
        return Ok(Normalized::Untouched { bytes: before });
    }

    fs::write(path, &encoded)?;
    Ok(Normalized::Rewritten { before, after, width, height })
}

/// Shrinks proportionally so neither edge exceeds `bound`. Never upscales.
pub fn fit_within(image: DynamicImage, bound: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= bound && height <= bound {
        return image;
    }
    image.resize(bound, bound, FilterType::Lanczos3)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)?;
        }
        other => image.write_to(&mut buffer, other)?,
    }
    Ok(buffer.into_inner())
}
