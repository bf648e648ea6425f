//! Turning encoded images into the flat RGB population the engine consumes.

use std::path::Path;

use image::{DynamicImage, GenericImageView, RgbaImage};

use crate::{KMeansError, Pixel, Result, CHANNELS};

/// A decoded image as a flat, row-major byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel in `data`.
    pub stride: usize,
    pub data: Vec<u8>,
}

impl RawImage {
    fn from_dynamic(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            stride: 4,
            data: rgba.into_raw(),
        }
    }

    /// Drop everything past the colour channels.
    pub fn pixels(&self) -> Result<Vec<Pixel>> {
        format_pixels(&self.data, self.stride)
    }

    /// Shrink the image, keeping aspect ratio, so neither side exceeds
    /// `limit`. Images already within bounds are returned unchanged.
    pub fn downscale(self, limit: u32) -> Result<Self> {
        if limit == 0 {
            return Err(KMeansError::InvalidConfig(
                "max_dimension must be greater than zero".into(),
            ));
        }
        if self.width <= limit && self.height <= limit {
            return Ok(self);
        }
        if self.stride != 4 {
            return Err(KMeansError::InvalidInput(format!(
                "cannot downscale a {}-byte-per-pixel buffer",
                self.stride
            )));
        }
        let (width, height) = (self.width, self.height);
        let buffer = RgbaImage::from_raw(width, height, self.data).ok_or_else(|| {
            KMeansError::InvalidInput(format!(
                "buffer is too small for a {width}x{height} RGBA image"
            ))
        })?;
        let scaled = DynamicImage::ImageRgba8(buffer).thumbnail(limit, limit);
        tracing::debug!(width = scaled.width(), height = scaled.height(), "downscaled image");
        Ok(Self::from_dynamic(&scaled))
    }
}

/// Decode the image at `path` into an RGBA buffer.
pub fn decode_image<P: AsRef<Path>>(path: P) -> Result<RawImage> {
    let path = path.as_ref();
    let image = image::open(path)?;
    tracing::debug!(path = ?path, width = image.width(), height = image.height(), "decoded image");
    Ok(RawImage::from_dynamic(&image))
}

/// Decode `path` and return its pixels as RGB triples.
///
/// With `max_dimension` set, larger images are first shrunk (keeping aspect
/// ratio) so neither side exceeds it.
pub fn load_pixels<P: AsRef<Path>>(path: P, max_dimension: Option<u32>) -> Result<Vec<Pixel>> {
    let mut raw = decode_image(path)?;
    if let Some(limit) = max_dimension {
        raw = raw.downscale(limit)?;
    }
    raw.pixels()
}

/// Split `raw` into `stride`-byte chunks and keep the first three bytes of each.
pub fn format_pixels(raw: &[u8], stride: usize) -> Result<Vec<Pixel>> {
    if stride < CHANNELS {
        return Err(KMeansError::InvalidInput(format!(
            "pixel stride {stride} is smaller than {CHANNELS} channels"
        )));
    }
    if raw.len() % stride != 0 {
        return Err(KMeansError::InvalidInput(format!(
            "buffer of {} bytes is not a whole number of {stride}-byte pixels",
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(stride)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::PathBuf;

    fn scratch_png(name: &str, image: &RgbaImage) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "dominant-colours-{}-{name}.png",
            std::process::id()
        ));
        image.save(&path).expect("write test image");
        path
    }

    #[test]
    fn alpha_is_stripped() {
        let raw = [1, 2, 3, 255, 4, 5, 6, 0];
        let pixels = format_pixels(&raw, 4).expect("well formed");
        assert_eq!(pixels, vec![[1, 2, 3], [4, 5, 6]]);
    }

    #[test]
    fn rgb_buffers_pass_through() {
        let raw = [10, 20, 30, 40, 50, 60];
        assert_eq!(
            format_pixels(&raw, 3).expect("well formed"),
            vec![[10, 20, 30], [40, 50, 60]]
        );
    }

    #[test]
    fn malformed_buffers_are_rejected() {
        assert!(matches!(
            format_pixels(&[1, 2, 3, 4], 2),
            Err(KMeansError::InvalidInput(_))
        ));
        assert!(matches!(
            format_pixels(&[1, 2, 3, 4, 5], 4),
            Err(KMeansError::InvalidInput(_))
        ));
    }

    #[test]
    fn decodes_png_row_major() {
        let image = RgbaImage::from_fn(2, 2, |x, y| Rgba([x as u8 * 100, y as u8 * 100, 7, 128]));
        let path = scratch_png("row-major", &image);

        let raw = decode_image(&path).expect("decodes");
        assert_eq!((raw.width, raw.height, raw.stride), (2, 2, 4));
        let pixels = load_pixels(&path, None).expect("decodes");
        assert_eq!(
            pixels,
            vec![[0, 0, 7], [100, 0, 7], [0, 100, 7], [100, 100, 7]]
        );
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn large_images_are_downscaled() {
        let image = RgbaImage::from_pixel(64, 32, Rgba([9, 9, 9, 255]));
        let path = scratch_png("downscale", &image);

        let pixels = load_pixels(&path, Some(16)).expect("decodes");
        assert!(!pixels.is_empty());
        assert!(pixels.len() <= 16 * 16);
        assert!(pixels.iter().all(|p| *p == [9, 9, 9]));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn raw_buffers_downscale_in_place() {
        let raw = RawImage {
            width: 40,
            height: 20,
            stride: 4,
            data: [200, 10, 30, 255].repeat(40 * 20),
        };
        let scaled = raw.downscale(10).expect("downscales");
        assert!(scaled.width <= 10 && scaled.height <= 10);
        assert_eq!(scaled.data.len(), (scaled.width * scaled.height) as usize * 4);
        assert!(scaled.pixels().expect("rgba").iter().all(|p| *p == [200, 10, 30]));
    }

    #[test]
    fn small_or_malformed_raw_buffers() {
        let raw = RawImage {
            width: 2,
            height: 1,
            stride: 4,
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };
        assert_eq!(raw.clone().downscale(16).expect("unchanged"), raw);
        assert!(matches!(
            raw.clone().downscale(0),
            Err(KMeansError::InvalidConfig(_))
        ));
        let short = RawImage {
            width: 8,
            height: 8,
            stride: 4,
            data: vec![0; 12],
        };
        assert!(matches!(
            short.downscale(2),
            Err(KMeansError::InvalidInput(_))
        ));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let err = load_pixels("/definitely/not/here.png", None).unwrap_err();
        assert!(matches!(err, KMeansError::Decode(_)));
    }
}
