//! Lossless image optimization.
//!
//! - PNG is decoded and re-encoded with adaptive filtering at the configured
//!   compression level; the smaller of the two encodings is kept. Files with
//!   colour-space chunks (iCCP, sRGB, gAMA, cHRM, cICP) are kept as they are,
//!   since the encoder would drop them.
//! - JPEG loses its metadata segments (EXIF, XMP, comments) while the JFIF
//!   header, ICC profile, Adobe segment and all entropy-coded data stay
//!   byte-for-byte.
//! - GIF is validated by decoding and passed through.
//! - WebP and SVG pass through unchanged.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, ImageFormat};
use std::path::Path;
use thiserror::Error;

use crate::config::{ImagesConfig, PngCompression};
use crate::error::TransformError;
use crate::stream::{Asset, AssetResult};

/// Error type for image optimization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ImageError {
    /// The file is not a valid image of its format
    #[error("Failed to decode image: {0}")]
    Decode(String),
    /// Re-encoding failed
    #[error("Failed to encode image: {0}")]
    Encode(String),
    /// JPEG marker structure is broken
    #[error("Malformed JPEG: {0}")]
    Jpeg(String),
    /// Extension not handled by the optimizer
    #[error("Unsupported image format '{0}'")]
    Unsupported(String),
}

/// Image formats the optimizer recognises by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Webp,
    Svg,
}

impl ImageKind {
    /// Classify a path by its extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "gif" => Some(ImageKind::Gif),
            "webp" => Some(ImageKind::Webp),
            "svg" => Some(ImageKind::Svg),
            _ => None,
        }
    }
}

/// Optimizes image bytes according to `[images]` settings.
#[derive(Debug, Clone, Copy)]
pub struct ImageOptimizer {
    compression: CompressionType,
    strip_jpeg_metadata: bool,
}

impl ImageOptimizer {
    pub fn new(config: &ImagesConfig) -> Self {
        let compression = match config.png_compression {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        };
        Self { compression, strip_jpeg_metadata: config.strip_jpeg_metadata }
    }

    /// Optimize the bytes of a file at `path`.
    pub fn optimize(&self, bytes: &[u8], path: &Path) -> Result<Vec<u8>, ImageError> {
        let kind = ImageKind::from_path(path).ok_or_else(|| {
            ImageError::Unsupported(
                path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default(),
            )
        })?;

        match kind {
            ImageKind::Png => self.optimize_png(bytes),
            ImageKind::Jpeg if self.strip_jpeg_metadata => strip_jpeg_metadata(bytes),
            ImageKind::Jpeg => Ok(bytes.to_vec()),
            ImageKind::Gif => {
                image::load_from_memory_with_format(bytes, ImageFormat::Gif)
                    .map_err(|e| ImageError::Decode(e.to_string()))?;
                Ok(bytes.to_vec())
            }
            ImageKind::Webp | ImageKind::Svg => Ok(bytes.to_vec()),
        }
    }

    fn optimize_png(&self, bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        if has_color_chunks(bytes) {
            return Ok(bytes.to_vec());
        }

        let mut encoded = Vec::new();
        PngEncoder::new_with_quality(&mut encoded, self.compression, FilterType::Adaptive)
            .write_image(img.as_bytes(), img.width(), img.height(), img.color())
            .map_err(|e| ImageError::Encode(e.to_string()))?;

        if encoded.len() < bytes.len() {
            Ok(encoded)
        } else {
            Ok(bytes.to_vec())
        }
    }

    /// Stream stage optimizing one image asset.
    pub fn optimize_asset(&self, asset: Asset) -> AssetResult {
        let optimized = self
            .optimize(&asset.contents, &asset.source)
            .map_err(|source| TransformError::Image { path: asset.source.clone(), source })?;
        Ok(asset.with_contents(optimized))
    }
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const COLOR_CHUNKS: [&[u8; 4]; 5] = [b"iCCP", b"sRGB", b"gAMA", b"cHRM", b"cICP"];

/// Whether a PNG carries colour-space information ahead of its image data.
pub fn has_color_chunks(bytes: &[u8]) -> bool {
    if !bytes.starts_with(PNG_SIGNATURE) {
        return false;
    }
    let mut i = PNG_SIGNATURE.len();
    while let (Some(len), Some(kind)) = (bytes.get(i..i + 4), bytes.get(i + 4..i + 8)) {
        if kind == b"IDAT" || kind == b"IEND" {
            return false;
        }
        if COLOR_CHUNKS.iter().any(|c| c.as_slice() == kind) {
            return true;
        }
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        i = i.saturating_add(12).saturating_add(len);
    }
    false
}

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const APP2: u8 = 0xE2;
const APP14: u8 = 0xEE;
const COM: u8 = 0xFE;

/// Remove metadata segments from a JPEG without touching image data.
pub fn strip_jpeg_metadata(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != SOI {
        return Err(ImageError::Jpeg("missing start-of-image marker".to_string()));
    }

    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&bytes[..2]);
    let mut i = 2;

    loop {
        if i + 1 >= bytes.len() {
            return Err(ImageError::Jpeg("truncated before end-of-image".to_string()));
        }
        if bytes[i] != 0xFF {
            return Err(ImageError::Jpeg(format!("expected a marker at offset {}", i)));
        }
        // Fill bytes may precede a marker.
        while i + 1 < bytes.len() && bytes[i + 1] == 0xFF {
            i += 1;
        }
        let Some(&marker) = bytes.get(i + 1) else {
            return Err(ImageError::Jpeg("truncated marker".to_string()));
        };

        match marker {
            // Scan data and everything after it is copied verbatim.
            SOS | EOI => {
                out.extend_from_slice(&bytes[i..]);
                return Ok(out);
            }
            0x01 | 0xD0..=0xD7 => {
                out.extend_from_slice(&bytes[i..i + 2]);
                i += 2;
            }
            _ => {
                let Some(len_bytes) = bytes.get(i + 2..i + 4) else {
                    return Err(ImageError::Jpeg("truncated segment length".to_string()));
                };
                let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
                let end = i + 2 + len;
                if len < 2 || end > bytes.len() {
                    return Err(ImageError::Jpeg(format!("segment at offset {} overruns the file", i)));
                }
                if keep_segment(marker, &bytes[i + 4..end]) {
                    out.extend_from_slice(&bytes[i..end]);
                }
                i = end;
            }
        }
    }
}

fn keep_segment(marker: u8, payload: &[u8]) -> bool {
    match marker {
        APP0 => true,
        APP2 => payload.starts_with(b"ICC_PROFILE\0"),
        APP14 => payload.starts_with(b"Adobe"),
        0xE1..=0xEF | COM => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn optimizer() -> ImageOptimizer {
        ImageOptimizer::new(&ImagesConfig::default())
    }

    fn sample_png() -> (RgbaImage, Vec<u8>) {
        let img = RgbaImage::from_fn(32, 32, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 128])
            }
        });
        let mut bytes = Vec::new();
        PngEncoder::new_with_quality(&mut bytes, CompressionType::Fast, FilterType::NoFilter)
            .write_image(img.as_raw(), 32, 32, image::ColorType::Rgba8)
            .unwrap();
        (img, bytes)
    }

    fn sample_jpeg() -> Vec<u8> {
        let img = RgbImage::from_pixel(16, 16, Rgb([10, 120, 200]));
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, 90)
            .write_image(img.as_raw(), 16, 16, image::ColorType::Rgb8)
            .unwrap();
        bytes
    }

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let len = (payload.len() + 2) as u16;
        let mut seg = vec![0xFF, marker];
        seg.extend_from_slice(&len.to_be_bytes());
        seg.extend_from_slice(payload);
        seg
    }

    #[test]
    fn test_png_pixels_unchanged_and_not_larger() {
        let (img, bytes) = sample_png();
        let out = optimizer().optimize(&bytes, Path::new("a/b.PNG")).unwrap();
        assert!(out.len() <= bytes.len());
        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    fn crc32(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &b in data {
            crc ^= u32::from(b);
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut chunk = (data.len() as u32).to_be_bytes().to_vec();
        chunk.extend_from_slice(kind);
        chunk.extend_from_slice(data);
        let crc = crc32(&chunk[4..]);
        chunk.extend_from_slice(&crc.to_be_bytes());
        chunk
    }

    #[test]
    fn test_png_with_gamma_kept_as_is() {
        let (img, bytes) = sample_png();
        assert!(!has_color_chunks(&bytes));

        // Signature (8) plus IHDR (25) come first.
        let mut tagged = bytes[..33].to_vec();
        tagged.extend(png_chunk(b"gAMA", &45455u32.to_be_bytes()));
        tagged.extend_from_slice(&bytes[33..]);
        assert!(has_color_chunks(&tagged));

        let out = optimizer().optimize(&tagged, Path::new("tinted.png")).unwrap();
        assert_eq!(out, tagged);
        assert_eq!(image::load_from_memory(&out).unwrap().to_rgba8(), img);
    }

    #[test]
    fn test_jpeg_metadata_stripped() {
        let original = sample_jpeg();
        let mut tagged = original[..2].to_vec();
        tagged.extend(segment(0xE1, b"Exif\0\0fake-exif-data"));
        tagged.extend(segment(COM, b"made with a camera"));
        tagged.extend(segment(APP2, b"ICC_PROFILE\0\x01\x01profile"));
        tagged.extend_from_slice(&original[2..]);

        let out = optimizer().optimize(&tagged, Path::new("photo.jpg")).unwrap();
        let mut expected = original[..2].to_vec();
        expected.extend(segment(APP2, b"ICC_PROFILE\0\x01\x01profile"));
        expected.extend_from_slice(&original[2..]);
        assert_eq!(out, expected);
        assert!(image::load_from_memory(&out).is_ok());
    }

    #[test]
    fn test_jpeg_left_alone_when_disabled() {
        let config = ImagesConfig { strip_jpeg_metadata: false, ..ImagesConfig::default() };
        let mut tagged = sample_jpeg();
        tagged.splice(2..2, segment(COM, b"note"));
        let out = ImageOptimizer::new(&config).optimize(&tagged, Path::new("x.jpeg")).unwrap();
        assert_eq!(out, tagged);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(optimizer().optimize(b"nope", Path::new("x.jpg")), Err(ImageError::Jpeg(_))));
        assert!(matches!(optimizer().optimize(b"GIF89a", Path::new("x.gif")), Err(ImageError::Decode(_))));
        assert!(matches!(optimizer().optimize(b"x", Path::new("x.bmp")), Err(ImageError::Unsupported(_))));
    }

    #[test]
    fn test_passthrough_formats() {
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
        assert_eq!(optimizer().optimize(svg, Path::new("i.svg")).unwrap(), svg.to_vec());
        assert_eq!(optimizer().optimize(b"RIFF....WEBP", Path::new("i.webp")).unwrap(), b"RIFF....WEBP".to_vec());
    }
}
