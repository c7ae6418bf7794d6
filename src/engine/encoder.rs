// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg) and PNG (image + oxipng).
// Quality is a fraction in [0, 1]; PNG ignores it.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::raster::flatten_alpha;
use crate::error::PhotoFitError;
use crate::ops::OutputMime;
use image::{DynamicImage, ImageFormat};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;

use crate::engine::MAX_DIMENSION;

/// Background used when flattening transparency for JPEG output.
const JPEG_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Something that can turn a raster into compressed bytes.
///
/// The size-fitter only talks to this trait, so tests can substitute an
/// encoder that fails or reports fixed sizes.
pub trait RasterEncoder: Send + Sync {
    fn mime(&self) -> OutputMime;

    /// Encode at `quality` in [0, 1]. Lossless encoders ignore it.
    fn encode(&self, img: &DynamicImage, quality: f32) -> EngineResult<Vec<u8>>;
}

/// mozjpeg, progressive with optimized Huffman tables.
#[derive(Clone, Copy, Debug, Default)]
pub struct JpegEncoder {
    /// Skip scan/coding optimization for speed.
    pub fast_mode: bool,
}

impl RasterEncoder for JpegEncoder {
    fn mime(&self) -> OutputMime {
        OutputMime::Jpeg
    }

    fn encode(&self, img: &DynamicImage, quality: f32) -> EngineResult<Vec<u8>> {
        encode_jpeg_with_settings(img, quality_to_percent(quality), self.fast_mode)
    }
}

/// Lossless PNG re-compressed with oxipng.
#[derive(Clone, Copy, Debug)]
pub struct PngEncoder {
    /// oxipng preset, 0 (fast) to 6 (smallest).
    pub oxipng_preset: u8,
}

impl Default for PngEncoder {
    fn default() -> Self {
        Self { oxipng_preset: 4 }
    }
}

impl RasterEncoder for PngEncoder {
    fn mime(&self) -> OutputMime {
        OutputMime::Png
    }

    fn encode(&self, img: &DynamicImage, _quality: f32) -> EngineResult<Vec<u8>> {
        encode_png(img, self.oxipng_preset)
    }
}

/// Default encoder for an output type.
pub fn encoder_for(mime: OutputMime) -> Arc<dyn RasterEncoder> {
    match mime {
        OutputMime::Jpeg => Arc::new(JpegEncoder::default()),
        OutputMime::Png => Arc::new(PngEncoder::default()),
    }
}

/// Map a [0, 1] quality fraction onto libjpeg's 1-100 scale.
pub fn quality_to_percent(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Encode to JPEG with explicit fast mode control.
pub fn encode_jpeg_with_settings(
    img: &DynamicImage,
    quality: u8,
    fast_mode: bool,
) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let quality = quality.clamp(1, 100);

        // Avoid conversion if already RGB8
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            other if other.color().has_alpha() => {
                Cow::Owned(flatten_alpha(other.clone(), JPEG_BACKGROUND).to_rgb8())
            }
            other => Cow::Owned(other.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(PhotoFitError::invalid_dimensions(w, h));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(PhotoFitError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);

        let quality_f32 = quality as f32;
        comp.set_quality(quality_f32);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();

        if fast_mode {
            comp.set_optimize_coding(false);
            comp.set_optimize_scans(false);
        } else {
            comp.set_optimize_coding(true);
            comp.set_optimize_scans(true);
            comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        }
        comp.set_smoothing_factor(smoothing_for(quality_f32));

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                PhotoFitError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    PhotoFitError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                PhotoFitError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        Ok(output)
    })
}

// Heavier smoothing at low quality hides blocking on skin tones
fn smoothing_for(quality: f32) -> u8 {
    if quality >= 90.0 {
        0
    } else if quality >= 70.0 {
        5
    } else if quality >= 60.0 {
        10
    } else {
        18
    }
}

/// Encode to PNG using the image crate, then optimize losslessly with oxipng.
pub fn encode_png(img: &DynamicImage, oxipng_preset: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        if img.width() == 0 || img.height() == 0 {
            return Err(PhotoFitError::invalid_dimensions(img.width(), img.height()));
        }
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| PhotoFitError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let mut options = oxipng::Options::from_preset(oxipng_preset.min(6));
        options.strip = oxipng::StripChunks::Safe;

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            PhotoFitError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbImage, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        }))
    }

    #[test]
    fn test_encode_jpeg_produces_valid_jpeg() {
        let img = create_test_image(100, 100);
        let bytes = JpegEncoder::default().encode(&img, 0.8).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_jpeg_quality_affects_size() {
        let img = create_test_image(200, 200);
        let encoder = JpegEncoder::default();
        let high = encoder.encode(&img, 0.92).unwrap();
        let low = encoder.encode(&img, 0.5).unwrap();
        assert!(high.len() >= low.len());
    }

    #[test]
    fn test_encode_jpeg_fast_mode_produces_valid_jpeg() {
        let img = create_test_image(64, 64);
        let bytes = JpegEncoder { fast_mode: true }.encode(&img, 0.8).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 64));
    }

    #[test]
    fn test_encode_jpeg_flattens_alpha_to_white() {
        let img =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, image::Rgba([0, 0, 0, 0])));
        let bytes = JpegEncoder::default().encode(&img, 0.9).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert!(decoded.get_pixel(8, 8).0.iter().all(|&c| c > 240));
    }

    #[test]
    fn test_encode_png_produces_valid_png() {
        let img = create_test_image(50, 40);
        let bytes = PngEncoder::default().encode(&img, 0.1).unwrap();
        assert_eq!(&bytes[0..4], &[0x89, b'P', b'N', b'G']);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn test_quality_to_percent() {
        assert_eq!(quality_to_percent(0.92), 92);
        assert_eq!(quality_to_percent(0.08), 8);
        assert_eq!(quality_to_percent(0.0), 1);
        assert_eq!(quality_to_percent(1.7), 100);
    }

    #[test]
    fn test_encoder_for_mime() {
        assert_eq!(encoder_for(OutputMime::Jpeg).mime(), OutputMime::Jpeg);
        assert_eq!(encoder_for(OutputMime::Png).mime(), OutputMime::Png);
    }

    #[test]
    fn test_encode_rejects_empty_image() {
        let empty = DynamicImage::new_rgb8(0, 0);
        assert!(JpegEncoder::default().encode(&empty, 0.5).is_err());
        assert!(PngEncoder::default().encode(&empty, 0.5).is_err());
    }
}
