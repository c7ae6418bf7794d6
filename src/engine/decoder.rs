// src/engine/decoder.rs
//
// Decoder operations: native format decoders (mozjpeg, zune-png, libwebp,
// image crate) and the three decode strategies the cascade walks through.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::io::{format_from_mime, parse_data_uri, SourceHandle};
use crate::error::PhotoFitError;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, Limits, RgbImage,
    RgbaImage,
};
use mozjpeg::Decompress;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};

/// Decoder policy. Defaults are the canonical values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// Inputs shorter than this are rejected before any strategy runs.
    pub min_input_bytes: usize,
    /// Per-strategy wall-clock limit.
    ///
    /// The cascade stops waiting when this expires, but a blocking decoder
    /// cannot be interrupted. A strategy that hangs keeps its blocking thread
    /// and its `SourceHandle` until it returns on its own, so
    /// [`InputFile::outstanding_handles`](crate::engine::InputFile::outstanding_handles)
    /// may stay non-zero after the run has already failed or moved on.
    pub strategy_timeout_ms: u64,
    /// Retry every strategy against a repaired copy of the bytes.
    pub rebuild_and_retry: bool,
    /// Apply the EXIF Orientation tag after decoding.
    pub auto_orient: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_input_bytes: 64,
            strategy_timeout_ms: 5_000,
            rebuild_and_retry: true,
            auto_orient: true,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.min_input_bytes == 0 {
            return Err(PhotoFitError::invalid_config(
                "decoder.min_input_bytes",
                "must be at least 1",
            ));
        }
        if self.strategy_timeout_ms == 0 {
            return Err(PhotoFitError::invalid_config(
                "decoder.strategy_timeout_ms",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// A successfully decoded source raster.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub image: DynamicImage,
    /// Format sniffed from the bytes that decoded.
    pub format: Option<ImageFormat>,
    /// Name of the strategy that produced the raster.
    pub strategy: &'static str,
    /// Whether the raster came from the repaired buffer.
    pub rebuilt: bool,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// One way of turning bytes into a raster.
///
/// Strategies are blocking; the cascade runs each one on the blocking pool
/// under a timeout.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, source: &SourceHandle) -> EngineResult<DynamicImage>;
}

/// Sniff the magic bytes and use the format's native decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectStrategy;

impl DecodeStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn decode(&self, source: &SourceHandle) -> EngineResult<DynamicImage> {
        decode_image(source.bytes()).map(|(img, _)| img)
    }
}

/// Round-trip through a base64 `data:` URI and decode with the format the URI
/// declares rather than the one the bytes claim.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataUriStrategy;

impl DecodeStrategy for DataUriStrategy {
    fn name(&self) -> &'static str {
        "data-uri"
    }

    fn decode(&self, source: &SourceHandle) -> EngineResult<DynamicImage> {
        let uri = source.to_data_uri();
        let (mime, payload) = parse_data_uri(&uri)?;
        let format = format_from_mime(&mime).ok_or_else(|| {
            PhotoFitError::decode_failed(format!("data uri: no decoder for '{mime}'"))
        })?;
        run_with_panic_policy("decode:data-uri", || {
            image::load_from_memory_with_format(&payload, format)
                .map_err(|e| PhotoFitError::decode_failed(format!("data uri: {e}")))
        })
    }
}

/// Generic `ImageReader` path with a guessed format and allocation limits.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitmapStrategy;

impl DecodeStrategy for BitmapStrategy {
    fn name(&self) -> &'static str {
        "bitmap"
    }

    fn decode(&self, source: &SourceHandle) -> EngineResult<DynamicImage> {
        run_with_panic_policy("decode:bitmap", || {
            let mut reader = ImageReader::new(Cursor::new(source.bytes()))
                .with_guessed_format()
                .map_err(|e| PhotoFitError::decode_failed(format!("bitmap: {e}")))?;
            let mut limits = Limits::default();
            limits.max_image_width = Some(MAX_DIMENSION);
            limits.max_image_height = Some(MAX_DIMENSION);
            reader.limits(limits);
            let img = reader
                .decode()
                .map_err(|e| PhotoFitError::decode_failed(format!("bitmap: {e}")))?;
            check_dimensions(img.width(), img.height())?;
            Ok(img)
        })
    }
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        // libjpeg pads truncated scans with grey; leave those to the other strategies
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(PhotoFitError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            PhotoFitError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            PhotoFitError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width()).unwrap_or(u32::MAX);
        let height = u32::try_from(decompress.height()).unwrap_or(u32::MAX);
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            PhotoFitError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width, height, flat_pixels).ok_or_else(|| {
            PhotoFitError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode with the image crate under the panic policy.
pub fn decode_with_image_crate(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| PhotoFitError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| PhotoFitError::decode_failed(format!("png: decode failed: {e}")))?;

        let info = decoder
            .info()
            .ok_or_else(|| PhotoFitError::decode_failed("png: missing header info"))?;
        let (width, height) = (info.width as u32, info.height as u32);
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(PhotoFitError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| PhotoFitError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| PhotoFitError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA => RgbaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| PhotoFitError::decode_failed("png: failed to build RGBA image"))?,
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| PhotoFitError::decode_failed("png: failed to build Luma image"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| {
                    PhotoFitError::decode_failed("png: failed to build LumaA image")
                })?,
            other => {
                return Err(PhotoFitError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };

        Ok(img)
    })
}

/// Decode WebP using libwebp. Animated WebP goes through the image crate.
pub fn decode_webp_libwebp(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        // Parse header first to avoid allocating huge buffers on malformed files
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            PhotoFitError::decode_failed("webp: failed to read bitstream features")
        })?;

        if features.has_animation() {
            return image::load_from_memory(data).map_err(|e| {
                PhotoFitError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        check_dimensions(features.width(), features.height())?;

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| PhotoFitError::decode_failed("webp: decode failed"))?;
        check_dimensions(decoded.width(), decoded.height())?;

        Ok(decoded.to_image())
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Route to the native decoder for the sniffed format.
pub fn decode_image(bytes: &[u8]) -> EngineResult<(DynamicImage, Option<ImageFormat>)> {
    let detected = detect_format(bytes);
    let img = match detected {
        Some(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes)?,
        Some(ImageFormat::Png) => decode_png_zune(bytes)?,
        Some(ImageFormat::WebP) => decode_webp_libwebp(bytes)?,
        _ => decode_with_image_crate(bytes)?,
    };
    Ok((img, detected))
}

/// Reject decompression bombs: per-side and total pixel limits.
pub fn check_dimensions(width: u32, height: u32) -> EngineResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PhotoFitError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(PhotoFitError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    // Orientation may be stored as Short or Long
    let orientation = field.value.get_uint(0)? as u16;
    (1..=8).contains(&orientation).then_some(orientation)
}
