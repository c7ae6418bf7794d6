// src/engine/raster.rs
//
// Raster operations: EXIF/caller orientation, alpha flattening, and drawing a
// source sub-rectangle onto a canvas of exact target dimensions.

use crate::engine::fitter::FitRect;
use crate::error::PhotoFitError;
use crate::ops::Transform;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};

type RasterResult<T> = std::result::Result<T, PhotoFitError>;

/// Apply an EXIF Orientation value (1-8). Unknown values leave the image as is.
pub fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(), // transpose
        6 => img.rotate90(),
        7 => img.rotate270().fliph(), // transverse
        8 => img.rotate270(),
        _ => img,
    }
}

/// Apply a caller-requested rotation followed by flips. Any multiple of 90
/// degrees is accepted, including full turns and negatives.
pub fn apply_transform(img: DynamicImage, transform: &Transform) -> RasterResult<DynamicImage> {
    let rotated = match transform.rotate.rem_euclid(360) {
        0 => img,
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => return Err(PhotoFitError::invalid_rotation(transform.rotate)),
    };
    let flipped = if transform.flip_h { rotated.fliph() } else { rotated };
    Ok(if transform.flip_v { flipped.flipv() } else { flipped })
}

/// Composite any alpha channel over a solid background. JPEG has no alpha, and
/// dropping it outright turns transparent regions black.
pub fn flatten_alpha(img: DynamicImage, background: [u8; 3]) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let rgb = RgbImage::from_fn(w, h, |x, y| {
        let p = rgba.get_pixel(x, y).0;
        let a = p[3] as u32;
        let blend = |c: u8, bg: u8| ((c as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8;
        image::Rgb([
            blend(p[0], background[0]),
            blend(p[1], background[1]),
            blend(p[2], background[2]),
        ])
    });
    DynamicImage::ImageRgb8(rgb)
}

/// Draw `rect` of `img` onto a new `dst_width x dst_height` canvas (Lanczos3).
///
/// When `rect` covers the whole image at the requested size the pixels are
/// returned untouched.
pub fn draw_region(
    img: &DynamicImage,
    rect: FitRect,
    dst_width: u32,
    dst_height: u32,
) -> RasterResult<DynamicImage> {
    let (src_w, src_h) = (img.width(), img.height());
    if dst_width == 0 || dst_height == 0 {
        return Err(PhotoFitError::invalid_dimensions(dst_width, dst_height));
    }
    if !rect.fits_within(src_w, src_h) {
        return Err(PhotoFitError::invalid_crop_rect(
            rect.sx, rect.sy, rect.sw, rect.sh, src_w, src_h,
        ));
    }

    let is_identity = rect.sx == 0
        && rect.sy == 0
        && rect.sw == src_w
        && rect.sh == src_h
        && (dst_width, dst_height) == (src_w, src_h);
    if is_identity {
        return Ok(img.clone());
    }

    // Select pixel layout without forcing RGBA when not needed
    let (pixel_type, mut src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.as_raw().clone()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.as_raw().clone()),
        other if !other.color().has_alpha() => (PixelType::U8x3, other.to_rgb8().into_raw()),
        other => (PixelType::U8x4, other.to_rgba8().into_raw()),
    };

    let options = ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
        .crop(
            rect.sx as f64,
            rect.sy as f64,
            rect.sw as f64,
            rect.sh as f64,
        );

    let primary = match fir::images::Image::from_slice_u8(
        src_w,
        src_h,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(src_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_w, src_h, pixel_type);
            aligned.buffer_mut().copy_from_slice(&src_pixels);
            resize_with_source_image(aligned, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary {
        Ok(out) => Ok(out),
        Err(err) => {
            tracing::debug!(
                target: "photo_fit::raster",
                %err,
                "fir resize failed, using image crate"
            );
            let cropped = img.crop_imm(rect.sx, rect.sy, rect.sw, rect.sh);
            Ok(cropped.resize_exact(dst_width, dst_height, FilterType::Lanczos3))
        }
    }
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let needs_premultiply = pixel_type == PixelType::U8x4;
    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "failed to create rgb image from resized data".to_string()),
        PixelType::U8x4 => RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "failed to create rgba image from resized data".to_string()),
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn draw_region_produces_exact_target_size() {
        let img = create_test_image(400, 300);
        let rect = FitRect::new(50, 0, 300, 300);
        let out = draw_region(&img, rect, 213, 213).unwrap();
        assert_eq!(out.dimensions(), (213, 213));
    }

    #[test]
    fn draw_region_identity_keeps_pixels() {
        let img = create_test_image(20, 10);
        let rect = FitRect::new(0, 0, 20, 10);
        let out = draw_region(&img, rect, 20, 10).unwrap();
        assert_eq!(out.to_rgb8().as_raw(), img.to_rgb8().as_raw());
    }

    #[test]
    fn draw_region_rejects_out_of_bounds_rect() {
        let img = create_test_image(20, 10);
        let rect = FitRect::new(15, 0, 10, 10);
        assert!(matches!(
            draw_region(&img, rect, 5, 5),
            Err(PhotoFitError::InvalidCropRect { .. })
        ));
        let rect = FitRect::new(0, 0, 20, 10);
        assert!(draw_region(&img, rect, 0, 5).is_err());
    }

    #[test]
    fn draw_region_handles_rgba_and_luma() {
        let rgba =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, image::Rgba([1, 2, 3, 128])));
        let rect = FitRect::new(0, 0, 32, 32);
        assert_eq!(draw_region(&rgba, rect, 8, 8).unwrap().dimensions(), (8, 8));

        let luma = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(32, 16, image::Luma([9])));
        let rect = FitRect::new(8, 0, 16, 16);
        let out = draw_region(&luma, rect, 4, 4).unwrap();
        assert_eq!(out.dimensions(), (4, 4));
        assert!(!out.color().has_alpha());
    }

    #[test]
    fn orientation_six_rotates_clockwise() {
        let img = create_test_image(40, 20);
        assert_eq!(apply_orientation(img.clone(), 6).dimensions(), (20, 40));
        assert_eq!(apply_orientation(img.clone(), 1).dimensions(), (40, 20));
        assert_eq!(apply_orientation(img, 42).dimensions(), (40, 20));
    }

    #[test]
    fn transform_rotation_and_flip() {
        let img = create_test_image(40, 20);
        let t = Transform {
            rotate: -90,
            flip_h: true,
            flip_v: false,
        };
        assert_eq!(apply_transform(img.clone(), &t).unwrap().dimensions(), (20, 40));
        let bad = Transform {
            rotate: 45,
            ..Default::default()
        };
        assert!(matches!(
            apply_transform(img, &bad),
            Err(PhotoFitError::InvalidRotation { degrees: 45 })
        ));
    }

    #[test]
    fn rotation_beyond_one_turn_agrees_with_identity_check() {
        let img = create_test_image(40, 20);
        for (degrees, expected) in [
            (720, (40, 20)),
            (450, (20, 40)),
            (-450, (20, 40)),
            (-540, (40, 20)),
        ] {
            let t = Transform {
                rotate: degrees,
                ..Default::default()
            };
            assert_eq!(t.is_identity(), degrees % 360 == 0);
            assert_eq!(apply_transform(img.clone(), &t).unwrap().dimensions(), expected);
        }
        let bad = Transform {
            rotate: 405,
            ..Default::default()
        };
        assert!(matches!(
            apply_transform(img, &bad),
            Err(PhotoFitError::InvalidRotation { degrees: 405 })
        ));
    }

    #[test]
    fn flatten_alpha_blends_over_background() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 0])));
        let flat = flatten_alpha(img, [255, 255, 255]);
        assert!(!flat.color().has_alpha());
        assert_eq!(flat.to_rgb8().get_pixel(0, 0).0, [255, 255, 255]);

        let opaque = create_test_image(2, 2);
        assert_eq!(flatten_alpha(opaque.clone(), [0, 0, 0]).to_rgb8(), opaque.to_rgb8());
    }
}
