use image::{DynamicImage, GenericImageView, RgbImage};
use photo_fit::engine::{
    apply_transform, draw_region, encode_to_fit, fit, letterbox_placement, Dimensions,
    EncodeAttempt, EngineResult, FitMode, FitRect, RasterEncoder, SizeFitConfig,
};
use photo_fit::{OutputMime, Preset, Transform};
use proptest::prelude::*;

fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

/// Size falls linearly with quality and area; never fails.
struct LinearEncoder {
    bytes_per_pixel: f32,
}

impl RasterEncoder for LinearEncoder {
    fn mime(&self) -> OutputMime {
        OutputMime::Jpeg
    }

    fn encode(&self, img: &DynamicImage, quality: f32) -> EngineResult<Vec<u8>> {
        let len = (img.width() * img.height()) as f32 * self.bytes_per_pixel * quality;
        Ok(vec![0u8; (len as usize).max(1)])
    }
}

fn dims_strategy() -> impl Strategy<Value = Dimensions> {
    (1u32..=10_000, 1u32..=10_000).prop_map(|(w, h)| Dimensions::new(w, h))
}

fn rotate_angle_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![
        Just(0),
        Just(90),
        Just(180),
        Just(270),
        Just(-90),
        Just(-180),
        Just(-270),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_cover_rect_is_inside_source(source in dims_strategy(), target in dims_strategy()) {
        let rect = fit(source, target, FitMode::Cover).unwrap();
        prop_assert!(rect.sw >= 1 && rect.sh >= 1);
        prop_assert!(rect.sx as u64 + rect.sw as u64 <= source.width as u64);
        prop_assert!(rect.sy as u64 + rect.sh as u64 <= source.height as u64);
        // One axis is always kept whole
        prop_assert!(rect.sw == source.width || rect.sh == source.height);
    }

    #[test]
    fn prop_cover_rect_matches_target_aspect(source in dims_strategy(), target in dims_strategy()) {
        let rect = fit(source, target, FitMode::Cover).unwrap();
        let (sw, sh) = (rect.sw as i128, rect.sh as i128);
        let (tw, th) = (target.width as i128, target.height as i128);
        let unclamped = rect.sw > 1 && rect.sh > 1;
        if unclamped {
            // Floor rounding loses at most one source pixel on the cropped axis
            prop_assert!((sw * th - sh * tw).abs() <= tw.max(th));
        }
    }

    #[test]
    fn prop_cover_rect_is_centered(source in dims_strategy(), target in dims_strategy()) {
        let rect = fit(source, target, FitMode::Cover).unwrap();
        let left = rect.sx;
        let right = source.width - rect.sx - rect.sw;
        let top = rect.sy;
        let bottom = source.height - rect.sy - rect.sh;
        prop_assert!(right >= left && right - left <= 1);
        prop_assert!(bottom >= top && bottom - top <= 1);
    }

    #[test]
    fn prop_fit_is_deterministic(source in dims_strategy(), target in dims_strategy()) {
        prop_assert_eq!(
            fit(source, target, FitMode::Cover).unwrap(),
            fit(source, target, FitMode::Cover).unwrap()
        );
    }

    #[test]
    fn prop_cover_of_exact_ratio_is_identity(w in 1u32..=2_000, h in 1u32..=2_000, k in 1u32..=4) {
        let source = Dimensions::new(w * k, h * k);
        let rect = fit(source, Dimensions::new(w, h), FitMode::Cover).unwrap();
        prop_assert_eq!(rect, FitRect::full(source.width, source.height));
    }

    #[test]
    fn prop_zero_dimension_rejected(other in 0u32..=100, zero_width in any::<bool>()) {
        let (w, h) = if zero_width { (0, other) } else { (other, 0) };
        prop_assert!(fit(Dimensions::new(w, h), Dimensions::new(10, 10), FitMode::Cover).is_err());
        prop_assert!(
            fit(Dimensions::new(10, 10), Dimensions::new(w, h), FitMode::Letterbox).is_err()
        );
    }

    #[test]
    fn prop_letterbox_placement_fits_canvas(source in dims_strategy(), target in dims_strategy()) {
        let rect = letterbox_placement(source, target).unwrap();
        prop_assert!(rect.sw >= 1 && rect.sh >= 1);
        prop_assert!(rect.sx + rect.sw <= target.width);
        prop_assert!(rect.sy + rect.sh <= target.height);
        prop_assert!(rect.sw == target.width || rect.sh == target.height);
        prop_assert_eq!(
            fit(source, target, FitMode::Letterbox).unwrap(),
            FitRect::full(source.width, source.height)
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_draw_region_hits_target_exactly(
        src_w in 1u32..=64,
        src_h in 1u32..=64,
        dst_w in 1u32..=48,
        dst_h in 1u32..=48,
    ) {
        let img = create_test_image(src_w, src_h);
        let rect = fit(
            Dimensions::new(src_w, src_h),
            Dimensions::new(dst_w, dst_h),
            FitMode::Cover,
        )
        .unwrap();
        let out = draw_region(&img, rect, dst_w, dst_h).unwrap();
        prop_assert_eq!(out.dimensions(), (dst_w, dst_h));
    }

    #[test]
    fn prop_rotate_valid_angles_preserve_dimensions(
        orig_w in 1u32..=64,
        orig_h in 1u32..=64,
        degrees in rotate_angle_strategy(),
    ) {
        let img = create_test_image(orig_w, orig_h);
        let transform = Transform {
            rotate: degrees,
            ..Default::default()
        };
        let result = apply_transform(img, &transform).unwrap();
        let swaps = matches!(degrees, 90 | -90 | 270 | -270);
        let expected = if swaps { (orig_h, orig_w) } else { (orig_w, orig_h) };
        prop_assert_eq!(result.dimensions(), expected);
    }

    #[test]
    fn prop_rotate_invalid_angles_error(
        degrees in (-360i32..=360).prop_filter("invalid rotation", |d| {
            !matches!(*d, 0 | 90 | 180 | 270 | 360 | -90 | -180 | -270 | -360)
        }),
    ) {
        let transform = Transform {
            rotate: degrees,
            ..Default::default()
        };
        prop_assert!(apply_transform(create_test_image(4, 3), &transform).is_err());
    }

    #[test]
    fn prop_budget_search_is_bounded(
        target_w in 1u32..=64,
        target_h in 1u32..=64,
        bytes_per_pixel in 0.1f32..50.0,
        max_bytes in 1u32..=20_000,
    ) {
        let img = create_test_image(target_w, target_h);
        let preset = Preset::custom(target_w, target_h).with_max_bytes(max_bytes);
        let encoder = LinearEncoder { bytes_per_pixel };
        let mut seen: Vec<EncodeAttempt> = Vec::new();
        let result = encode_to_fit(
            &img,
            FitRect::full(target_w, target_h),
            &preset,
            &encoder,
            &SizeFitConfig::default(),
            None,
            &mut |a: &EncodeAttempt| seen.push(*a),
        )
        .unwrap();

        // 12 quality encodes plus at most one downscale
        prop_assert!(seen.len() <= 13);
        prop_assert_eq!(result.attempts() as usize, seen.len());
        prop_assert!(seen.iter().filter(|a| a.downscaled).count() <= 1);
        prop_assert!(seen.iter().all(|a| a.quality >= 0.08 - 1e-6 && a.quality <= 0.92 + 1e-6));
        prop_assert_eq!(result.size_bytes(), result.bytes().len());

        if result.over_budget() {
            let smallest = seen.iter().map(|a| a.size_bytes).min().unwrap();
            prop_assert_eq!(result.size_bytes(), smallest);
        } else {
            prop_assert!(result.size_bytes() <= max_bytes as usize);
        }
    }
}
