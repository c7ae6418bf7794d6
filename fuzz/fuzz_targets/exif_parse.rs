#![no_main]

//! Orientation detection and application on arbitrary data.

use image::{DynamicImage, RgbImage};
use libfuzzer_sys::fuzz_target;
use photo_fit::engine::{apply_orientation, detect_exif_orientation};

fuzz_target!(|data: &[u8]| {
    if let Some(orientation) = detect_exif_orientation(data) {
        assert!((1..=8).contains(&orientation));
        let img = DynamicImage::ImageRgb8(RgbImage::new(3, 2));
        let oriented = apply_orientation(img, orientation);
        let swapped = orientation >= 5;
        let expected = if swapped { (2, 3) } else { (3, 2) };
        assert_eq!((oriented.width(), oriented.height()), expected);
    }
});
