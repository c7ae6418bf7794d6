#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use photo_fit::engine::{fit, letterbox_placement, Dimensions, FitMode};

#[derive(Arbitrary, Debug)]
struct Input {
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
}

fuzz_target!(|data: Input| {
    let source = Dimensions::new(data.source_width, data.source_height);
    let target = Dimensions::new(data.target_width, data.target_height);

    match fit(source, target, FitMode::Cover) {
        Ok(rect) => {
            assert!(!source.is_empty() && !target.is_empty());
            assert!(rect.fits_within(source.width, source.height));
        }
        Err(_) => assert!(source.is_empty() || target.is_empty()),
    }

    if let Ok(place) = letterbox_placement(source, target) {
        assert!(place.fits_within(target.width, target.height));
    }
});
