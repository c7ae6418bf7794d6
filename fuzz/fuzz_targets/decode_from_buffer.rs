#![no_main]

use libfuzzer_sys::fuzz_target;
use photo_fit::engine::{DecodeCascade, DecoderConfig, InputFile};
use std::sync::OnceLock;

fn runtime() -> &'static tokio::runtime::Runtime {
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("fuzz runtime")
    })
}

fuzz_target!(|data: &[u8]| {
    let cascade = DecodeCascade::new(DecoderConfig {
        strategy_timeout_ms: 1_000,
        ..Default::default()
    });
    let file = InputFile::new(data.to_vec());
    let _ = runtime().block_on(cascade.decode(&file, None));
});
