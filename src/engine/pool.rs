// src/engine/pool.rs
//
// Global thread pool for draw+encode jobs.
//
// A single lazily built pool is shared by every pipeline. Encoding is CPU-bound
// and must not run on the async executor's threads; the pool keeps it off them
// without creating threads per request.
//
// Changes to the thread count after first use have no effect.

use rayon::ThreadPool;
use std::sync::OnceLock;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

/// Environment override for the worker thread count.
pub const THREADS_ENV: &str = "PHOTO_FIT_THREADS";

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// The shared worker pool, or `None` if no pool could be built on this
/// platform. Callers fall back to inline execution in that case.
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let num_threads = configured_threads();
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("photo-fit-worker-{i}"))
                .build()
                .or_else(|e| {
                    tracing::warn!(
                        target: "photo_fit::pool",
                        error = %e,
                        num_threads,
                        "falling back to minimal pool"
                    );
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(MIN_RAYON_THREADS)
                        .build()
                })
                .map_err(|e| {
                    tracing::warn!(
                        target: "photo_fit::pool",
                        error = %e,
                        "worker pool unavailable"
                    );
                })
                .ok()
        })
        .as_ref()
}

/// Whether background execution is possible at all.
pub fn is_available() -> bool {
    get_pool().is_some()
}

fn configured_threads() -> usize {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_RAYON_THREADS)
        })
        .max(MIN_RAYON_THREADS)
}
