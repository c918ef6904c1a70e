// lib.rs
//
// pixpress: an on-device image recompression engine
//
// Design goals:
// - One abstract quality intent, calibrated per codec
// - Adaptive encoder effort bounded by image size
// - A single background worker that survives codec crashes
// - No silent failures: every request resolves to done or error

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod codecs;
pub mod engine;
pub mod error;
pub mod formats;
pub mod levels;
pub mod pixel;
pub mod request;

pub use engine::{
    Artifact, CompressionEngine, CompressionResult, TaskHandle, TaskOutcome, TaskState,
};
pub use error::{ErrorCategory, PixpressError};
pub use formats::{suggested_filename, Format};
pub use levels::{effective_level, resolve, LevelConfig, QualityLevel};
pub use pixel::PixelBuffer;
pub use request::{CompressionRequest, CompressorSettings, RequestId};

/// Get library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Mime types the dedicated decoders cover. Anything else still gets a shot
/// through the generic raster fallback before being rejected.
pub fn supported_input_mimes() -> Vec<&'static str> {
    vec![
        "image/jpeg",
        "image/png",
        "image/webp",
        "image/avif",
        "image/jxl",
        "image/heic",
        "image/heif",
    ]
}

/// Formats the engine can produce. Heic is absent on purpose: requests for
/// it are rerouted to jpeg.
pub fn supported_output_formats() -> Vec<Format> {
    vec![
        Format::Jpeg,
        Format::Png,
        Format::Webp,
        Format::Avif,
        Format::Jxl,
    ]
}
