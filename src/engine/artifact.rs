// src/engine/artifact.rs
//
// Result assembly: wraps encoded bytes into a typed artifact with
// size/ratio/timing metadata. Purely computational, no side effects.

use std::time::Duration;

use crate::formats::{suggested_filename, Format};
use crate::request::RequestId;

/// A finished compression product, ready for the save/download layer.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub format: Format,
    pub mime: &'static str,
    pub size_bytes: u64,
    /// Percent saved relative to the input. Positive means the output is
    /// smaller, negative means it grew.
    pub ratio_percent: i32,
    pub elapsed_ms: f64,
}

impl Artifact {
    /// Filename offered to the save/download collaborator.
    pub fn suggested_filename(&self, original_name: &str) -> String {
        suggested_filename(original_name, self.format)
    }
}

/// Outcome of one task. Exactly one of these is produced per request id.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success(Artifact),
    Failure { message: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }
}

/// The delivered result, correlated to its request.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub id: RequestId,
    pub outcome: TaskOutcome,
}

/// Percent saved, rounded; defined as 0 when the original size is 0.
pub fn compression_ratio_percent(original: u64, compressed: u64) -> i32 {
    if original == 0 {
        return 0;
    }
    let saved = (original as f64 - compressed as f64) / original as f64 * 100.0;
    saved.round() as i32
}

/// Assemble the typed artifact from an encode's raw output.
pub fn assemble(
    original_size: usize,
    encoded: Vec<u8>,
    format: Format,
    elapsed: Duration,
) -> Artifact {
    let size_bytes = encoded.len() as u64;
    Artifact {
        ratio_percent: compression_ratio_percent(original_size as u64, size_bytes),
        mime: format.mime(),
        size_bytes,
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        bytes: encoded,
        format,
    }
}
