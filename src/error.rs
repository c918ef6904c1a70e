// src/error.rs
//
// Unified error handling for pixpress
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - InputError: Unrecognized or invalid input, recoverable
// - CodecError: Decode/encode failures confined to one task
// - ResourceLimit: Memory exhaustion inside a codec
// - EngineFailure: The worker context itself failed

use std::borrow::Cow;
use thiserror::Error;

use crate::formats::Format;
use crate::levels::QualityLevel;

/// Error category for callers that classify failures before rendering them.
///
/// - InputError: Invalid input, recoverable by user
/// - CodecError: Decode/encode failures confined to one task
/// - ResourceLimit: Memory exhaustion inside a codec
/// - EngineFailure: The worker context itself failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    InputError,
    /// Decode/encode failures confined to one task
    CodecError,
    /// Memory exhaustion inside a codec
    ResourceLimit,
    /// The worker context itself failed
    EngineFailure,
}

/// pixpress error types
///
/// All errors are type-safe and provide clear, actionable messages.
/// No numeric error codes - just clear error variants.
#[derive(Debug, Clone, Error)]
pub enum PixpressError {
    // Input Errors
    #[error("Unsupported input type: {mime}")]
    UnsupportedInput { mime: Cow<'static, str> },

    #[error("A request with id '{id}' is already outstanding")]
    DuplicateRequestId { id: String },

    // Decode Errors
    #[error("Failed to decode {format}: {message}")]
    DecodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    /// A codec crashed mid-encode. Carries the requested dimensions and the
    /// full parameter set that was in effect, for post-mortem triage.
    #[error("{format} encoder crashed ({width}x{height}, {params}): {message}")]
    EncodeCrashed {
        format: Cow<'static, str>,
        width: u32,
        height: u32,
        params: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Insufficient memory for this image size ({width}x{height} as {format})")]
    EncodeOutOfMemory {
        format: Cow<'static, str>,
        width: u32,
        height: u32,
    },

    /// A codec call panicked and was caught at the task boundary.
    #[error("Codec crashed during {stage}: {message}")]
    CodecPanic {
        stage: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Dispatch guard: supported=false level configs must never reach a codec.
    #[error("Quality level {level:?} is not supported for {format}")]
    UnsupportedLevel { format: Format, level: QualityLevel },

    // Engine Errors
    #[error("image engine crashed")]
    EngineCrashed,

    #[error("engine terminated")]
    EngineTerminated,
}

// Constructor Helpers
impl PixpressError {
    pub fn unsupported_input(mime: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedInput { mime: mime.into() }
    }

    pub fn duplicate_request_id(id: impl Into<String>) -> Self {
        Self::DuplicateRequestId { id: id.into() }
    }

    pub fn decode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::DecodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn encode_crashed(
        format: impl Into<Cow<'static, str>>,
        width: u32,
        height: u32,
        params: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeCrashed {
            format: format.into(),
            width,
            height,
            params: params.into(),
            message: message.into(),
        }
    }

    pub fn encode_out_of_memory(
        format: impl Into<Cow<'static, str>>,
        width: u32,
        height: u32,
    ) -> Self {
        Self::EncodeOutOfMemory {
            format: format.into(),
            width,
            height,
        }
    }

    pub fn codec_panic(
        stage: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::CodecPanic {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_level(format: Format, level: QualityLevel) -> Self {
        Self::UnsupportedLevel { format, level }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// This method is consistent with category():
    /// - InputError errors are always recoverable
    /// - ResourceLimit errors are recoverable (user can submit a smaller image)
    /// - CodecError and EngineFailure errors are not recoverable
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::InputError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::EngineFailure => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedInput { .. } | Self::DuplicateRequestId { .. } => {
                ErrorCategory::InputError
            }

            Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::EncodeCrashed { .. }
            | Self::CodecPanic { .. } => ErrorCategory::CodecError,

            Self::EncodeOutOfMemory { .. } => ErrorCategory::ResourceLimit,

            Self::UnsupportedLevel { .. }
            | Self::EngineCrashed
            | Self::EngineTerminated => ErrorCategory::EngineFailure,
        }
    }
}

/// Degraded-fallback classifier for codecs that report failures as text only.
/// Structured error kinds from the codec boundary (e.g. libavif's
/// AVIF_RESULT_OUT_OF_MEMORY) take precedence over this scan.
pub(crate) fn message_indicates_oom(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("out of memory")
        || lower.contains("out_of_memory")
        || lower.contains("oom")
        || lower.contains("memory allocation")
        || (lower.contains("alloc") && lower.contains("fail"))
        || lower.contains("insufficient memory")
}

/// Classify an encode failure message into the structured taxonomy.
/// Used when the codec boundary yields only a string.
pub(crate) fn classify_encode_failure(
    format: &'static str,
    width: u32,
    height: u32,
    message: String,
) -> PixpressError {
    if message_indicates_oom(&message) {
        PixpressError::encode_out_of_memory(format, width, height)
    } else {
        PixpressError::encode_failed(format, message)
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, PixpressError>;
