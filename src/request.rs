// src/request.rs
//
// Submission-side types: caller-generated request ids, the compression
// request itself, and the settings value consumed at submission time.

use std::sync::Arc;

use crate::formats::Format;
use crate::levels::QualityLevel;

/// Opaque caller-generated token correlating a request with its result.
/// Must be unique among concurrently outstanding requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Compressor configuration supplied by the settings collaborator. Consumed
/// at submission time; the engine does not persist it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressorSettings {
    pub quality_level: QualityLevel,
    /// None means "keep the input's own format".
    pub target_format: Option<Format>,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            quality_level: QualityLevel::Balanced,
            target_format: None,
        }
    }
}

/// One unit of work for the engine.
///
/// Input bytes are Arc-wrapped so retries can reuse them without copying.
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub id: RequestId,
    pub input: Arc<Vec<u8>>,
    pub input_mime: String,
    pub target_format: Option<Format>,
    pub quality_level: QualityLevel,
}

impl CompressionRequest {
    pub fn new(
        id: impl Into<RequestId>,
        input: impl Into<Arc<Vec<u8>>>,
        input_mime: impl Into<String>,
        settings: &CompressorSettings,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            input_mime: input_mime.into(),
            target_format: settings.target_format,
            quality_level: settings.quality_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = CompressorSettings::default();
        assert_eq!(settings.quality_level, QualityLevel::Balanced);
        assert_eq!(settings.target_format, None);
    }

    #[test]
    fn test_request_takes_settings_snapshot() {
        let settings = CompressorSettings {
            quality_level: QualityLevel::High,
            target_format: Some(Format::Webp),
        };
        let request =
            CompressionRequest::new("job-1", vec![1, 2, 3], "image/png", &settings);
        assert_eq!(request.id.as_str(), "job-1");
        assert_eq!(request.quality_level, QualityLevel::High);
        assert_eq!(request.target_format, Some(Format::Webp));
        assert_eq!(request.input.as_slice(), &[1, 2, 3]);
    }
}
