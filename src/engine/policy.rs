// src/engine/policy.rs
//
// Adaptive encode policy: derives a bounded encoder effort from image size
// and reconciles lossless intent with the numeric quality parameter.
//
// Effort tiers above ~5 are disproportionately expensive and have crashed
// whole worker processes on large inputs; the step function below trades
// maximum compression ratio for encode reliability as resolution grows.

use crate::formats::Format;
use crate::levels::LevelConfig;

/// Pixel-count boundaries for the effort step function.
const SMALL_IMAGE_PIXELS: u64 = 250_000;
const MEDIUM_IMAGE_PIXELS: u64 = 500_000;
const LARGE_IMAGE_PIXELS: u64 = 1_500_000;

/// Effort tier from pixel count, independent of requested quality.
/// Monotonic non-increasing: a larger image never gets a higher tier.
pub fn effort_for_pixel_count(pixels: u64) -> u32 {
    if pixels < SMALL_IMAGE_PIXELS {
        5
    } else if pixels < MEDIUM_IMAGE_PIXELS {
        3
    } else if pixels < LARGE_IMAGE_PIXELS {
        2
    } else {
        1
    }
}

/// Fully resolved encoder parameters for one encode call.
///
/// `effort` applies to effort-aware encoders (JPEG XL). `png_optimize` and
/// `avif_speed` are only read by their respective codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: u8,
    pub lossless: bool,
    pub effort: u32,
    pub png_optimize: u8,
    pub avif_speed: u8,
}

impl EncodeParams {
    /// Start from a resolved level config. Effort is filled in by
    /// [`apply_adaptive_policy`] once the decoded size is known.
    pub fn from_config(config: &LevelConfig) -> Self {
        Self {
            quality: config.quality.unwrap_or(100),
            lossless: config.lossless,
            effort: 5,
            png_optimize: config.png_optimize.unwrap_or(2),
            avif_speed: config.avif_speed.unwrap_or(7),
        }
    }

    /// Compact rendering for crash diagnostics.
    pub fn describe(&self, format: Format) -> String {
        format!(
            "format={} quality={} lossless={} effort={} png_optimize={} avif_speed={}",
            format, self.quality, self.lossless, self.effort, self.png_optimize, self.avif_speed
        )
    }
}

/// Apply the size-derived effort tier and reconcile lossless intent.
///
/// The lossless override runs after parameter resolution on purpose: a stale
/// numeric value left in place would silently degrade a lossless request
/// into a lossy one. Effort selection keeps its normal pixel thresholds
/// under lossless mode; quality=100 combined with a low effort tier is the
/// intended pairing for large lossless inputs.
pub fn apply_adaptive_policy(params: &mut EncodeParams, pixels: u64) {
    params.effort = effort_for_pixel_count(pixels);
    if params.lossless {
        params.quality = 100;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{resolve, QualityLevel};

    #[test]
    fn test_effort_tier_boundaries() {
        assert_eq!(effort_for_pixel_count(0), 5);
        assert_eq!(effort_for_pixel_count(249_999), 5);
        assert_eq!(effort_for_pixel_count(250_000), 3);
        assert_eq!(effort_for_pixel_count(499_999), 3);
        assert_eq!(effort_for_pixel_count(500_000), 2);
        assert_eq!(effort_for_pixel_count(1_499_999), 2);
        assert_eq!(effort_for_pixel_count(1_500_000), 1);
        assert_eq!(effort_for_pixel_count(u64::MAX), 1);
    }

    #[test]
    fn test_lossless_forces_max_quality() {
        let config = resolve(Format::Webp, QualityLevel::Lossless);
        let mut params = EncodeParams::from_config(&config);
        // simulate a stale numeric value surviving resolution
        params.quality = 75;
        apply_adaptive_policy(&mut params, 10_000);
        assert_eq!(params.quality, 100);
        assert!(params.lossless);
    }

    #[test]
    fn test_lossless_keeps_size_derived_effort() {
        let config = resolve(Format::Jxl, QualityLevel::Lossless);
        let mut params = EncodeParams::from_config(&config);
        apply_adaptive_policy(&mut params, 3_000_000);
        // quality=100 paired with the lowest tier is intentional
        assert_eq!(params.quality, 100);
        assert_eq!(params.effort, 1);
    }

    #[test]
    fn test_lossy_quality_untouched_by_policy() {
        let config = resolve(Format::Avif, QualityLevel::High);
        let mut params = EncodeParams::from_config(&config);
        apply_adaptive_policy(&mut params, 2_000 * 1_500);
        assert_eq!(params.quality, 75);
        assert_eq!(params.effort, 1);
        assert!(!params.lossless);
    }

    #[test]
    fn test_params_describe_carries_full_set() {
        let config = resolve(Format::Jxl, QualityLevel::Balanced);
        let mut params = EncodeParams::from_config(&config);
        apply_adaptive_policy(&mut params, 100);
        let text = params.describe(Format::Jxl);
        assert!(text.contains("quality=75"));
        assert!(text.contains("effort=5"));
        assert!(text.contains("format=jxl"));
    }
}
