// src/levels.rs
//
// Quality level resolution: the center of truth mapping the four abstract
// quality tiers onto concrete per-format encoder values. Numeric quality is
// NOT comparable across formats - each row below carries its own calibrated
// value because visual quality per numeric unit differs by codec.

use crate::formats::Format;

/// Abstract quality intent exposed to callers, decoupled from any single
/// format's numeric scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityLevel {
    Lossless,
    High,
    Balanced,
    Low,
}

impl QualityLevel {
    pub const ALL: [QualityLevel; 4] = [
        QualityLevel::Lossless,
        QualityLevel::High,
        QualityLevel::Balanced,
        QualityLevel::Low,
    ];
}

/// Concrete encoder configuration for one (format, level) cell.
///
/// PNG ignores numeric quality entirely: its encode side is always
/// mathematically lossless and `png_optimize` (2-4) only trades CPU time
/// for size. AVIF additionally carries an encoder speed knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelConfig {
    pub label: &'static str,
    pub description: &'static str,
    pub quality: Option<u8>,
    pub lossless: bool,
    pub supported: bool,
    pub png_optimize: Option<u8>,
    pub avif_speed: Option<u8>,
}

impl LevelConfig {
    const fn lossy(label: &'static str, description: &'static str, quality: u8) -> Self {
        Self {
            label,
            description,
            quality: Some(quality),
            lossless: false,
            supported: true,
            png_optimize: None,
            avif_speed: None,
        }
    }

    const fn unsupported(label: &'static str) -> Self {
        Self {
            label,
            description: "not available for this format",
            quality: None,
            lossless: false,
            supported: false,
            png_optimize: None,
            avif_speed: None,
        }
    }

    const fn with_avif_speed(mut self, speed: u8) -> Self {
        self.avif_speed = Some(speed);
        self
    }
}

const fn png_config(label: &'static str, description: &'static str, optimize: u8) -> LevelConfig {
    LevelConfig {
        label,
        description,
        quality: None,
        lossless: true,
        supported: true,
        png_optimize: Some(optimize),
        avif_speed: None,
    }
}

const fn lossless_config(label: &'static str, description: &'static str) -> LevelConfig {
    LevelConfig {
        label,
        description,
        quality: None,
        lossless: true,
        supported: true,
        png_optimize: None,
        avif_speed: None,
    }
}

/// Resolve a (format, level) pair to its encoder configuration.
///
/// Pure and total: the enumerations are closed and the table is exhaustive,
/// so this never fails. Cells with `supported == false` must not be
/// dispatched for encoding; callers apply [`effective_level`] first.
pub fn resolve(format: Format, level: QualityLevel) -> LevelConfig {
    use QualityLevel::*;
    match (format, level) {
        // JPEG has no lossless mode.
        (Format::Jpeg, Lossless) => LevelConfig::unsupported("Lossless"),
        (Format::Jpeg, High) => LevelConfig::lossy("High", "visually transparent JPEG", 90),
        (Format::Jpeg, Balanced) => LevelConfig::lossy("Balanced", "good quality, solid savings", 80),
        (Format::Jpeg, Low) => LevelConfig::lossy("Low", "small files, visible artifacts", 60),

        // PNG is always lossless; the level only varies the optimizer pass.
        (Format::Png, Lossless) => png_config("Lossless", "pixel-exact, quick optimizer pass", 2),
        (Format::Png, High) => png_config("High", "pixel-exact, quick optimizer pass", 2),
        (Format::Png, Balanced) => png_config("Balanced", "pixel-exact, deeper optimizer pass", 3),
        (Format::Png, Low) => png_config("Low", "pixel-exact, maximum optimizer effort", 4),

        (Format::Webp, Lossless) => lossless_config("Lossless", "pixel-exact WebP"),
        (Format::Webp, High) => LevelConfig::lossy("High", "near-transparent WebP", 85),
        (Format::Webp, Balanced) => LevelConfig::lossy("Balanced", "good quality, solid savings", 75),
        (Format::Webp, Low) => LevelConfig::lossy("Low", "small files, visible artifacts", 50),

        (Format::Avif, Lossless) => {
            lossless_config("Lossless", "pixel-exact AVIF").with_avif_speed(6)
        }
        (Format::Avif, High) => {
            LevelConfig::lossy("High", "near-transparent AVIF", 75).with_avif_speed(6)
        }
        (Format::Avif, Balanced) => {
            LevelConfig::lossy("Balanced", "good quality, strong savings", 65).with_avif_speed(7)
        }
        (Format::Avif, Low) => {
            LevelConfig::lossy("Low", "small files, visible artifacts", 45).with_avif_speed(8)
        }

        (Format::Jxl, Lossless) => lossless_config("Lossless", "pixel-exact JPEG XL"),
        (Format::Jxl, High) => LevelConfig::lossy("High", "near-transparent JPEG XL", 90),
        (Format::Jxl, Balanced) => LevelConfig::lossy("Balanced", "good quality, strong savings", 75),
        (Format::Jxl, Low) => LevelConfig::lossy("Low", "small files, visible artifacts", 55),

        // HEIC has no encoder at all; the dispatcher reroutes to JPEG.
        (Format::Heic, Lossless) => LevelConfig::unsupported("Lossless"),
        (Format::Heic, High) => LevelConfig::unsupported("High"),
        (Format::Heic, Balanced) => LevelConfig::unsupported("Balanced"),
        (Format::Heic, Low) => LevelConfig::unsupported("Low"),
    }
}

/// Documented fallback for unsupported cells: drop to High. Covers
/// JPEG+Lossless; HEIC is handled earlier by the encode substitution, so a
/// supported cell always exists for the fallback level.
pub fn effective_level(format: Format, level: QualityLevel) -> QualityLevel {
    if resolve(format, level).supported {
        level
    } else {
        QualityLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_cells_are_exactly_jpeg_lossless_and_heic() {
        for format in Format::ALL {
            for level in QualityLevel::ALL {
                let config = resolve(format, level);
                let expect_unsupported = format == Format::Heic
                    || (format == Format::Jpeg && level == QualityLevel::Lossless);
                assert_eq!(
                    config.supported, !expect_unsupported,
                    "unexpected supported flag for {format:?}/{level:?}"
                );
            }
        }
    }

    #[test]
    fn test_calibrated_values_per_format() {
        assert_eq!(resolve(Format::Jpeg, QualityLevel::Balanced).quality, Some(80));
        assert_eq!(resolve(Format::Avif, QualityLevel::Balanced).quality, Some(65));
        assert_eq!(resolve(Format::Avif, QualityLevel::High).quality, Some(75));
        assert!(!resolve(Format::Avif, QualityLevel::High).lossless);
    }

    #[test]
    fn test_png_ignores_numeric_quality() {
        for level in QualityLevel::ALL {
            let config = resolve(Format::Png, level);
            assert!(config.lossless, "PNG must stay lossless at {level:?}");
            assert_eq!(config.quality, None);
            let optimize = config.png_optimize.unwrap();
            assert!((2..=4).contains(&optimize));
        }
        assert_eq!(
            resolve(Format::Png, QualityLevel::Lossless).png_optimize,
            Some(2)
        );
    }

    #[test]
    fn test_avif_rows_carry_speed() {
        for level in QualityLevel::ALL {
            assert!(resolve(Format::Avif, level).avif_speed.is_some());
        }
    }

    #[test]
    fn test_effective_level_fallback() {
        // unsupported lossless falls back to High
        assert_eq!(
            effective_level(Format::Jpeg, QualityLevel::Lossless),
            QualityLevel::High
        );
        // supported cells resolve to themselves
        assert_eq!(
            effective_level(Format::Webp, QualityLevel::Lossless),
            QualityLevel::Lossless
        );
        assert_eq!(
            effective_level(Format::Jpeg, QualityLevel::Low),
            QualityLevel::Low
        );
    }
}
