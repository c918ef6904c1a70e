// src/codecs/jxl.rs
//
// Stateful JPEG XL encoder handle. libjxl encoder instances are expensive to
// set up, so one handle lives for the whole worker lifetime and is
// reconfigured per encode. The handle is owned by the worker's codec
// registry, mutated only by sequential encode calls, and released only when
// the worker itself is torn down.

use jpegxl_rs::encode::{encoder_builder, ColorEncoding, EncoderFrame, EncoderSpeed, JxlEncoder};

use crate::engine::policy::EncodeParams;
use crate::error::{classify_encode_failure, PixpressError, Result};
use crate::pixel::PixelBuffer;

pub struct JxlEncoderHandle {
    encoder: JxlEncoder<'static, 'static>,
}

impl JxlEncoderHandle {
    pub fn new() -> Result<Self> {
        let encoder = encoder_builder()
            .color_encoding(ColorEncoding::Srgb)
            .build()
            .map_err(|e| {
                PixpressError::encode_failed("jxl", format!("encoder init failed: {e}"))
            })?;
        Ok(Self { encoder })
    }

    /// Encode interleaved RGBA8 with the resolved parameters.
    ///
    /// Frame settings keep the palette and modular lossy heuristics at their
    /// defaults (off): enabling either switches the encoding mode
    /// non-deterministically and has produced unexpectedly large output.
    pub fn encode_rgba(&mut self, buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>> {
        self.encoder.has_alpha = true;
        self.encoder.lossless = params.lossless;
        // Lossless frames must keep the original color profile or the
        // roundtrip is no longer bit-exact.
        self.encoder.uses_original_profile = params.lossless;
        self.encoder.speed = speed_for_effort(params.effort);
        self.encoder.quality = distance_for_quality(params.quality);

        let frame = EncoderFrame::new(buffer.data()).num_channels(4);
        let result = self
            .encoder
            .encode_frame::<u8, u8>(&frame, buffer.width(), buffer.height())
            .map_err(|e| {
                classify_encode_failure("jxl", buffer.width(), buffer.height(), format!("{e}"))
            })?;

        Ok(result.data)
    }
}

/// libjxl effort scale (1 fastest .. 9 slowest) expressed through the
/// encoder speed enum.
fn speed_for_effort(effort: u32) -> EncoderSpeed {
    match effort {
        1 => EncoderSpeed::Lightning,
        2 => EncoderSpeed::Thunder,
        3 => EncoderSpeed::Falcon,
        4 => EncoderSpeed::Cheetah,
        5 => EncoderSpeed::Hare,
        6 => EncoderSpeed::Wombat,
        7 => EncoderSpeed::Squirrel,
        8 => EncoderSpeed::Kitten,
        _ => EncoderSpeed::Tortoise,
    }
}

/// libjxl's quality-to-butteraugli-distance mapping. 100 is mathematically
/// lossless (distance 0).
fn distance_for_quality(quality: u8) -> f32 {
    let q = quality.min(100) as f32;
    if q >= 100.0 {
        0.0
    } else if q >= 30.0 {
        0.1 + (100.0 - q) * 0.09
    } else {
        53.0 / 3000.0 * q * q - 23.0 / 20.0 * q + 25.0
    }
}
