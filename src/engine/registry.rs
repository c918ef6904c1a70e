// src/engine/registry.rs
//
// Per-format codec capability registry. Each slot is instantiated on first
// use and cached for the remainder of the owning worker's lifetime, which
// amortizes setup cost across a batch of same-format jobs. The registry is
// owned by exactly one worker; a respawned worker starts with empty slots.

use tracing::debug;

use crate::codecs::jxl::JxlEncoderHandle;
use crate::engine::decoder;
use crate::engine::encoder;
use crate::engine::policy::EncodeParams;
use crate::error::{PixpressError, Result};
use crate::formats::Format;
use crate::pixel::PixelBuffer;

/// One decode/encode capability pair. Codecs are owned by exactly one
/// worker thread and never cross threads, so handles with FFI state need
/// not be Send.
pub(crate) trait ImageCodec {
    fn decode(&mut self, bytes: &[u8]) -> Result<PixelBuffer>;
    fn encode(&mut self, buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>>;
}

struct JpegCodec;

impl ImageCodec for JpegCodec {
    fn decode(&mut self, bytes: &[u8]) -> Result<PixelBuffer> {
        decoder::decode_jpeg_mozjpeg(bytes)
    }

    fn encode(&mut self, buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>> {
        encoder::encode_jpeg(buffer, params.quality)
    }
}

struct PngCodec;

impl ImageCodec for PngCodec {
    fn decode(&mut self, bytes: &[u8]) -> Result<PixelBuffer> {
        decoder::decode_png_zune(bytes)
    }

    fn encode(&mut self, buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>> {
        encoder::encode_png(buffer, params.png_optimize)
    }
}

struct WebpCodec;

impl ImageCodec for WebpCodec {
    fn decode(&mut self, bytes: &[u8]) -> Result<PixelBuffer> {
        decoder::decode_webp_libwebp(bytes)
    }

    fn encode(&mut self, buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>> {
        encoder::encode_webp(buffer, params)
    }
}

struct AvifCodec;

impl ImageCodec for AvifCodec {
    fn decode(&mut self, bytes: &[u8]) -> Result<PixelBuffer> {
        decoder::decode_avif_libavif(bytes)
    }

    fn encode(&mut self, buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>> {
        encoder::encode_avif(buffer, params)
    }
}

/// JPEG XL is the one stateful codec: the encoder handle is created on first
/// encode and lives until the worker is torn down. Never released explicitly.
struct JxlCodec {
    encoder: Option<JxlEncoderHandle>,
}

impl ImageCodec for JxlCodec {
    fn decode(&mut self, bytes: &[u8]) -> Result<PixelBuffer> {
        decoder::decode_jxl_libjxl(bytes)
    }

    fn encode(&mut self, buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>> {
        if self.encoder.is_none() {
            debug!("initializing jxl encoder singleton");
            self.encoder = Some(JxlEncoderHandle::new()?);
        }
        let Some(handle) = self.encoder.as_mut() else {
            return Err(PixpressError::encode_failed("jxl", "encoder unavailable"));
        };
        encoder::encode_jxl(handle, buffer, params)
    }
}

struct HeicCodec;

impl ImageCodec for HeicCodec {
    fn decode(&mut self, bytes: &[u8]) -> Result<PixelBuffer> {
        decoder::decode_heic_libheif(bytes)
    }

    fn encode(&mut self, _buffer: &PixelBuffer, _params: &EncodeParams) -> Result<Vec<u8>> {
        // The dispatcher reroutes heic encodes to jpeg before reaching here.
        Err(PixpressError::encode_failed(
            "heic",
            "no heic encoder; dispatch must reroute to jpeg",
        ))
    }
}

fn instantiate_codec(format: Format) -> Box<dyn ImageCodec> {
    match format {
        Format::Jpeg => Box::new(JpegCodec),
        Format::Png => Box::new(PngCodec),
        Format::Webp => Box::new(WebpCodec),
        Format::Avif => Box::new(AvifCodec),
        Format::Jxl => Box::new(JxlCodec { encoder: None }),
        Format::Heic => Box::new(HeicCodec),
    }
}

/// Nearest of {60, 80, 90}; ties resolve downward.
fn clamp_heic_quality(quality: u8) -> u8 {
    const STEPS: [u8; 3] = [60, 80, 90];
    let mut best = STEPS[0];
    let mut best_diff = quality.abs_diff(best);
    for step in STEPS {
        let diff = quality.abs_diff(step);
        if diff < best_diff {
            best = step;
            best_diff = diff;
        }
    }
    best
}

pub(crate) struct CodecRegistry {
    slots: [Option<Box<dyn ImageCodec>>; Format::COUNT],
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    fn codec_slot(&mut self, format: Format) -> &mut Box<dyn ImageCodec> {
        let slot = &mut self.slots[format.index()];
        if slot.is_none() {
            debug!(%format, "instantiating codec");
            *slot = Some(instantiate_codec(format));
        }
        slot.as_mut().expect("codec slot initialized above")
    }

    /// Decode bytes claimed to be `mime`. Mimes outside the dispatch table
    /// go through the generic raster fallback before failing outright.
    pub fn decode(&mut self, bytes: &[u8], mime: &str) -> Result<PixelBuffer> {
        match Format::from_mime(mime) {
            Some(format) => self.codec_slot(format).decode(bytes),
            None => {
                debug!(mime, "mime not in dispatch table, trying raster fallback");
                decoder::decode_fallback_raster(bytes, mime)
            }
        }
    }

    /// Encode a pixel buffer as `format`. Heic requests are silently
    /// rerouted to the jpeg encoder with quality clamped to the nearest of
    /// {60, 80, 90}. Returns the bytes and the format actually produced.
    pub fn encode(
        &mut self,
        buffer: &PixelBuffer,
        format: Format,
        params: &EncodeParams,
    ) -> Result<(Vec<u8>, Format)> {
        let (format, params) = if format == Format::Heic {
            let mut substituted = *params;
            substituted.quality = clamp_heic_quality(substituted.quality);
            substituted.lossless = false;
            debug!(quality = substituted.quality, "rerouting heic encode to jpeg");
            (Format::Jpeg, substituted)
        } else {
            (format, *params)
        };

        let bytes = self.codec_slot(format).encode(buffer, &params)?;
        Ok((bytes, format))
    }

    #[cfg(test)]
    fn initialized_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
