// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune-png), WebP, AVIF, JPEG XL,
// HEIC, plus the generic raster fallback for anything else. Every decoder
// normalizes into the RGBA8 PixelBuffer intermediate.

use image::ImageFormat;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::codecs::avif_safe::SafeAvifDecoder;
use crate::engine::common::run_with_panic_policy;
use crate::error::{PixpressError, Result};
use crate::formats::Format;
use crate::pixel::PixelBuffer;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
/// This is SIGNIFICANTLY faster than image crate's pure Rust decoder
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> Result<PixelBuffer> {
    run_with_panic_policy("decode:jpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(PixpressError::decode_failed(
                "jpeg",
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = mozjpeg::Decompress::new_mem(data).map_err(|e| {
            PixpressError::decode_failed("jpeg", format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            PixpressError::decode_failed("jpeg", format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width() as u32;
        let height = decompress.height() as u32;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            PixpressError::decode_failed("jpeg", format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        let flat: Vec<u8> = pixels.into_iter().flatten().collect();
        PixelBuffer::from_rgb8(width, height, &flat)
    })
}

/// Decode PNG using zune-png. 16bit inputs are stripped down to 8bit.
pub fn decode_png_zune(data: &[u8]) -> Result<PixelBuffer> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(data, options);
        let pixels = decoder
            .decode()
            .map_err(|e| PixpressError::decode_failed("png", format!("decode failed: {e}")))?;

        let info = decoder
            .get_info()
            .ok_or_else(|| PixpressError::decode_failed("png", "missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(PixpressError::decode_failed(
                    "png",
                    "unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .get_colorspace()
            .ok_or_else(|| PixpressError::decode_failed("png", "missing colorspace"))?;

        match colorspace {
            ColorSpace::RGB => PixelBuffer::from_rgb8(width, height, &buf),
            ColorSpace::RGBA => PixelBuffer::from_rgba8(width, height, buf),
            ColorSpace::Luma => {
                let mut rgba = Vec::with_capacity(buf.len() * 4);
                for l in buf {
                    rgba.extend_from_slice(&[l, l, l, 0xFF]);
                }
                PixelBuffer::from_rgba8(width, height, rgba)
            }
            ColorSpace::LumaA => {
                let mut rgba = Vec::with_capacity(buf.len() * 2);
                for px in buf.chunks_exact(2) {
                    rgba.extend_from_slice(&[px[0], px[0], px[0], px[1]]);
                }
                PixelBuffer::from_rgba8(width, height, rgba)
            }
            other => Err(PixpressError::decode_failed(
                "png",
                format!("unsupported colorspace {other:?}"),
            )),
        }
    })
}

/// Decode WebP using libwebp (via webp crate). Falls back to the raster
/// decoder for animated WebP.
pub fn decode_webp_libwebp(data: &[u8]) -> Result<PixelBuffer> {
    run_with_panic_policy("decode:webp", || {
        // Parse header first to avoid allocating huge buffers on malformed files
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            PixpressError::decode_failed("webp", "failed to read bitstream features")
        })?;

        if features.has_animation() {
            // libwebp simple decoder does not support animation; first frame via image crate
            let img = image::load_from_memory(data).map_err(|e| {
                PixpressError::decode_failed("webp", format!("animated decode failed: {e}"))
            })?;
            return Ok(PixelBuffer::from_rgba_image(img.to_rgba8()));
        }

        let decoder = WebPDecoder::new(data);
        let decoded = decoder
            .decode()
            .ok_or_else(|| PixpressError::decode_failed("webp", "decode failed"))?;

        Ok(PixelBuffer::from_rgba_image(decoded.to_image().to_rgba8()))
    })
}

/// Decode AVIF via libavif. Fails loudly when the decoder accepts the bytes
/// but yields no image data.
pub fn decode_avif_libavif(data: &[u8]) -> Result<PixelBuffer> {
    run_with_panic_policy("decode:avif", || {
        let mut decoder = SafeAvifDecoder::new()
            .map_err(|e| PixpressError::decode_failed("avif", e.to_string()))?;
        let (width, height, pixels) = decoder
            .decode_rgba(data)
            .map_err(|e| PixpressError::decode_failed("avif", e.to_string()))?;
        PixelBuffer::from_rgba8(width, height, pixels)
    })
}

/// Decode JPEG XL via libjxl.
pub fn decode_jxl_libjxl(data: &[u8]) -> Result<PixelBuffer> {
    run_with_panic_policy("decode:jxl", || {
        use jpegxl_rs::decode::{decoder_builder, PixelFormat};
        use jpegxl_rs::Endianness;

        let decoder = decoder_builder()
            .pixel_format(PixelFormat {
                num_channels: 4,
                endianness: Endianness::Native,
                align: 0,
            })
            .build()
            .map_err(|e| {
                PixpressError::decode_failed("jxl", format!("decoder init failed: {e}"))
            })?;

        let (metadata, pixels): (_, Vec<u8>) = decoder
            .decode_with::<u8>(data)
            .map_err(|e| PixpressError::decode_failed("jxl", format!("decode failed: {e}")))?;

        PixelBuffer::from_rgba8(metadata.width, metadata.height, pixels)
    })
}

/// Decode HEIC via libheif, rendering the first image in the container.
pub fn decode_heic_libheif(data: &[u8]) -> Result<PixelBuffer> {
    run_with_panic_policy("decode:heic", || {
        use libheif_rs::{ColorSpace as HeifColorSpace, HeifContext, LibHeif, RgbChroma};

        let lib_heif = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(data)
            .map_err(|e| PixpressError::decode_failed("heic", format!("parse failed: {e}")))?;
        let handle = ctx.primary_image_handle().map_err(|e| {
            PixpressError::decode_failed("heic", format!("no primary image: {e}"))
        })?;
        let image = lib_heif
            .decode(&handle, HeifColorSpace::Rgb(RgbChroma::Rgba), None)
            .map_err(|e| PixpressError::decode_failed("heic", format!("decode failed: {e}")))?;

        let planes = image.planes();
        let interleaved = planes.interleaved.ok_or_else(|| {
            PixpressError::decode_failed("heic", "decoder produced no interleaved pixel data")
        })?;

        let width = interleaved.width;
        let height = interleaved.height;
        let row_len = width as usize * 4;

        // Rows may be padded to the plane stride; repack tightly.
        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in interleaved.data.chunks(interleaved.stride).take(height as usize) {
            if row.len() < row_len {
                return Err(PixpressError::decode_failed(
                    "heic",
                    "interleaved plane shorter than expected",
                ));
            }
            pixels.extend_from_slice(&row[..row_len]);
        }

        PixelBuffer::from_rgba8(width, height, pixels)
    })
}

/// Generic bitmap-surface fallback: let the image crate sniff the container
/// and rasterize it. Inputs that cannot be rendered this way are reported as
/// unsupported, carrying the mime the caller claimed.
pub fn decode_fallback_raster(data: &[u8], mime: &str) -> Result<PixelBuffer> {
    let mime = mime.trim().to_ascii_lowercase();
    run_with_panic_policy("decode:fallback", move || {
        let img = image::load_from_memory(data)
            .map_err(|_| PixpressError::unsupported_input(mime.clone()))?;
        Ok(PixelBuffer::from_rgba_image(img.to_rgba8()))
    })
}

/// Detect the container format from magic bytes. Returns None if unknown.
pub fn sniff_format(bytes: &[u8]) -> Option<Format> {
    // JXL codestream and container signatures; the image crate does not
    // recognize either.
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0x0A {
        return Some(Format::Jxl);
    }
    if bytes.len() >= 12
        && bytes[..12]
            == [0x00, 0x00, 0x00, 0x0C, 0x4A, 0x58, 0x4C, 0x20, 0x0D, 0x0A, 0x87, 0x0A]
    {
        return Some(Format::Jxl);
    }
    // ISOBMFF brands for HEIC
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        let brand = &bytes[8..12];
        if matches!(brand, b"heic" | b"heix" | b"hevc" | b"heim" | b"heis" | b"mif1") {
            return Some(Format::Heic);
        }
    }
    image::guess_format(bytes)
        .ok()
        .and_then(Format::from_image_format)
}

/// Expose the raw image-crate detection for callers that want the full set.
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}
