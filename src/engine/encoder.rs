// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng pass), WebP, AVIF,
// JPEG XL. All encoders consume the RGBA8 PixelBuffer intermediate.

use libavif_sys::*;
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::cmp;
use std::io::Cursor;

use crate::codecs::avif_safe::{
    create_rgb_image, AvifCallError, SafeAvifEncoder, SafeAvifImage, SafeAvifRwData,
};
use crate::codecs::jxl::JxlEncoderHandle;
use crate::engine::common::run_with_panic_policy;
use crate::engine::policy::EncodeParams;
use crate::error::{classify_encode_failure, PixpressError, Result};
use crate::formats::Format;
use crate::pixel::PixelBuffer;

/// Encode to JPEG using mozjpeg with Web-optimized settings.
pub fn encode_jpeg(buffer: &PixelBuffer, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let quality = quality.min(100);
        let (w, h) = (buffer.width(), buffer.height());

        if w == 0 || h == 0 {
            return Err(PixpressError::encode_failed(
                "jpeg",
                "invalid image dimensions: width or height is zero",
            ));
        }

        let pixels = buffer.to_rgb8();

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);

        let quality_f32 = quality as f32;
        comp.set_quality(quality_f32);

        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

        let smoothing = if quality_f32 >= 90.0 {
            0
        } else if quality_f32 >= 70.0 {
            5
        } else if quality_f32 >= 60.0 {
            10
        } else {
            18
        };
        comp.set_smoothing_factor(smoothing);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let mut writer = comp.start_compress(&mut output).map_err(|e| {
            classify_encode_failure(
                "jpeg",
                w,
                h,
                format!("mozjpeg: failed to start compress: {e:?}"),
            )
        })?;

        let stride = w as usize * 3;
        for row in pixels.chunks(stride) {
            writer.write_scanlines(row).map_err(|e| {
                classify_encode_failure(
                    "jpeg",
                    w,
                    h,
                    format!("mozjpeg: failed to write scanlines: {e:?}"),
                )
            })?;
        }

        writer.finish().map_err(|e| {
            classify_encode_failure("jpeg", w, h, format!("mozjpeg: failed to finish: {e:?}"))
        })?;

        Ok(output)
    })
}

/// Encode to PNG: reencode through the image crate, then run the lossless
/// oxipng optimizer pass at the resolved level. Two-stage on purpose - the
/// optimizer only shrinks, never changes pixels.
pub fn encode_png(buffer: &PixelBuffer, optimize_level: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        buffer
            .to_rgba_image()
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| PixpressError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let options = oxipng::Options::from_preset(optimize_level);
        let optimized = oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            PixpressError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })?;

        Ok(optimized)
    })
}

// WebP tuning derived from the numeric quality. Method 4 and a single pass
// are the speed/quality sweet spot across the whole range.
fn webp_sns_strength(quality: f32) -> i32 {
    if quality >= 85.0 {
        50
    } else if quality >= 70.0 {
        70
    } else {
        80
    }
}

fn webp_filter_strength(quality: f32) -> i32 {
    if quality >= 80.0 {
        20
    } else if quality >= 60.0 {
        30
    } else {
        40
    }
}

fn webp_filter_sharpness(quality: f32) -> i32 {
    if quality >= 85.0 {
        2
    } else {
        0
    }
}

/// Encode to WebP. Quality and the lossless flag are mutually exclusive
/// inputs: in lossless mode libwebp reinterprets quality as effort and the
/// exact flag keeps RGB values under transparent pixels.
pub fn encode_webp(buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let encoder = webp::Encoder::from_rgba(buffer.data(), buffer.width(), buffer.height());

        let mut config = webp::WebPConfig::new()
            .map_err(|_| PixpressError::encode_failed("webp", "failed to create WebPConfig"))?;

        let quality = params.quality.min(100) as f32;
        config.quality = quality;
        if params.lossless {
            config.lossless = 1;
            config.exact = 1;
        } else {
            config.lossless = 0;
            config.method = 4;
            config.pass = 1;
            config.preprocessing = 0;
            config.sns_strength = webp_sns_strength(quality);
            config.autofilter = 1;
            config.filter_strength = webp_filter_strength(quality);
            config.filter_sharpness = webp_filter_sharpness(quality);
        }

        let mem = encoder.encode_advanced(&config).map_err(|e| {
            classify_encode_failure(
                "webp",
                buffer.width(),
                buffer.height(),
                format!("WebP encode failed: {e:?}"),
            )
        })?;

        Ok(mem.to_vec())
    })
}

fn map_avif_error(err: AvifCallError, buffer: &PixelBuffer) -> PixpressError {
    if err.is_out_of_memory() {
        PixpressError::encode_out_of_memory("avif", buffer.width(), buffer.height())
    } else {
        PixpressError::encode_failed("avif", err.to_string())
    }
}

/// Encode to AVIF via libavif.
///
/// Lossless mode requires identity matrix coefficients and 4:4:4 sampling;
/// anything else loses data in the RGB->YUV conversion before the codec
/// even runs.
pub fn encode_avif(buffer: &PixelBuffer, params: &EncodeParams) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:avif", || {
        let (width, height) = (buffer.width(), buffer.height());
        let quality = params.quality.min(100);
        let has_alpha = buffer.has_transparency();

        let pixel_format = if params.lossless {
            AVIF_PIXEL_FORMAT_YUV444
        } else {
            AVIF_PIXEL_FORMAT_YUV420
        };

        let mut avif_image = SafeAvifImage::new(width, height, 8, pixel_format)
            .map_err(|e| map_avif_error(e, buffer))?;

        if params.lossless {
            avif_image.set_color_properties(
                AVIF_COLOR_PRIMARIES_BT709 as u16,
                AVIF_TRANSFER_CHARACTERISTICS_SRGB as u16,
                AVIF_MATRIX_COEFFICIENTS_IDENTITY as u16,
                AVIF_RANGE_FULL,
            );
        } else {
            avif_image.set_color_properties(
                AVIF_COLOR_PRIMARIES_BT709 as u16,
                AVIF_TRANSFER_CHARACTERISTICS_SRGB as u16,
                AVIF_MATRIX_COEFFICIENTS_BT709 as u16,
                AVIF_RANGE_FULL,
            );
        }

        let pixels = buffer.data();
        let rgb = create_rgb_image(&mut avif_image, pixels.as_ptr(), width, height)
            .map_err(|e| map_avif_error(e, buffer))?;

        avif_image
            .allocate_planes(AVIF_PLANES_YUV)
            .map_err(|e| map_avif_error(e, buffer))?;

        avif_image
            .rgb_to_yuv(&rgb)
            .map_err(|e| map_avif_error(e, buffer))?;

        if has_alpha {
            avif_image
                .allocate_planes(AVIF_PLANES_A)
                .map_err(|e| map_avif_error(e, buffer))?;

            unsafe {
                let alpha_plane = avif_image
                    .alpha_plane_mut()
                    .map_err(|e| map_avif_error(e, buffer))?;
                let alpha_row_bytes = avif_image.alpha_row_bytes();
                for y in 0..height as usize {
                    for x in 0..width as usize {
                        let src_idx = (y * width as usize + x) * 4 + 3;
                        let dst_idx = y * alpha_row_bytes + x;
                        *alpha_plane.as_ptr().add(dst_idx) = pixels[src_idx];
                    }
                }
            }
        }

        let mut encoder = SafeAvifEncoder::new().map_err(|e| map_avif_error(e, buffer))?;

        let cpu_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        let encoder_threads = cmp::max(2, cmp::min(8, cpu_threads)) as i32;

        encoder.configure(
            quality,
            quality,
            params.avif_speed.min(10) as i32,
            encoder_threads,
        );

        let mut output = SafeAvifRwData::new();

        encoder
            .add_image(&mut avif_image, 1, AVIF_ADD_IMAGE_FLAG_SINGLE)
            .map_err(|e| map_avif_error(e, buffer))?;

        encoder
            .finish(&mut output)
            .map_err(|e| map_avif_error(e, buffer))?;

        Ok(output.to_vec())
    })
}

/// Encode to JPEG XL through the worker's long-lived encoder handle.
///
/// A caught crash inside libjxl is rephrased into a diagnostic error
/// carrying the requested dimensions and the full parameter set.
pub fn encode_jxl(
    handle: &mut JxlEncoderHandle,
    buffer: &PixelBuffer,
    params: &EncodeParams,
) -> Result<Vec<u8>> {
    let (width, height) = (buffer.width(), buffer.height());
    run_with_panic_policy("encode:jxl", || handle.encode_rgba(buffer, params)).map_err(|err| {
        match err {
            PixpressError::CodecPanic { message, .. } => PixpressError::encode_crashed(
                "jxl",
                width,
                height,
                params.describe(Format::Jxl),
                message,
            ),
            other => other,
        }
    })
}
