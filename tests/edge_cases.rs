// tests/edge_cases.rs
//
// Codec edge cases and the lossless roundtrip guarantees.

use pixpress::codecs::jxl::JxlEncoderHandle;
use pixpress::engine::{
    decode_avif_libavif, decode_jxl_libjxl, decode_png_zune, decode_webp_libwebp, encode_avif,
    encode_png, encode_webp, EncodeParams,
};
use pixpress::{
    resolve, CompressionEngine, CompressionRequest, CompressorSettings, Format, PixelBuffer,
    QualityLevel, TaskOutcome,
};

fn textured_buffer(width: u32, height: u32) -> PixelBuffer {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[
                ((x * 37 + y * 11) % 256) as u8,
                ((x * 13 + y * 101) % 256) as u8,
                ((x * 71 + y * 3) % 256) as u8,
                255,
            ]);
        }
    }
    PixelBuffer::from_rgba8(width, height, data).unwrap()
}

fn transparent_buffer(width: u32, height: u32) -> PixelBuffer {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let alpha = if (x + y) % 3 == 0 { 0 } else { 255 };
            data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 50, alpha]);
        }
    }
    PixelBuffer::from_rgba8(width, height, data).unwrap()
}

fn lossless_params(format: Format) -> EncodeParams {
    let mut params = EncodeParams::from_config(&resolve(format, QualityLevel::Lossless));
    pixpress::engine::apply_adaptive_policy(&mut params, 0);
    params
}

#[test]
fn test_png_lossless_roundtrip_is_pixel_exact() {
    let buffer = textured_buffer(16, 16);
    let config = resolve(Format::Png, QualityLevel::Lossless);
    assert_eq!(config.png_optimize, Some(2));
    let encoded = encode_png(&buffer, config.png_optimize.unwrap()).unwrap();
    let decoded = decode_png_zune(&encoded).unwrap();
    assert_eq!(decoded.data(), buffer.data());
}

#[test]
fn test_webp_lossless_roundtrip_is_pixel_exact() {
    let buffer = textured_buffer(16, 16);
    let encoded = encode_webp(&buffer, &lossless_params(Format::Webp)).unwrap();
    let decoded = decode_webp_libwebp(&encoded).unwrap();
    assert_eq!(decoded.data(), buffer.data());
}

#[test]
fn test_webp_lossless_keeps_transparency() {
    let buffer = transparent_buffer(12, 12);
    let encoded = encode_webp(&buffer, &lossless_params(Format::Webp)).unwrap();
    let decoded = decode_webp_libwebp(&encoded).unwrap();
    assert_eq!(decoded.data(), buffer.data());
}

#[test]
fn test_avif_lossless_roundtrip_is_pixel_exact() {
    let buffer = textured_buffer(16, 16);
    let encoded = encode_avif(&buffer, &lossless_params(Format::Avif)).unwrap();
    let decoded = decode_avif_libavif(&encoded).unwrap();
    assert_eq!(
        (decoded.width(), decoded.height()),
        (buffer.width(), buffer.height())
    );
    assert_eq!(decoded.data(), buffer.data());
}

#[test]
fn test_jxl_lossless_roundtrip_is_pixel_exact() {
    let buffer = textured_buffer(16, 16);
    let mut handle = JxlEncoderHandle::new().unwrap();
    let encoded = handle.encode_rgba(&buffer, &lossless_params(Format::Jxl)).unwrap();
    let decoded = decode_jxl_libjxl(&encoded).unwrap();
    assert_eq!(decoded.data(), buffer.data());
}

#[test]
fn test_jxl_singleton_handle_is_reusable() {
    // The worker keeps one encoder handle alive across jobs; back-to-back
    // encodes through the same handle must both succeed.
    let mut handle = JxlEncoderHandle::new().unwrap();
    let buffer = textured_buffer(8, 8);
    let lossy = {
        let mut params = EncodeParams::from_config(&resolve(Format::Jxl, QualityLevel::Low));
        pixpress::engine::apply_adaptive_policy(&mut params, buffer.pixel_count());
        params
    };
    let first = handle.encode_rgba(&buffer, &lossy).unwrap();
    let second = handle.encode_rgba(&buffer, &lossless_params(Format::Jxl)).unwrap();
    assert!(!first.is_empty());
    assert!(!second.is_empty());
}

#[test]
fn test_empty_input_resolves_to_error() {
    let engine = CompressionEngine::new();
    let request = CompressionRequest::new(
        "empty",
        Vec::new(),
        "image/png",
        &CompressorSettings::default(),
    );
    let result = engine.compress(request).unwrap();
    assert!(!result.outcome.is_success());
}

#[test]
fn test_single_pixel_image_compresses() {
    let engine = CompressionEngine::new();
    let png = {
        use image::{DynamicImage, Rgb, RgbImage};
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut buffer),
                image::ImageFormat::Png,
            )
            .unwrap();
        buffer
    };
    let settings = CompressorSettings {
        quality_level: QualityLevel::Balanced,
        target_format: Some(Format::Webp),
    };
    let result = engine
        .compress(CompressionRequest::new("1px", png, "image/png", &settings))
        .unwrap();
    match result.outcome {
        TaskOutcome::Success(artifact) => assert!(!artifact.bytes.is_empty()),
        TaskOutcome::Failure { message } => panic!("1x1 should compress: {message}"),
    }
}

#[test]
fn test_truncated_png_is_a_task_error_not_a_crash() {
    let engine = CompressionEngine::new();
    let mut png = {
        use image::{DynamicImage, Rgb, RgbImage};
        let img = RgbImage::from_pixel(16, 16, Rgb([1, 2, 3]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut buffer),
                image::ImageFormat::Png,
            )
            .unwrap();
        buffer
    };
    png.truncate(png.len() / 2);

    let result = engine
        .compress(CompressionRequest::new(
            "truncated",
            png,
            "image/png",
            &CompressorSettings::default(),
        ))
        .unwrap();
    assert!(!result.outcome.is_success());

    // Worker must still be alive for the next task.
    let good = {
        use image::{DynamicImage, Rgb, RgbImage};
        let img = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut buffer),
                image::ImageFormat::Png,
            )
            .unwrap();
        buffer
    };
    let result = engine
        .compress(CompressionRequest::new(
            "after-truncated",
            good,
            "image/png",
            &CompressorSettings::default(),
        ))
        .unwrap();
    assert!(result.outcome.is_success());
}

#[test]
fn test_avif_scenario_high_quality_large_image() {
    // 2000x1500 = 3,000,000 pixels: effort tier 1, quality 75, lossy.
    let config = resolve(Format::Avif, QualityLevel::High);
    let mut params = EncodeParams::from_config(&config);
    pixpress::engine::apply_adaptive_policy(&mut params, 2_000 * 1_500);
    assert_eq!(params.effort, 1);
    assert_eq!(params.quality, 75);
    assert!(!params.lossless);
}
