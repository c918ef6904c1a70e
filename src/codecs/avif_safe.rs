// src/codecs/avif_safe.rs
//
// Safe abstractions for libavif FFI operations.
// This module provides RAII-based wrappers that hide raw pointers and
// eliminate unsafe blocks from the calling code.
#![deny(unsafe_op_in_unsafe_fn)]

use libavif_sys::*;
use std::num::NonZeroU32;
use std::ptr::NonNull;
#[cfg(test)]
use std::{cell::Cell, thread_local};

#[cfg(test)]
thread_local! {
    static TRACK_DROPS: Cell<bool> = Cell::new(false);
    static LIVE_IMAGES: Cell<usize> = Cell::new(0);
    static LIVE_ENCODERS: Cell<usize> = Cell::new(0);
    static LIVE_DECODERS: Cell<usize> = Cell::new(0);
    static LIVE_RWDATA: Cell<usize> = Cell::new(0);
}

/// A failed libavif call: which function failed and its structured result
/// code. Callers map this onto the crate error taxonomy; the result code is
/// the structured out-of-memory signal, so no message scanning is needed on
/// this path.
#[derive(Debug, Clone, Copy)]
pub struct AvifCallError {
    pub what: &'static str,
    pub result: avifResult,
}

impl AvifCallError {
    fn new(what: &'static str, result: avifResult) -> Self {
        Self { what, result }
    }

    pub fn is_out_of_memory(&self) -> bool {
        self.result == AVIF_RESULT_OUT_OF_MEMORY
    }
}

impl std::fmt::Display for AvifCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: result {:?}", self.what, self.result)
    }
}

type AvifResult<T> = std::result::Result<T, AvifCallError>;

fn check(result: avifResult, what: &'static str) -> AvifResult<()> {
    if result == AVIF_RESULT_OK {
        Ok(())
    } else {
        Err(AvifCallError::new(what, result))
    }
}

/// Safe wrapper for avifImage that manages its lifetime using RAII.
pub struct SafeAvifImage {
    ptr: Option<NonNull<avifImage>>,
}

impl SafeAvifImage {
    fn validate_dimensions(width: u32, height: u32) -> AvifResult<(NonZeroU32, NonZeroU32)> {
        let w = NonZeroU32::new(width)
            .ok_or_else(|| AvifCallError::new("avifImageCreate", AVIF_RESULT_INVALID_ARGUMENT))?;
        let h = NonZeroU32::new(height)
            .ok_or_else(|| AvifCallError::new("avifImageCreate", AVIF_RESULT_INVALID_ARGUMENT))?;

        (width as u64)
            .checked_mul(height as u64)
            .and_then(|px| px.checked_mul(4))
            .ok_or_else(|| AvifCallError::new("avifImageCreate", AVIF_RESULT_INVALID_ARGUMENT))?;

        Ok((w, h))
    }

    /// Create a new AVIF image with the given dimensions and pixel format.
    pub fn new(
        width: u32,
        height: u32,
        depth: u32,
        pixel_format: avifPixelFormat,
    ) -> AvifResult<Self> {
        let (_w, _h) = Self::validate_dimensions(width, height)?;
        let ptr = unsafe { avifImageCreate(width, height, depth, pixel_format) };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| AvifCallError::new("avifImageCreate", AVIF_RESULT_OUT_OF_MEMORY))?;
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_IMAGES.with(|c| c.set(c.get() + 1));
            }
        });
        Ok(Self { ptr: Some(ptr) })
    }

    /// Set CICP color properties for the image.
    pub fn set_color_properties(
        &mut self,
        primaries: u16,
        transfer: u16,
        matrix: u16,
        yuv_range: avifRange,
    ) {
        let image = self
            .ptr
            .expect("SafeAvifImage pointer was released before configuration");
        unsafe {
            let raw = image.as_ptr();
            (*raw).colorPrimaries = primaries;
            (*raw).transferCharacteristics = transfer;
            (*raw).matrixCoefficients = matrix;
            (*raw).yuvRange = yuv_range;
        }
    }

    /// Allocate YUV or alpha planes in the image.
    pub fn allocate_planes(&mut self, planes: u32) -> AvifResult<()> {
        let image = self
            .ptr
            .ok_or_else(|| AvifCallError::new("avifImageAllocatePlanes", AVIF_RESULT_INVALID_ARGUMENT))?;
        check(
            unsafe { avifImageAllocatePlanes(image.as_ptr(), planes) },
            "avifImageAllocatePlanes",
        )
    }

    /// Convert RGB to YUV using libavif's optimized conversion.
    pub fn rgb_to_yuv(&mut self, rgb: &avifRGBImage) -> AvifResult<()> {
        let image = self
            .ptr
            .ok_or_else(|| AvifCallError::new("avifImageRGBToYUV", AVIF_RESULT_INVALID_ARGUMENT))?;
        check(
            unsafe { avifImageRGBToYUV(image.as_ptr(), rgb) },
            "avifImageRGBToYUV",
        )
    }

    /// Get a pointer to the alpha plane.
    ///
    /// # Safety
    /// Caller must ensure that the alpha plane is allocated and exclusive
    /// access is held.
    pub unsafe fn alpha_plane_mut(&mut self) -> AvifResult<NonNull<u8>> {
        let image = self
            .ptr
            .ok_or_else(|| AvifCallError::new("alphaPlane", AVIF_RESULT_INVALID_ARGUMENT))?;
        let plane_ptr = unsafe { (*image.as_ptr()).alphaPlane };
        NonNull::new(plane_ptr)
            .ok_or_else(|| AvifCallError::new("alphaPlane", AVIF_RESULT_INVALID_ARGUMENT))
    }

    /// Get the alpha row stride in bytes.
    pub fn alpha_row_bytes(&self) -> usize {
        let image = self
            .ptr
            .expect("SafeAvifImage pointer was released before querying alpha rows");
        unsafe { (*image.as_ptr()).alphaRowBytes as usize }
    }

    /// Get a mutable raw pointer to the avifImage for FFI calls.
    ///
    /// # Safety
    /// The caller must ensure that the pointer is not used after the
    /// SafeAvifImage is dropped, and that it is not used concurrently.
    pub unsafe fn as_mut_ptr(&mut self) -> *mut avifImage {
        self.ptr
            .as_mut()
            .expect("SafeAvifImage pointer was released before FFI use")
            .as_ptr()
    }
}

impl Drop for SafeAvifImage {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { avifImageDestroy(ptr.as_ptr()) };
        }
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_IMAGES.with(|c| c.set(c.get().saturating_sub(1)));
            }
        });
    }
}

/// Safe wrapper for avifEncoder that manages its lifetime using RAII.
pub struct SafeAvifEncoder {
    ptr: Option<NonNull<avifEncoder>>,
}

impl SafeAvifEncoder {
    pub fn new() -> AvifResult<Self> {
        let ptr = unsafe { avifEncoderCreate() };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| AvifCallError::new("avifEncoderCreate", AVIF_RESULT_OUT_OF_MEMORY))?;
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_ENCODERS.with(|c| c.set(c.get() + 1));
            }
        });
        Ok(Self { ptr: Some(ptr) })
    }

    /// Set encoder quality settings.
    ///
    /// `quality`/`quality_alpha` are 0-100 (100 = lossless), `speed` is the
    /// libavif scale 0 (slowest/best) to 10 (fastest/worst).
    pub fn configure(&mut self, quality: u8, quality_alpha: u8, speed: i32, max_threads: i32) {
        let encoder = self
            .ptr
            .expect("SafeAvifEncoder pointer was released before configuration");
        unsafe {
            let raw = encoder.as_ptr();
            (*raw).quality = quality as i32;
            (*raw).qualityAlpha = quality_alpha as i32;
            (*raw).speed = speed;
            (*raw).maxThreads = max_threads;
        }
    }

    pub fn add_image(
        &mut self,
        image: &mut SafeAvifImage,
        duration: u64,
        add_image_flags: u32,
    ) -> AvifResult<()> {
        let encoder = self
            .ptr
            .ok_or_else(|| AvifCallError::new("avifEncoderAddImage", AVIF_RESULT_INVALID_ARGUMENT))?;
        check(
            unsafe {
                avifEncoderAddImage(
                    encoder.as_ptr(),
                    image.as_mut_ptr(),
                    duration,
                    add_image_flags,
                )
            },
            "avifEncoderAddImage",
        )
    }

    pub fn finish(&mut self, output: &mut SafeAvifRwData) -> AvifResult<()> {
        let encoder = self
            .ptr
            .ok_or_else(|| AvifCallError::new("avifEncoderFinish", AVIF_RESULT_INVALID_ARGUMENT))?;
        check(
            unsafe { avifEncoderFinish(encoder.as_ptr(), output.as_mut_ptr()) },
            "avifEncoderFinish",
        )
    }
}

impl Drop for SafeAvifEncoder {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { avifEncoderDestroy(ptr.as_ptr()) };
        }
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_ENCODERS.with(|c| c.set(c.get().saturating_sub(1)));
            }
        });
    }
}

/// Safe wrapper for avifDecoder that manages its lifetime using RAII.
pub struct SafeAvifDecoder {
    ptr: Option<NonNull<avifDecoder>>,
}

impl SafeAvifDecoder {
    pub fn new() -> AvifResult<Self> {
        let ptr = unsafe { avifDecoderCreate() };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| AvifCallError::new("avifDecoderCreate", AVIF_RESULT_OUT_OF_MEMORY))?;
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_DECODERS.with(|c| c.set(c.get() + 1));
            }
        });
        Ok(Self { ptr: Some(ptr) })
    }

    /// Decode the first image in the container into interleaved RGBA8.
    /// Returns (width, height, pixels). Fails loudly when the decoder
    /// accepts the bytes but yields no image data.
    pub fn decode_rgba(&mut self, bytes: &[u8]) -> AvifResult<(u32, u32, Vec<u8>)> {
        let decoder = self
            .ptr
            .ok_or_else(|| AvifCallError::new("avifDecoder", AVIF_RESULT_INVALID_ARGUMENT))?;
        let raw = decoder.as_ptr();

        check(
            unsafe { avifDecoderSetIOMemory(raw, bytes.as_ptr(), bytes.len()) },
            "avifDecoderSetIOMemory",
        )?;
        check(unsafe { avifDecoderParse(raw) }, "avifDecoderParse")?;
        check(unsafe { avifDecoderNextImage(raw) }, "avifDecoderNextImage")?;

        let image = unsafe { (*raw).image };
        if image.is_null() {
            return Err(AvifCallError::new(
                "avifDecoderNextImage",
                AVIF_RESULT_NO_IMAGES_REMAINING,
            ));
        }
        let (width, height) = unsafe { ((*image).width, (*image).height) };
        if width == 0 || height == 0 {
            return Err(AvifCallError::new(
                "avifDecoderNextImage",
                AVIF_RESULT_NO_IMAGES_REMAINING,
            ));
        }

        let mut rgb: avifRGBImage = unsafe { std::mem::zeroed() };
        unsafe {
            avifRGBImageSetDefaults(&mut rgb, image);
        }
        rgb.format = AVIF_RGB_FORMAT_RGBA;
        rgb.depth = 8;

        check(
            unsafe { avifRGBImageAllocatePixels(&mut rgb) },
            "avifRGBImageAllocatePixels",
        )?;

        let converted = unsafe { avifImageYUVToRGB(image, &mut rgb) };
        if converted != AVIF_RESULT_OK {
            unsafe { avifRGBImageFreePixels(&mut rgb) };
            return Err(AvifCallError::new("avifImageYUVToRGB", converted));
        }

        // Rows may be padded to rowBytes; copy them out tightly packed.
        let row_len = width as usize * 4;
        let mut pixels = Vec::with_capacity(row_len * height as usize);
        unsafe {
            for y in 0..height as usize {
                let row = rgb.pixels.add(y * rgb.rowBytes as usize);
                pixels.extend_from_slice(std::slice::from_raw_parts(row, row_len));
            }
            avifRGBImageFreePixels(&mut rgb);
        }

        Ok((width, height, pixels))
    }
}

impl Drop for SafeAvifDecoder {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { avifDecoderDestroy(ptr.as_ptr()) };
        }
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_DECODERS.with(|c| c.set(c.get().saturating_sub(1)));
            }
        });
    }
}

/// Safe wrapper for avifRWData that manages its lifetime using RAII.
pub struct SafeAvifRwData {
    data: avifRWData,
}

impl SafeAvifRwData {
    pub fn new() -> Self {
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_RWDATA.with(|c| c.set(c.get() + 1));
            }
        });
        Self {
            data: unsafe { std::mem::zeroed() },
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe {
            if self.data.data.is_null() || self.data.size == 0 {
                &[]
            } else {
                std::slice::from_raw_parts(self.data.data, self.data.size)
            }
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Get a mutable raw pointer to the avifRWData for FFI calls.
    ///
    /// # Safety
    /// The caller must ensure that the pointer is not used after the
    /// SafeAvifRwData is dropped.
    pub unsafe fn as_mut_ptr(&mut self) -> *mut avifRWData {
        &mut self.data
    }
}

impl Drop for SafeAvifRwData {
    fn drop(&mut self) {
        unsafe {
            avifRWDataFree(&mut self.data);
        }
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_RWDATA.with(|c| c.set(c.get().saturating_sub(1)));
            }
        });
    }
}

impl Default for SafeAvifRwData {
    fn default() -> Self {
        Self::new()
    }
}

/// Create and configure an avifRGBImage viewing caller-owned RGBA8 pixels.
/// Encapsulates the unsafe setup needed before avifImageRGBToYUV.
pub fn create_rgb_image(
    image: &mut SafeAvifImage,
    pixels: *const u8,
    width: u32,
    height: u32,
) -> AvifResult<avifRGBImage> {
    SafeAvifImage::validate_dimensions(width, height)?;

    let row_bytes_u32: u32 = width
        .checked_mul(4)
        .ok_or_else(|| AvifCallError::new("avifRGBImage", AVIF_RESULT_INVALID_ARGUMENT))?;

    let total_bytes = (row_bytes_u32 as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| AvifCallError::new("avifRGBImage", AVIF_RESULT_INVALID_ARGUMENT))?;

    if total_bytes == 0 || pixels.is_null() {
        return Err(AvifCallError::new(
            "avifRGBImage",
            AVIF_RESULT_INVALID_ARGUMENT,
        ));
    }

    let mut rgb: avifRGBImage = unsafe { std::mem::zeroed() };
    unsafe {
        avifRGBImageSetDefaults(&mut rgb, image.as_mut_ptr());
    }
    rgb.format = AVIF_RGB_FORMAT_RGBA;
    rgb.depth = 8;
    rgb.pixels = pixels as *mut u8;
    rgb.rowBytes = row_bytes_u32;
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enable_drop_tracking() -> DropTrackingGuard {
        TRACK_DROPS.with(|t| t.set(true));
        LIVE_IMAGES.with(|c| c.set(0));
        LIVE_ENCODERS.with(|c| c.set(0));
        LIVE_DECODERS.with(|c| c.set(0));
        LIVE_RWDATA.with(|c| c.set(0));
        DropTrackingGuard
    }

    struct DropTrackingGuard;

    impl Drop for DropTrackingGuard {
        fn drop(&mut self) {
            TRACK_DROPS.with(|t| t.set(false));
        }
    }

    fn live_images() -> usize {
        LIVE_IMAGES.with(|c| c.get())
    }

    #[test]
    fn new_rejects_zero_dimensions() {
        let err = SafeAvifImage::new(0, 10, 8, AVIF_PIXEL_FORMAT_YUV420)
            .err()
            .expect("zero width should fail");
        assert_eq!(err.result, AVIF_RESULT_INVALID_ARGUMENT);
        assert!(!err.is_out_of_memory());
    }

    #[test]
    fn create_rgb_image_rejects_null_pixels() {
        let mut img = SafeAvifImage::new(4, 2, 8, AVIF_PIXEL_FORMAT_YUV420).unwrap();
        let err = create_rgb_image(&mut img, std::ptr::null(), 4, 2).unwrap_err();
        assert_eq!(err.result, AVIF_RESULT_INVALID_ARGUMENT);
    }

    #[test]
    fn create_rgb_image_sets_row_bytes() {
        let mut img = SafeAvifImage::new(4, 2, 8, AVIF_PIXEL_FORMAT_YUV420).unwrap();
        let pixels: [u8; 32] = [0; 32];
        let rgb = create_rgb_image(&mut img, pixels.as_ptr(), 4, 2).unwrap();
        assert_eq!(rgb.rowBytes, 16);
        assert_eq!(rgb.format, AVIF_RGB_FORMAT_RGBA);
    }

    #[test]
    fn oom_result_is_structured() {
        let err = AvifCallError::new("avifEncoderFinish", AVIF_RESULT_OUT_OF_MEMORY);
        assert!(err.is_out_of_memory());
        assert!(err.to_string().contains("avifEncoderFinish"));
    }

    #[test]
    fn decoder_rejects_garbage_bytes() {
        let mut decoder = SafeAvifDecoder::new().unwrap();
        let err = decoder.decode_rgba(&[0u8; 16]).unwrap_err();
        assert_ne!(err.result, AVIF_RESULT_OK);
    }

    #[test]
    fn image_drop_happens_on_unwind() {
        let _guard = enable_drop_tracking();
        assert_eq!(live_images(), 0);

        let result = std::panic::catch_unwind(|| {
            let _img = SafeAvifImage::new(2, 2, 8, AVIF_PIXEL_FORMAT_YUV444).unwrap();
            assert_eq!(live_images(), 1);
            panic!("force unwind");
        });

        assert!(result.is_err());
        assert_eq!(live_images(), 0, "image drop should run during unwind");
    }

    #[test]
    fn wrappers_release_on_scope_exit() {
        let _guard = enable_drop_tracking();
        {
            let _img = SafeAvifImage::new(2, 2, 8, AVIF_PIXEL_FORMAT_YUV420).unwrap();
            let _enc = SafeAvifEncoder::new().unwrap();
            let _dec = SafeAvifDecoder::new().unwrap();
            let _rw = SafeAvifRwData::new();
            assert_eq!(LIVE_IMAGES.with(|c| c.get()), 1);
            assert_eq!(LIVE_ENCODERS.with(|c| c.get()), 1);
            assert_eq!(LIVE_DECODERS.with(|c| c.get()), 1);
            assert_eq!(LIVE_RWDATA.with(|c| c.get()), 1);
        }
        assert_eq!(LIVE_IMAGES.with(|c| c.get()), 0);
        assert_eq!(LIVE_ENCODERS.with(|c| c.get()), 0);
        assert_eq!(LIVE_DECODERS.with(|c| c.get()), 0);
        assert_eq!(LIVE_RWDATA.with(|c| c.get()), 0);
    }
}
