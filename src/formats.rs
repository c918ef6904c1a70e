// src/formats.rs
//
// The closed set of image formats the engine understands, plus the
// mime/extension mapping used at the dispatch and save boundaries.

use image::ImageFormat;

/// Image formats known to the codec registry.
///
/// Heic is decode-capable only; encode requests for it are rerouted to Jpeg
/// by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Jpeg,
    Png,
    Webp,
    Avif,
    Jxl,
    Heic,
}

impl Format {
    pub const ALL: [Format; 6] = [
        Format::Jpeg,
        Format::Png,
        Format::Webp,
        Format::Avif,
        Format::Jxl,
        Format::Heic,
    ];

    /// Number of formats; sizes the codec registry's slot table.
    pub(crate) const COUNT: usize = Self::ALL.len();

    pub(crate) fn index(self) -> usize {
        match self {
            Format::Jpeg => 0,
            Format::Png => 1,
            Format::Webp => 2,
            Format::Avif => 3,
            Format::Jxl => 4,
            Format::Heic => 5,
        }
    }

    /// Map an input mime type to a format. Returns None for anything the
    /// dedicated codecs do not cover; those inputs go through the generic
    /// raster fallback decode.
    pub fn from_mime(mime: &str) -> Option<Format> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Format::Jpeg),
            "image/png" => Some(Format::Png),
            "image/webp" => Some(Format::Webp),
            "image/avif" => Some(Format::Avif),
            "image/jxl" => Some(Format::Jxl),
            "image/heic" | "image/heif" => Some(Format::Heic),
            _ => None,
        }
    }

    /// Map a sniffed container format to ours, for inputs submitted with a
    /// generic or missing mime type.
    pub(crate) fn from_image_format(format: ImageFormat) -> Option<Format> {
        match format {
            ImageFormat::Jpeg => Some(Format::Jpeg),
            ImageFormat::Png => Some(Format::Png),
            ImageFormat::WebP => Some(Format::Webp),
            ImageFormat::Avif => Some(Format::Avif),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Format::Jpeg => "image/jpeg",
            Format::Png => "image/png",
            Format::Webp => "image/webp",
            Format::Avif => "image/avif",
            Format::Jxl => "image/jxl",
            Format::Heic => "image/heic",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Webp => "webp",
            Format::Avif => "avif",
            Format::Jxl => "jxl",
            Format::Heic => "heic",
        }
    }

    /// Canonical file extension. `jpeg -> jpg` is the only remap.
    pub fn canonical_extension(self) -> &'static str {
        match self {
            Format::Jpeg => "jpg",
            Format::Png => "png",
            Format::Webp => "webp",
            Format::Avif => "avif",
            Format::Jxl => "jxl",
            Format::Heic => "heic",
        }
    }

    /// The format actually used when encoding. Heic has no encoder; requests
    /// for it are silently rerouted to the JPEG encoder.
    pub fn encode_target(self) -> Format {
        match self {
            Format::Heic => Format::Jpeg,
            other => other,
        }
    }

    pub fn encode_supported(self) -> bool {
        !matches!(self, Format::Heic)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output filename offered to the save/download layer: original stem plus a
/// "_compressed" suffix and the output format's canonical extension.
pub fn suggested_filename(original_name: &str, format: Format) -> String {
    let stem = match original_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => original_name,
    };
    format!("{}_compressed.{}", stem, format.canonical_extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_roundtrip() {
        for format in Format::ALL {
            assert_eq!(Format::from_mime(format.mime()), Some(format));
        }
        // heif alias maps to heic
        assert_eq!(Format::from_mime("image/heif"), Some(Format::Heic));
        // case and whitespace tolerated
        assert_eq!(Format::from_mime(" IMAGE/PNG "), Some(Format::Png));
        assert_eq!(Format::from_mime("application/pdf"), None);
    }

    #[test]
    fn test_jpeg_extension_remap() {
        assert_eq!(Format::Jpeg.canonical_extension(), "jpg");
        for format in Format::ALL {
            if format != Format::Jpeg {
                assert_eq!(format.canonical_extension(), format.as_str());
            }
        }
    }

    #[test]
    fn test_heic_encode_substitution() {
        assert_eq!(Format::Heic.encode_target(), Format::Jpeg);
        assert!(!Format::Heic.encode_supported());
        for format in Format::ALL {
            if format != Format::Heic {
                assert_eq!(format.encode_target(), format);
                assert!(format.encode_supported());
            }
        }
    }

    #[test]
    fn test_suggested_filename() {
        assert_eq!(
            suggested_filename("holiday.heic", Format::Jpeg),
            "holiday_compressed.jpg"
        );
        assert_eq!(
            suggested_filename("photo.png", Format::Webp),
            "photo_compressed.webp"
        );
        // no extension on the original
        assert_eq!(
            suggested_filename("scan", Format::Png),
            "scan_compressed.png"
        );
        // dotfile-style name keeps its full stem
        assert_eq!(
            suggested_filename(".hidden", Format::Jpeg),
            ".hidden_compressed.jpg"
        );
        // multiple dots: only the last extension is dropped
        assert_eq!(
            suggested_filename("archive.tar.png", Format::Avif),
            "archive.tar_compressed.avif"
        );
    }

    #[test]
    fn test_slot_indices_are_dense() {
        for (expected, format) in Format::ALL.into_iter().enumerate() {
            assert_eq!(format.index(), expected);
        }
    }
}
