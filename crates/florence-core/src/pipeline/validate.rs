//! Cheap checks run before an image is decoded.

use std::io::Read;
use std::path::Path;

use image::ImageFormat;

use crate::config::LimitsConfig;
use crate::error::{PipelineError, PipelineResult};

/// Formats a caption dataset may contain.
const ACCEPTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// Bytes read to sniff the container format.
const HEADER_LEN: usize = 16;

/// Rejects files that are missing, oversized, or not images.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Validate `path` and return its size in bytes.
    pub fn validate(&self, path: &Path) -> PipelineResult<u64> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::FileNotFound(path.to_path_buf()),
            _ => PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot read metadata: {e}"),
            },
        })?;

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let mut header = Vec::with_capacity(HEADER_LEN);
        std::fs::File::open(path)
            .and_then(|file| file.take(HEADER_LEN as u64).read_to_end(&mut header))
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot read header: {e}"),
            })?;

        sniff_format(&header).map_err(|message| PipelineError::Decode {
            path: path.to_path_buf(),
            message,
        })?;

        Ok(metadata.len())
    }
}

/// Identify the format from magic bytes, accepting only dataset formats.
pub fn sniff_format(header: &[u8]) -> Result<ImageFormat, String> {
    let format = image::guess_format(header)
        .map_err(|_| "Unrecognized image format (invalid magic bytes)".to_string())?;
    if ACCEPTED_FORMATS.contains(&format) {
        Ok(format)
    } else {
        Err(format!("{format:?} images are not supported"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_common_formats() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0];
        let webp = [b'R', b'I', b'F', b'F', 0, 0, 0, 0, b'W', b'E', b'B', b'P'];

        assert_eq!(sniff_format(&png), Ok(ImageFormat::Png));
        assert_eq!(sniff_format(&jpeg), Ok(ImageFormat::Jpeg));
        assert_eq!(sniff_format(&webp), Ok(ImageFormat::WebP));
    }

    #[test]
    fn test_sniff_rejects_text() {
        assert!(sniff_format(b"a cat, a hat").is_err());
        assert!(sniff_format(&[]).is_err());
    }

    #[test]
    fn test_validate_missing_file() {
        let validator = Validator::new(LimitsConfig::default());
        assert!(matches!(
            validator.validate(Path::new("/nonexistent/a.png")),
            Err(PipelineError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_validate_rejects_misnamed_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, "definitely not a png").unwrap();

        let validator = Validator::new(LimitsConfig::default());
        assert!(matches!(
            validator.validate(&path),
            Err(PipelineError::Decode { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_png_and_returns_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();

        let validator = Validator::new(LimitsConfig::default());
        let size = validator.validate(&path).unwrap();
        assert_eq!(size, std::fs::metadata(&path).unwrap().len());
    }
}
