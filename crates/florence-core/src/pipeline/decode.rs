//! Image decoding off the async runtime, with a timeout and a dimension limit.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, ImageReader};
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::{PipelineError, PipelineResult};

/// A decoded image and what we learned while decoding it.
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Decodes images within the configured limits.
pub struct ImageDecoder {
    limits: LimitsConfig,
}

impl ImageDecoder {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Read and decode `path`, giving up after `decode_timeout_ms`.
    pub async fn decode(&self, path: &Path) -> PipelineResult<DecodedImage> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot read file: {e}"),
            })?;

        let owned = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || decode_bytes(bytes, &owned));
        let decoded = match timeout(Duration::from_millis(self.limits.decode_timeout_ms), task).await
        {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(PipelineError::Decode {
                    path: path.to_path_buf(),
                    message: format!("Decode task failed: {e}"),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    path: path.to_path_buf(),
                    stage: "decode".to_string(),
                    timeout_ms: self.limits.decode_timeout_ms,
                })
            }
        };

        let max_dim = self.limits.max_image_dimension;
        if decoded.width > max_dim || decoded.height > max_dim {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width: decoded.width,
                height: decoded.height,
                max_dim,
            });
        }

        Ok(decoded)
    }
}

/// Decode from memory, trusting the content over the extension.
fn decode_bytes(bytes: Vec<u8>, path: &Path) -> PipelineResult<DecodedImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {e}"),
        })?;

    let format = reader
        .format()
        .ok_or_else(|| PipelineError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
                .to_string(),
        })?;

    let image = reader.decode().map_err(|e| PipelineError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        image,
        format,
    })
}

/// Lowercase name for a format, e.g. "png" or "webp".
pub fn format_name(format: ImageFormat) -> String {
    format!("{format:?}").to_lowercase()
}
