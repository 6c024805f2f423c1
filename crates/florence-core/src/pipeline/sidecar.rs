//! Caption files written next to dataset images.

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

/// Writes `<stem>.<extension>` caption files beside images.
pub struct SidecarWriter {
    extension: String,
}

impl SidecarWriter {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Caption file path for an image.
    pub fn path_for(&self, image_path: &Path) -> PathBuf {
        image_path.with_extension(&self.extension)
    }

    pub fn exists(&self, image_path: &Path) -> bool {
        self.path_for(image_path).exists()
    }

    /// Write `caption` for `image_path`, replacing any existing caption file.
    pub async fn write(&self, image_path: &Path, caption: &str) -> PipelineResult<PathBuf> {
        let path = self.path_for(image_path);
        tokio::fs::write(&path, caption)
            .await
            .map_err(|e| PipelineError::Sidecar {
                path: path.clone(),
                message: e.to_string(),
            })?;
        tracing::debug!("Wrote caption to {:?}", path);
        Ok(path)
    }
}
