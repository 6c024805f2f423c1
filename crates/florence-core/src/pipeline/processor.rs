//! Dataset captioning: validate, decode, caption, and write the caption file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::caption::{CaptionOptions, Captioner};
use crate::config::Config;
use crate::error::{CaptionError, PipelineError, PipelineResult};
use crate::types::CaptionRecord;

use super::decode::{format_name, ImageDecoder};
use super::discovery::FileDiscovery;
use super::sidecar::SidecarWriter;
use super::validate::Validator;

/// Captions the images of a dataset folder one file at a time.
pub struct DatasetCaptioner {
    captioner: Arc<Captioner>,
    options: CaptionOptions,
    validator: Validator,
    decoder: ImageDecoder,
    discovery: FileDiscovery,
    sidecar: SidecarWriter,
}

impl DatasetCaptioner {
    /// Build the pipeline around a shared captioner, with caption defaults from `config`.
    pub fn new(captioner: Arc<Captioner>, config: &Config) -> Self {
        Self {
            captioner,
            options: CaptionOptions::from_config(&config.caption),
            validator: Validator::new(config.limits.clone()),
            decoder: ImageDecoder::new(config.limits.clone()),
            discovery: FileDiscovery::new(config.processing.clone()),
            sidecar: SidecarWriter::new(&config.processing.caption_extension),
        }
    }

    pub fn options(&self) -> &CaptionOptions {
        &self.options
    }

    /// Images to caption under `path`.
    pub fn discover(&self, path: &Path) -> Vec<PathBuf> {
        self.discovery.discover(path)
    }

    /// Whether `image_path` already has a caption file.
    pub fn has_sidecar(&self, image_path: &Path) -> bool {
        self.sidecar.exists(image_path)
    }

    /// Load the model up front so load failures surface before any file is touched.
    pub async fn ensure_loaded(&self) -> Result<(), CaptionError> {
        if self.captioner.is_loaded() {
            return Ok(());
        }
        let captioner = Arc::clone(&self.captioner);
        tokio::task::spawn_blocking(move || captioner.load_model())
            .await
            .map_err(|e| CaptionError::ModelLoad {
                model: "florence".to_string(),
                message: format!("Load task failed: {e}"),
            })?
    }

    /// Caption one image, optionally writing its caption file.
    pub async fn caption_file(
        &self,
        path: &Path,
        write_sidecar: bool,
    ) -> PipelineResult<CaptionRecord> {
        let start = Instant::now();
        tracing::debug!("Captioning: {:?}", path);

        self.validator.validate(path)?;
        let decoded = self.decoder.decode(path).await?;
        tracing::trace!("  Decode: {:?}", start.elapsed());

        let caption_start = Instant::now();
        let captioner = Arc::clone(&self.captioner);
        let options = self.options.clone();
        let image = decoded.image;
        let caption = tokio::task::spawn_blocking(move || {
            captioner.generate_caption(&image, &options)
        })
        .await
        .map_err(|e| CaptionError::Generation {
            message: format!("Caption task failed: {e}"),
        })
        .and_then(|result| result)
        .map_err(|source| PipelineError::Caption {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::trace!("  Caption: {:?}", caption_start.elapsed());

        let sidecar_path = if write_sidecar {
            Some(self.sidecar.write(path, &caption).await?)
        } else {
            None
        };

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!(
            "Captioned {:?} in {:?} ({}x{})",
            file_name,
            start.elapsed(),
            decoded.width,
            decoded.height
        );

        Ok(CaptionRecord {
            file_path: path.to_path_buf(),
            file_name,
            width: decoded.width,
            height: decoded.height,
            format: format_name(decoded.format),
            caption,
            sidecar_path,
        })
    }
}
