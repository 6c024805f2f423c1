//! Loads the Florence-2 ONNX bundle through the model registry.

use std::path::PathBuf;

use crate::config::{Config, GeneratorSource};
use crate::error::{CaptionError, CaptionResult};

use super::processor::FlorenceProcessor;
use super::registry::ModelRegistry;
use super::session::OnnxGenerator;
use super::{Device, LoadedModel, ModelLoader};

/// Resolves the generation graph and tokenizer, then builds both handles.
pub struct OnnxModelLoader {
    registry: ModelRegistry,
    generator: GeneratorSource,
    tokenizer_file: String,
    image_size: u32,
}

impl OnnxModelLoader {
    pub fn new(
        registry: ModelRegistry,
        generator: GeneratorSource,
        tokenizer_file: impl Into<String>,
        image_size: u32,
    ) -> Self {
        Self {
            registry,
            generator,
            tokenizer_file: tokenizer_file.into(),
            image_size,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ModelRegistry::from_config(config),
            config.generator(),
            &config.model.tokenizer_file,
            config.model.image_size,
        )
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Locally exported generation graph, if the bundle uses one.
    pub fn local_generator(&self) -> Option<&PathBuf> {
        match &self.generator {
            GeneratorSource::Path(path) => Some(path),
            GeneratorSource::Hub(_) => None,
        }
    }

    /// Remote paths of the bundle files fetched from the hub.
    pub fn bundle_files(&self) -> Vec<&str> {
        match &self.generator {
            GeneratorSource::Hub(file) => vec![file.as_str(), self.tokenizer_file.as_str()],
            GeneratorSource::Path(_) => vec![self.tokenizer_file.as_str()],
        }
    }

    fn generator_path(&self) -> CaptionResult<PathBuf> {
        match &self.generator {
            GeneratorSource::Hub(file) => self.registry.resolve(file),
            GeneratorSource::Path(path) if path.is_file() => Ok(path.clone()),
            GeneratorSource::Path(path) => Err(CaptionError::ModelLoad {
                model: path.display().to_string(),
                message: "generation graph not found. Export a beam search graph \
                          and point `[model] generator` at it."
                    .to_string(),
            }),
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn model_id(&self) -> &str {
        self.registry.repo()
    }

    fn load(&self, device: &Device) -> CaptionResult<LoadedModel> {
        let generator_path = self.generator_path()?;
        let tokenizer_path = self.registry.resolve(&self.tokenizer_file)?;

        let processor = FlorenceProcessor::from_file(&tokenizer_path, self.image_size)?;
        let generator = OnnxGenerator::load(&generator_path, device)?;

        Ok(LoadedModel::new(Box::new(generator), Box::new(processor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_registry(dir: &std::path::Path) -> ModelRegistry {
        ModelRegistry::new("https://huggingface.co", "owner/model", "main", dir).with_offline(true)
    }

    fn hub_loader(dir: &std::path::Path) -> OnnxModelLoader {
        OnnxModelLoader::new(
            offline_registry(dir),
            GeneratorSource::Hub("onnx/generation.onnx".to_string()),
            "tokenizer.json",
            768,
        )
    }

    #[test]
    fn test_model_id_is_repo() {
        let dir = tempfile::tempdir().unwrap();
        let loader = hub_loader(dir.path());
        assert_eq!(loader.model_id(), "owner/model");
        assert_eq!(
            loader.bundle_files(),
            vec!["onnx/generation.onnx", "tokenizer.json"]
        );
        assert!(loader.local_generator().is_none());
    }

    #[test]
    fn test_missing_bundle_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let loader = hub_loader(dir.path());
        let err = loader.load(&Device::Cpu).err().unwrap();
        assert!(err.is_load_failure());
        assert!(err.to_string().contains("onnx/generation.onnx"));
    }

    #[test]
    fn test_missing_local_graph_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let graph = dir.path().join("beam.onnx");
        let loader = OnnxModelLoader::new(
            offline_registry(dir.path()),
            GeneratorSource::Path(graph.clone()),
            "tokenizer.json",
            768,
        );

        assert_eq!(loader.bundle_files(), vec!["tokenizer.json"]);
        assert_eq!(loader.local_generator(), Some(&graph));

        let err = loader.load(&Device::Cpu).err().unwrap();
        assert!(err.is_load_failure());
        assert!(err.to_string().contains("beam.onnx"));
        assert!(err.to_string().contains("[model] generator"));
    }

    #[test]
    fn test_from_config_uses_model_section() {
        let mut config = Config::default();
        config.model.repo = "acme/florence-tiny".to_string();
        config.model.tokenizer_file = "tok.json".to_string();
        let loader = OnnxModelLoader::from_config(&config);
        assert_eq!(loader.model_id(), "acme/florence-tiny");
        assert_eq!(loader.bundle_files(), vec!["tok.json"]);
        assert!(loader.local_generator().is_some());
    }
}
