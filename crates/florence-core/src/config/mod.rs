//! Configuration management for Florence.
//!
//! Configuration is loaded from the platform config dir with defaults for every
//! section, so a missing file or a partial file both work.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Florence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Model bundle and device
    pub model: ModelConfig,

    /// Caption defaults
    pub caption: CaptionConfig,

    /// Dataset discovery settings
    pub processing: ProcessingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.florence.florence/config.toml
    /// - Linux: ~/.config/florence/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\florence\config\config.toml
    ///
    /// Falls back to ~/.florence/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "florence", "florence")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".florence").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand_tilde(&self.general.model_dir)
    }

    /// The generation graph source with `~` expanded in local paths.
    pub fn generator(&self) -> GeneratorSource {
        match &self.model.generator {
            GeneratorSource::Path(path) => GeneratorSource::Path(expand_tilde(path)),
            hub => hub.clone(),
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::ReplacementRules;
    use crate::model::Device;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.repo, "onnx-community/Florence-2-large");
        assert_eq!(config.model.device, Device::Cuda(0));
        assert_eq!(config.caption.max_new_tokens, 1024);
        assert_eq!(config.caption.replacements, ReplacementRules::default());
        assert_eq!(config.processing.skip_dirs, vec!["_controls".to_string()]);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[model]"));
        assert!(toml.contains("[[caption.replacements]]"));
    }

    #[test]
    fn test_toml_round_trip_preserves_rules() {
        let mut config = Config::default();
        config.caption.replacements = ReplacementRules::empty().with("foo", "bar");
        config.model.device = Device::Cpu;

        let parsed: Config = toml::from_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.caption.replacements, config.caption.replacements);
        assert_eq!(parsed.model.device, Device::Cpu);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[model]\ndevice = \"cuda:1\"\n\n[caption]\nmax_new_tokens = 256\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model.device, Device::Cuda(1));
        assert_eq!(config.caption.max_new_tokens, 256);
        assert_eq!(config.model.tokenizer_file, "tokenizer.json");
        assert_eq!(config.limits.max_file_size_mb, 100);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[caption]\nmax_new_tokens = 0\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_model_dir_expands_tilde() {
        let config = Config::default();
        assert!(!config.model_dir().to_string_lossy().starts_with('~'));
        match config.generator() {
            GeneratorSource::Path(graph) => {
                assert!(!graph.to_string_lossy().starts_with('~'));
                assert!(graph.ends_with("florence-2-large-beam-search.onnx"));
            }
            other => panic!("expected a local graph, got {other:?}"),
        }
    }

    #[test]
    fn test_generator_source_from_toml() {
        let hub: Config =
            toml::from_str("[model]\ngenerator = { hub = \"onnx/beam.onnx\" }\n").unwrap();
        assert_eq!(
            hub.generator(),
            GeneratorSource::Hub("onnx/beam.onnx".to_string())
        );

        let local: Config =
            toml::from_str("[model]\ngenerator = { path = \"/models/beam.onnx\" }\n").unwrap();
        assert_eq!(
            local.generator(),
            GeneratorSource::Path(PathBuf::from("/models/beam.onnx"))
        );
    }

    #[test]
    fn test_generator_source_round_trips() {
        let mut config = Config::default();
        config.model.generator = GeneratorSource::Hub("onnx/beam.onnx".to_string());
        let parsed: Config = toml::from_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.model.generator, config.model.generator);
    }

    #[test]
    fn test_load_rejects_image_extension_for_captions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[processing]\ncaption_extension = \"png\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("caption_extension"));
    }
}
