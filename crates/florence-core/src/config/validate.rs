//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::{Config, GeneratorSource};

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.model.repo.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "model.repo must be \"owner/name\", got {:?}",
                self.model.repo
            )));
        }
        let generator_unset = match &self.model.generator {
            GeneratorSource::Path(path) => path.as_os_str().is_empty(),
            GeneratorSource::Hub(file) => file.is_empty(),
        };
        if generator_unset || self.model.tokenizer_file.is_empty() {
            return Err(ConfigError::ValidationError(
                "model.generator and model.tokenizer_file must be set".into(),
            ));
        }
        if self.model.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.image_size must be > 0".into(),
            ));
        }
        if self.caption.max_new_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "caption.max_new_tokens must be > 0".into(),
            ));
        }
        if self.processing.caption_extension.is_empty() {
            return Err(ConfigError::ValidationError(
                "processing.caption_extension must not be empty".into(),
            ));
        }
        let caption_ext = self.processing.caption_extension.trim_start_matches('.');
        if self
            .processing
            .supported_formats
            .iter()
            .any(|fmt| fmt.trim_start_matches('.').eq_ignore_ascii_case(caption_ext))
        {
            return Err(ConfigError::ValidationError(format!(
                "processing.caption_extension {:?} is an image format; captions would overwrite the images",
                self.processing.caption_extension
            )));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if !matches!(self.output.format.as_str(), "json" | "jsonl") {
            return Err(ConfigError::ValidationError(format!(
                "output.format must be \"json\" or \"jsonl\", got {:?}",
                self.output.format
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bare_repo_name() {
        let mut config = Config::default();
        config.model.repo = "Florence-2-large".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model.repo"));
    }

    #[test]
    fn test_validate_rejects_empty_generator() {
        let mut config = Config::default();
        config.model.generator = GeneratorSource::Hub(String::new());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model.generator"));
    }

    #[test]
    fn test_validate_rejects_zero_max_new_tokens() {
        let mut config = Config::default();
        config.caption.max_new_tokens = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_new_tokens"));
    }

    #[test]
    fn test_validate_rejects_image_format_as_caption_extension() {
        let mut config = Config::default();
        config.processing.caption_extension = "png".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("caption_extension"));

        config.processing.caption_extension = "JPG".to_string();
        assert!(config.validate().is_err());

        config.processing.caption_extension = ".webp".to_string();
        assert!(config.validate().is_err());

        config.processing.caption_extension = "caption".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.decode_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decode_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_unknown_formats() {
        let mut config = Config::default();
        config.output.format = "csv".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("output.format"));

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("logging.format"));
    }
}
