//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::caption::{ReplacementRules, DEFAULT_LONG_PROMPT};
use crate::model::Device;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where model bundles are cached
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.florence/models"),
        }
    }
}

/// Model bundle location and execution device.
///
/// The bundle is a tokenizer plus a single ONNX generation graph that embeds
/// the vision encoder, the BART encoder-decoder and the beam search loop. Hub
/// exports of Florence-2 ship split graphs instead, so the generation graph is
/// produced locally: export the vision tower and the language model, then wrap
/// the encoder-decoder in an ONNX Runtime `com.microsoft.BeamSearch` node the way
/// `onnxruntime.transformers.convert_generation` does for BART. The result must
/// declare `pixel_values`, `input_ids`, `max_length` and `num_beams` (and may
/// declare `attention_mask`, `min_length`, `num_return_sequences`,
/// `length_penalty`, `repetition_penalty`) and output int32 `sequences`.
///
/// Point `generator` at that file with `{ path = "..." }`, or at a published
/// copy inside `repo` with `{ hub = "onnx/..." }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hub repository, `owner/name`
    pub repo: String,

    /// Branch, tag or commit to fetch
    pub revision: String,

    /// Hub base URL
    pub endpoint: String,

    /// Where the generation graph comes from
    pub generator: GeneratorSource,

    /// Tokenizer path inside the repository
    pub tokenizer_file: String,

    /// Execution device: "cpu", "cuda" or "cuda:N"
    pub device: Device,

    /// Never download; fail if the bundle is not cached
    pub offline: bool,

    /// Square input size of the vision encoder
    pub image_size: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repo: "onnx-community/Florence-2-large".to_string(),
            revision: "main".to_string(),
            endpoint: "https://huggingface.co".to_string(),
            generator: GeneratorSource::default(),
            tokenizer_file: "tokenizer.json".to_string(),
            device: Device::default(),
            offline: false,
            image_size: crate::model::DEFAULT_IMAGE_SIZE,
        }
    }
}

/// Location of the generation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorSource {
    /// A locally exported graph file
    Path(PathBuf),
    /// A file inside the `[model]` hub repository
    Hub(String),
}

impl Default for GeneratorSource {
    fn default() -> Self {
        Self::Path(PathBuf::from(
            "~/.florence/models/florence-2-large-beam-search.onnx",
        ))
    }
}

/// Caption defaults applied when the caller does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Free-text prompt. Florence-2 runs a fixed task, so this is not sent to the model.
    pub prompt: String,

    /// Upper bound on generated tokens
    pub max_new_tokens: usize,

    /// Cleanup substitutions, applied in order
    pub replacements: ReplacementRules,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_LONG_PROMPT.to_string(),
            max_new_tokens: 1024,
            replacements: ReplacementRules::default(),
        }
    }
}

/// Dataset discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Image extensions picked up in a dataset folder
    pub supported_formats: Vec<String>,

    /// Directory names never descended into
    pub skip_dirs: Vec<String>,

    /// Extension of the caption file written next to each image
    pub caption_extension: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            supported_formats: vec![
                "png".to_string(),
                "jpg".to_string(),
                "jpeg".to_string(),
                "webp".to_string(),
            ],
            skip_dirs: vec!["_controls".to_string()],
            caption_extension: "txt".to_string(),
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format ("json" or "jsonl")
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            pretty: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
