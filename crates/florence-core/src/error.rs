//! Error types for Florence captioning.
//!
//! Errors are layered the same way the work is: configuration, the captioning
//! adapter itself, and the file-level dataset pipeline built on top of it. The
//! binary folds all of them into `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised by the captioning adapter and its model handles.
///
/// None of these are caught inside the adapter; they reach the caller as-is.
#[derive(Error, Debug)]
pub enum CaptionError {
    /// Model or processor could not be fetched, parsed, or turned into a session
    #[error("Failed to load model {model}: {message}")]
    ModelLoad { model: String, message: String },

    /// The configured execution device is unavailable or incompatible
    #[error("Device {device} unavailable: {message}")]
    Device { device: String, message: String },

    /// Building model inputs from the prompt and image failed
    #[error("Preprocessing failed: {message}")]
    Preprocess { message: String },

    /// The model's generate call failed
    #[error("Generation failed: {message}")]
    Generation { message: String },

    /// Decoding token ids or parsing the decoded text failed
    #[error("Decode failed: {message}")]
    Decode { message: String },

    /// The caller passed an argument the adapter cannot honor
    #[error("Invalid caption request: {0}")]
    InvalidRequest(String),
}

impl CaptionError {
    /// True for the error kinds raised while acquiring the model.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::ModelLoad { .. } | Self::Device { .. })
    }
}

/// Dataset pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Captioning failed for this image
    #[error("Caption failed for {path}: {source}")]
    Caption {
        path: PathBuf,
        #[source]
        source: CaptionError,
    },

    /// Writing the caption sidecar failed
    #[error("Failed to write caption for {path}: {message}")]
    Sidecar { path: PathBuf, message: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Convenience type alias for adapter results.
pub type CaptionResult<T> = std::result::Result<T, CaptionError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
