//! Florence Core - Florence-2 image captioning for training datasets.
//!
//! A pretrained Florence-2 model writes a detailed caption for each image, and
//! a cleanup pass turns it into a short comma separated phrase list.
//!
//! ```text
//! Image → Processor (task prompt + pixels) → ONNX generator (beam search)
//!       → decode → strip lead-ins → clean → caption
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use florence_core::{CaptionOptions, Captioner, Config};
//!
//! let config = Config::load()?;
//! let captioner = Captioner::from_config(&config);
//! let image = image::open("./cat.png")?;
//! let caption = captioner.generate_caption(&image, &CaptionOptions::default())?;
//! println!("{caption}");
//! ```

pub mod caption;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod types;

pub use caption::{CaptionOptions, Captioner, ReplacementRules};
pub use config::{Config, GeneratorSource};
pub use error::{CaptionError, CaptionResult, ConfigError, PipelineError, PipelineResult};
pub use model::Device;
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::DatasetCaptioner;
pub use types::CaptionRecord;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
