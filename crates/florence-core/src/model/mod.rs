//! Model capability traits and the Florence-2 ONNX backend.
//!
//! The captioning adapter only talks to the traits in this module. Anything that
//! can turn (prompt, image) into tensors, run generation with a beam width, and
//! decode the ids back into text can stand in for the ONNX backend.
//!
//! # Usage
//!
//! ```rust,ignore
//! use florence_core::model::{Device, ModelLoader, OnnxModelLoader};
//!
//! let loader = OnnxModelLoader::from_config(&config);
//! let loaded = loader.load(&Device::Cpu)?;
//! ```

pub(crate) mod device;
pub(crate) mod loader;
pub(crate) mod preprocess;
pub(crate) mod processor;
pub(crate) mod registry;
pub(crate) mod session;

use std::collections::HashMap;

use image::DynamicImage;
use ndarray::Array4;

use crate::error::CaptionResult;

pub use device::Device;
pub use loader::OnnxModelLoader;
pub use preprocess::{preprocess, DEFAULT_IMAGE_SIZE};
pub use processor::FlorenceProcessor;
pub use registry::ModelRegistry;
pub use session::OnnxGenerator;

/// Model-ready inputs built by a processor.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    /// Tokenized prompt, including the BOS/EOS markers
    pub input_ids: Vec<i64>,
    /// NCHW pixel tensor, `[1, 3, H, W]`
    pub pixel_values: Array4<f32>,
}

/// Sequence generator half of a pretrained model.
pub trait CaptionModel: Send + Sync {
    /// Generate output token ids with beam search of width `num_beams`,
    /// producing at most `max_new_tokens` tokens.
    fn generate(
        &self,
        inputs: &ModelInputs,
        num_beams: usize,
        max_new_tokens: usize,
    ) -> CaptionResult<Vec<u32>>;
}

/// Text/image processor half of a pretrained model.
pub trait CaptionProcessor: Send + Sync {
    /// Build model inputs from a prompt (or task tag) and an image.
    fn encode(&self, text: &str, image: &DynamicImage) -> CaptionResult<ModelInputs>;

    /// Decode generated ids. Special tokens are kept in the output.
    fn decode(&self, tokens: &[u32]) -> CaptionResult<String>;

    /// Parse decoded text into a map keyed by task tag.
    ///
    /// `image_size` is the original `(width, height)`, used by tasks that emit
    /// coordinates.
    fn post_process(
        &self,
        text: &str,
        task: &str,
        image_size: (u32, u32),
    ) -> CaptionResult<HashMap<String, String>>;
}

/// A model and its matching processor.
pub struct LoadedModel {
    pub model: Box<dyn CaptionModel>,
    pub processor: Box<dyn CaptionProcessor>,
}

impl LoadedModel {
    pub fn new(model: Box<dyn CaptionModel>, processor: Box<dyn CaptionProcessor>) -> Self {
        Self { model, processor }
    }
}

/// Acquires a model/processor pair for a device.
pub trait ModelLoader: Send + Sync {
    /// Identifier of the model this loader acquires, for logging.
    fn model_id(&self) -> &str;

    /// Fetch (if needed) and load the model onto `device`.
    fn load(&self, device: &Device) -> CaptionResult<LoadedModel>;
}

/// Florence-2 task tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Caption,
    DetailedCaption,
    MoreDetailedCaption,
    Ocr,
}

impl Task {
    pub const ALL: [Task; 4] = [
        Task::Caption,
        Task::DetailedCaption,
        Task::MoreDetailedCaption,
        Task::Ocr,
    ];

    /// The literal marker string for this task.
    pub fn tag(&self) -> &'static str {
        match self {
            Task::Caption => "<CAPTION>",
            Task::DetailedCaption => "<DETAILED_CAPTION>",
            Task::MoreDetailedCaption => "<MORE_DETAILED_CAPTION>",
            Task::Ocr => "<OCR>",
        }
    }

    /// The natural-language prompt the tokenizer actually sees for this tag.
    pub fn prompt(&self) -> &'static str {
        match self {
            Task::Caption => "What does the image describe?",
            Task::DetailedCaption => "Describe in detail what is shown in the image.",
            Task::MoreDetailedCaption => "Describe with a paragraph what is shown in the image.",
            Task::Ocr => "What is the text in the image?",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Task> {
        Task::ALL.into_iter().find(|task| task.tag() == tag)
    }
}
