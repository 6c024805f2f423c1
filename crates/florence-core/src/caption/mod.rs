//! Florence-2 image captioning adapter.
//!
//! [`Captioner`] owns a model loader and a device. The model and processor are
//! acquired on first use (or on an explicit [`Captioner::load_model`]) and kept
//! for the life of the captioner.
//!
//! # Usage
//!
//! ```rust,ignore
//! use florence_core::caption::{CaptionOptions, Captioner};
//! use florence_core::config::Config;
//!
//! let config = Config::default();
//! let captioner = Captioner::from_config(&config);
//! let caption = captioner.generate_caption(&image, &CaptionOptions::default())?;
//! ```

pub mod clean;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use image::DynamicImage;

use crate::config::{CaptionConfig, Config};
use crate::error::{CaptionError, CaptionResult};
use crate::model::{Device, LoadedModel, ModelLoader, OnnxModelLoader, Task};

pub use clean::{
    clean_caption, CaptionCleaner, DefaultCleaner, Replacement, ReplacementRules,
    DEFAULT_LONG_PROMPT,
};

/// The task every caption request runs.
pub const CAPTION_TASK: Task = Task::DetailedCaption;

/// Beam width used for generation.
pub const NUM_BEAMS: usize = 3;

/// Default bound on generated tokens.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 1024;

/// Lead-ins the model likes to open detailed captions with.
const BOILERPLATE: [&str; 2] = ["The image shows ", "the image shows "];

/// Per-request caption options.
#[derive(Debug, Clone)]
pub struct CaptionOptions {
    /// Accepted for interface compatibility with prompt-driven captioners.
    /// Florence-2 always runs [`CAPTION_TASK`], so this text is not used.
    pub prompt: String,

    /// Rules handed to the cleaner
    pub replacements: ReplacementRules,

    /// Upper bound on generated tokens
    pub max_new_tokens: usize,
}

impl Default for CaptionOptions {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_LONG_PROMPT.to_string(),
            replacements: ReplacementRules::default(),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }
}

impl CaptionOptions {
    pub fn from_config(config: &CaptionConfig) -> Self {
        Self {
            prompt: config.prompt.clone(),
            replacements: config.replacements.clone(),
            max_new_tokens: config.max_new_tokens,
        }
    }

    pub fn with_replacements(mut self, replacements: ReplacementRules) -> Self {
        self.replacements = replacements;
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }
}

/// Lazily loaded Florence-2 captioner.
///
/// Safe to share across threads. Loading and generation are serialized by one
/// mutex, so concurrent first calls load the model exactly once.
pub struct Captioner {
    loader: Box<dyn ModelLoader>,
    device: Device,
    cleaner: Box<dyn CaptionCleaner>,
    state: Mutex<Option<LoadedModel>>,
}

impl Captioner {
    /// Create an unloaded captioner. Nothing is fetched until first use.
    pub fn new(loader: impl ModelLoader + 'static, device: Device) -> Self {
        Self {
            loader: Box::new(loader),
            device,
            cleaner: Box::new(DefaultCleaner),
            state: Mutex::new(None),
        }
    }

    /// Captioner over the ONNX bundle and device named in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(OnnxModelLoader::from_config(config), config.model.device)
    }

    /// Replace the final cleanup stage.
    pub fn with_cleaner(mut self, cleaner: impl CaptionCleaner + 'static) -> Self {
        self.cleaner = Box::new(cleaner);
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Whether the model and processor are currently held.
    pub fn is_loaded(&self) -> bool {
        self.state().is_some()
    }

    /// Load the model and processor onto the configured device.
    ///
    /// Always performs a full load, replacing any handles already held. If the
    /// load fails the previous handles are kept.
    pub fn load_model(&self) -> CaptionResult<()> {
        let mut state = self.state();
        *state = Some(self.acquire()?);
        Ok(())
    }

    /// Caption `image`, loading the model first if needed.
    pub fn generate_caption(
        &self,
        image: &DynamicImage,
        options: &CaptionOptions,
    ) -> CaptionResult<String> {
        if options.max_new_tokens == 0 {
            return Err(CaptionError::InvalidRequest(
                "max_new_tokens must be > 0".to_string(),
            ));
        }

        let task = CAPTION_TASK.tag();
        let raw = {
            let mut state = self.state();
            let loaded = match &mut *state {
                Some(loaded) => loaded,
                slot => slot.insert(self.acquire()?),
            };

            let start = Instant::now();
            let inputs = loaded.processor.encode(task, image)?;
            let ids = loaded
                .model
                .generate(&inputs, NUM_BEAMS, options.max_new_tokens)?;
            let text = loaded.processor.decode(&ids)?;
            let parsed = loaded
                .processor
                .post_process(&text, task, (image.width(), image.height()))?;
            tracing::trace!("Generated {} tokens in {:?}", ids.len(), start.elapsed());

            parsed.get(task).cloned().unwrap_or_default()
        };

        let caption = strip_boilerplate(&raw);
        Ok(self.cleaner.clean(&caption, &options.replacements))
    }

    fn acquire(&self) -> CaptionResult<LoadedModel> {
        tracing::info!("Loading {} on {}", self.loader.model_id(), self.device);
        let start = Instant::now();
        let loaded = self.loader.load(&self.device)?;
        tracing::info!("Model loaded in {:.1}s", start.elapsed().as_secs_f64());
        Ok(loaded)
    }

    /// The held handles stay valid even if another thread panicked mid-call.
    fn state(&self) -> MutexGuard<'_, Option<LoadedModel>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Remove the "the image shows" lead-in wherever it appears.
pub fn strip_boilerplate(caption: &str) -> String {
    BOILERPLATE
        .iter()
        .fold(caption.to_string(), |acc, phrase| acc.replace(phrase, ""))
}
