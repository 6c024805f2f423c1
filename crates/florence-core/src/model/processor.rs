//! Florence-2 processor: prompt tokenization, image tensors, and output parsing.

use std::collections::HashMap;
use std::path::Path;

use image::DynamicImage;
use tokenizers::Tokenizer;

use crate::error::{CaptionError, CaptionResult};

use super::preprocess::preprocess;
use super::{CaptionProcessor, ModelInputs, Task};

/// Special tokens stripped from pure-text task output.
const PURE_TEXT_STRIP: [&str; 3] = ["<s>", "</s>", "<pad>"];

/// Tokenizer plus image preprocessing for Florence-2.
pub struct FlorenceProcessor {
    tokenizer: Tokenizer,
    image_size: u32,
}

impl FlorenceProcessor {
    pub fn new(tokenizer: Tokenizer, image_size: u32) -> Self {
        Self {
            tokenizer,
            image_size,
        }
    }

    /// Load the processor from a `tokenizer.json`.
    pub fn from_file(tokenizer_path: &Path, image_size: u32) -> CaptionResult<Self> {
        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| CaptionError::ModelLoad {
                model: tokenizer_path.display().to_string(),
                message: format!("Failed to load tokenizer: {e}"),
            })?;
        Ok(Self::new(tokenizer, image_size))
    }

    /// Expand a task tag into its prompt; other text is passed through.
    pub fn construct_prompt(text: &str) -> &str {
        Task::from_tag(text).map(|task| task.prompt()).unwrap_or(text)
    }
}

impl CaptionProcessor for FlorenceProcessor {
    fn encode(&self, text: &str, image: &DynamicImage) -> CaptionResult<ModelInputs> {
        let prompt = Self::construct_prompt(text);
        let encoding =
            self.tokenizer
                .encode(prompt, true)
                .map_err(|e| CaptionError::Preprocess {
                    message: format!("Tokenization failed: {e}"),
                })?;
        let input_ids = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let pixel_values = preprocess(image, self.image_size)?;

        tracing::trace!("Encoded prompt {:?} into {} tokens", prompt, encoding.len());

        Ok(ModelInputs {
            input_ids,
            pixel_values,
        })
    }

    fn decode(&self, tokens: &[u32]) -> CaptionResult<String> {
        self.tokenizer
            .decode(tokens, false)
            .map_err(|e| CaptionError::Decode {
                message: format!("Token decode failed: {e}"),
            })
    }

    fn post_process(
        &self,
        text: &str,
        task: &str,
        image_size: (u32, u32),
    ) -> CaptionResult<HashMap<String, String>> {
        // Caption and OCR tasks carry no coordinates, so the size is unused here.
        let _ = image_size;
        let mut parsed = HashMap::new();
        parsed.insert(task.to_string(), parse_pure_text(text));
        Ok(parsed)
    }
}

/// Strip sequence markers from decoded text.
pub fn parse_pure_text(text: &str) -> String {
    PURE_TEXT_STRIP
        .iter()
        .fold(text.to_string(), |acc, token| acc.replace(token, ""))
        .trim()
        .to_string()
}
