//! ONNX Runtime session over an exported Florence-2 generation graph.
//!
//! The graph wraps the vision encoder, the text encoder/decoder and the beam
//! search loop in a single model, so generation is one `run` call. The session
//! only feeds the inputs the graph declares and reads back `sequences`.

use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::SessionBuilder;
use ort::session::Session;
use ort::value::{DynValue, Value};

use crate::error::{CaptionError, CaptionResult};

use super::{CaptionModel, Device, ModelInputs};

/// Output holding the generated token ids, `[batch, num_return_sequences, len]`.
const SEQUENCES_OUTPUT: &str = "sequences";

/// Graph inputs generation cannot run without.
const REQUIRED_INPUTS: [&str; 4] = ["pixel_values", "input_ids", "max_length", "num_beams"];

/// One input of the generation graph and how it is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphInput {
    PixelValues,
    InputIds,
    AttentionMask,
    MaxLength,
    MinLength,
    NumBeams,
    NumReturnSequences,
    LengthPenalty,
    RepetitionPenalty,
}

impl GraphInput {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "pixel_values" => Some(Self::PixelValues),
            "input_ids" => Some(Self::InputIds),
            "attention_mask" => Some(Self::AttentionMask),
            "max_length" => Some(Self::MaxLength),
            "min_length" => Some(Self::MinLength),
            "num_beams" => Some(Self::NumBeams),
            "num_return_sequences" => Some(Self::NumReturnSequences),
            "length_penalty" => Some(Self::LengthPenalty),
            "repetition_penalty" => Some(Self::RepetitionPenalty),
            _ => None,
        }
    }
}

/// Map declared input names onto the values this session knows how to feed.
///
/// Fails if a required input is missing or the graph declares one we cannot fill.
fn plan_inputs(names: &[String]) -> Result<Vec<(String, GraphInput)>, String> {
    let missing: Vec<&str> = REQUIRED_INPUTS
        .into_iter()
        .filter(|required| !names.iter().any(|n| n == required))
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "Generation graph is missing required inputs: {}",
            missing.join(", ")
        ));
    }

    names
        .iter()
        .map(|name| {
            GraphInput::from_name(name)
                .map(|input| (name.clone(), input))
                .ok_or_else(|| format!("Generation graph declares unsupported input {name:?}"))
        })
        .collect()
}

/// Take the best sequence out of a `sequences` tensor.
///
/// Accepts `[batch, len]` and `[batch, num_return_sequences, len]`; the first
/// row is the top beam of the first image.
fn first_sequence(shape: &[i64], data: &[i32]) -> CaptionResult<Vec<u32>> {
    let len = match shape {
        [_, len] | [_, _, len] => *len as usize,
        _ => {
            return Err(CaptionError::Generation {
                message: format!("Unexpected sequences shape: {shape:?}"),
            })
        }
    };

    if data.len() < len {
        return Err(CaptionError::Generation {
            message: format!(
                "sequences tensor holds {} values, expected at least {len}",
                data.len()
            ),
        });
    }

    data[..len]
        .iter()
        .map(|&id| {
            u32::try_from(id).map_err(|_| CaptionError::Generation {
                message: format!("Negative token id {id} in sequences"),
            })
        })
        .collect()
}

/// Decoder length bound for `max_new_tokens` generated tokens.
///
/// The graph's `max_length` counts the decoder start token, so one slot is
/// added on top of the requested token budget.
fn max_length_for(max_new_tokens: usize) -> CaptionResult<i32> {
    max_new_tokens
        .checked_add(1)
        .and_then(|len| i32::try_from(len).ok())
        .ok_or_else(|| CaptionError::Generation {
            message: format!("max_new_tokens {max_new_tokens} out of range"),
        })
}

/// Florence-2 generator backed by an ONNX Runtime session.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct OnnxGenerator {
    session: Mutex<Session>,
    inputs: Vec<(String, GraphInput)>,
}

impl OnnxGenerator {
    /// Load the generation graph onto `device`.
    pub fn load(model_path: &Path, device: &Device) -> CaptionResult<Self> {
        let load_error = |message: String| CaptionError::ModelLoad {
            model: model_path.display().to_string(),
            message,
        };

        let builder = Session::builder()
            .map_err(|e| load_error(format!("Failed to create ONNX session builder: {e}")))?;
        let mut builder = with_device(builder, device)?;
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| load_error(format!("Failed to load ONNX model: {e}")))?;

        let names: Vec<String> = session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        let inputs = plan_inputs(&names).map_err(load_error)?;

        tracing::debug!(
            "Loaded generation graph from {:?} on {} (inputs: {:?}, outputs: {:?})",
            model_path,
            device,
            names,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            inputs,
        })
    }

    fn build_inputs(
        &self,
        inputs: &ModelInputs,
        num_beams: i32,
        max_length: i32,
    ) -> CaptionResult<Vec<(String, DynValue)>> {
        let seq_len = inputs.input_ids.len() as i64;
        let token_ids: Vec<i32> = inputs
            .input_ids
            .iter()
            .map(|&id| {
                i32::try_from(id).map_err(|_| CaptionError::Preprocess {
                    message: format!("Token id {id} does not fit the graph's int32 input"),
                })
            })
            .collect::<CaptionResult<_>>()?;

        self.inputs
            .iter()
            .map(|(name, input)| {
                let value = match input {
                    GraphInput::PixelValues => {
                        // Pass (shape, flat data) to avoid tying ort to our ndarray version.
                        let shape: Vec<i64> = inputs
                            .pixel_values
                            .shape()
                            .iter()
                            .map(|&d| d as i64)
                            .collect();
                        let flat: Vec<f32> = inputs.pixel_values.iter().copied().collect();
                        tensor((shape, flat))
                    }
                    GraphInput::InputIds => tensor((vec![1, seq_len], token_ids.clone())),
                    GraphInput::AttentionMask => {
                        tensor((vec![1, seq_len], vec![1i32; seq_len as usize]))
                    }
                    GraphInput::MaxLength => tensor((vec![1i64], vec![max_length])),
                    GraphInput::MinLength => tensor((vec![1i64], vec![1i32])),
                    GraphInput::NumBeams => tensor((vec![1i64], vec![num_beams])),
                    GraphInput::NumReturnSequences => tensor((vec![1i64], vec![1i32])),
                    GraphInput::LengthPenalty | GraphInput::RepetitionPenalty => {
                        tensor((vec![1i64], vec![1.0f32]))
                    }
                }?;
                Ok((name.clone(), value))
            })
            .collect()
    }
}

impl CaptionModel for OnnxGenerator {
    fn generate(
        &self,
        inputs: &ModelInputs,
        num_beams: usize,
        max_new_tokens: usize,
    ) -> CaptionResult<Vec<u32>> {
        let num_beams = i32::try_from(num_beams).map_err(|_| CaptionError::Generation {
            message: format!("num_beams {num_beams} out of range"),
        })?;
        let max_length = max_length_for(max_new_tokens)?;

        let values = self.build_inputs(inputs, num_beams, max_length)?;

        let mut session = self.session.lock().map_err(|e| CaptionError::Generation {
            message: format!("Session lock poisoned: {e}"),
        })?;

        let start = std::time::Instant::now();
        let outputs = session.run(values).map_err(|e| CaptionError::Generation {
            message: format!("ONNX inference failed: {e}"),
        })?;

        let sequences = outputs
            .iter()
            .find(|(name, _)| *name == SEQUENCES_OUTPUT)
            .ok_or_else(|| CaptionError::Generation {
                message: format!("Model did not produce {SEQUENCES_OUTPUT}"),
            })?;

        let (shape, data) =
            sequences
                .1
                .try_extract_tensor::<i32>()
                .map_err(|e| CaptionError::Generation {
                    message: format!("Failed to extract {SEQUENCES_OUTPUT} tensor: {e}"),
                })?;

        let tokens = first_sequence(shape, data)?;
        tracing::trace!(
            "Generated {} tokens in {:?} (beams: {})",
            tokens.len(),
            start.elapsed(),
            num_beams
        );
        Ok(tokens)
    }
}

fn tensor<T>(array: (Vec<i64>, Vec<T>)) -> CaptionResult<DynValue>
where
    T: ort::value::PrimitiveTensorElementType + std::fmt::Debug + Clone + 'static,
{
    Value::from_array(array)
        .map(|value| value.into_dyn())
        .map_err(|e| CaptionError::Preprocess {
            message: format!("Failed to create input tensor: {e}"),
        })
}

/// Register the execution provider for `device`.
///
/// CUDA registration errors out instead of silently falling back to CPU.
fn with_device(builder: SessionBuilder, device: &Device) -> CaptionResult<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        #[cfg(feature = "cuda")]
        Device::Cuda(ordinal) => {
            let provider = ort::execution_providers::CUDAExecutionProvider::default()
                .with_device_id(*ordinal)
                .build()
                .error_on_failure();
            builder
                .with_execution_providers([provider])
                .map_err(|e| CaptionError::Device {
                    device: device.to_string(),
                    message: format!("Failed to register CUDA execution provider: {e}"),
                })
        }
        #[cfg(not(feature = "cuda"))]
        Device::Cuda(_) => Err(CaptionError::Device {
            device: device.to_string(),
            message: "built without the `cuda` feature; use --device cpu".to_string(),
        }),
    }
}
