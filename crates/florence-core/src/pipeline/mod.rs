//! Dataset captioning pipeline.
//!
//! - **discovery**: find the images of a dataset folder
//! - **validate**: size and magic-byte checks before decoding
//! - **decode**: decode off the runtime with a timeout
//! - **sidecar**: caption files next to images
//! - **processor**: runs one image through all of the above

pub mod decode;
pub mod discovery;
pub mod processor;
pub mod sidecar;
pub mod validate;

pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::FileDiscovery;
pub use processor::DatasetCaptioner;
pub use sidecar::SidecarWriter;
pub use validate::Validator;
