//! Records produced by dataset captioning.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The result of captioning one dataset image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    /// Path to the source image
    pub file_path: PathBuf,

    /// Just the filename portion
    pub file_name: String,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Detected format ("jpeg", "png", "webp", etc.)
    pub format: String,

    /// Cleaned caption, possibly empty
    pub caption: String,

    /// Caption file written for this image, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path_omitted_when_absent() {
        let record = CaptionRecord {
            file_path: PathBuf::from("/data/a.png"),
            file_name: "a.png".to_string(),
            width: 640,
            height: 480,
            format: "png".to_string(),
            caption: "a cat, a hat".to_string(),
            sidecar_path: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"caption\":\"a cat, a hat\""));
        assert!(!json.contains("sidecar_path"));
    }
}
