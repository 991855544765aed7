use serde::{Deserialize, Serialize};

use super::remote::SnapshotImage;

pub const CAPTURE_PAGE_V2: &str = "CAPTURE_PAGE_V2";

/// Options forwarded to the in-page capture script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    #[serde(rename = "inlineCSS")]
    pub inline_css: bool,
    pub extract_images: bool,
    pub inline_fonts: bool,
    pub remove_scripts: bool,
    pub remove_hidden_elements: bool,
    /// Bytes; larger images are dropped before upload.
    pub max_image_size: usize,
    /// Milliseconds the capture script may spend.
    pub timeout: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            inline_css: true,
            extract_images: true,
            inline_fonts: false,
            remove_scripts: true,
            remove_hidden_elements: false,
            max_image_size: 5 * 1024 * 1024,
            timeout: 30_000,
        }
    }
}

/// Message sent to the content-capture collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub options: CaptureOptions,
}

impl CaptureRequest {
    pub fn page_v2(options: CaptureOptions) -> Self {
        Self {
            kind: CAPTURE_PAGE_V2.to_string(),
            options,
        }
    }
}

/// Captured page content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CapturedPage {
    pub html: String,
    #[serde(default)]
    pub images: Vec<SnapshotImage>,
}

/// Reply of the content-capture collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CapturedPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
