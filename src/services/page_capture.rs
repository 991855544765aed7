//! Full-page snapshot capture for TMarks.
//!
//! The capture itself happens in the browser tab (`CAPTURE_PAGE_V2`
//! message); this module wraps that collaborator with a hard timeout and
//! prepares the captured page for `createSnapshotV2`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::debug;

use crate::types::capture::{CaptureOptions, CaptureRequest, CaptureResponse, CapturedPage};
use crate::types::errors::CaptureError;
use crate::types::remote::{SnapshotImage, SnapshotPayload};

/// Upper bound on a capture, independent of the script's own timeout.
pub const CAPTURE_HARD_TIMEOUT: Duration = Duration::from_secs(35);

/// Content-capture collaborator.
#[async_trait]
pub trait PageCapturer: Send + Sync {
    async fn capture(&self, url: &str, request: &CaptureRequest) -> Result<CaptureResponse, CaptureError>;
}

/// Sends a `CAPTURE_PAGE_V2` request and waits at most `hard_timeout`.
pub async fn capture_page(
    capturer: &dyn PageCapturer,
    url: &str,
    options: CaptureOptions,
    hard_timeout: Duration,
) -> Result<CapturedPage, CaptureError> {
    let request = CaptureRequest::page_v2(options);
    let response = tokio::time::timeout(hard_timeout, capturer.capture(url, &request))
        .await
        .map_err(|_| CaptureError::Timeout(hard_timeout.as_secs()))??;

    if !response.success {
        return Err(CaptureError::Failed(
            response.error.unwrap_or_else(|| "unknown capture error".to_string()),
        ));
    }
    response
        .data
        .ok_or_else(|| CaptureError::Failed("capture returned no data".to_string()))
}

/// Decoded size of an image payload, `None` when it is not valid base64.
/// A `data:<mime>;base64,` prefix is accepted.
pub fn decoded_image_size(data: &str) -> Option<usize> {
    let encoded = match data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => data,
    };
    BASE64.decode(encoded.trim()).ok().map(|bytes| bytes.len())
}

/// Drops images larger than `max_size` bytes once decoded, and images whose
/// payload cannot be decoded.
pub fn filter_images(images: Vec<SnapshotImage>, max_size: usize) -> Vec<SnapshotImage> {
    images
        .into_iter()
        .filter(|image| match decoded_image_size(&image.data) {
            Some(size) if size <= max_size => true,
            Some(size) => {
                debug!(hash = %image.hash, size, max_size, "dropping oversized snapshot image");
                false
            }
            None => {
                debug!(hash = %image.hash, "dropping undecodable snapshot image");
                false
            }
        })
        .collect()
}

pub fn build_snapshot_payload(
    page: CapturedPage,
    title: &str,
    url: &str,
    max_image_size: usize,
) -> SnapshotPayload {
    SnapshotPayload {
        html_content: page.html,
        title: title.to_string(),
        url: url.to_string(),
        images: filter_images(page.images, max_image_size),
    }
}

/// Capturer for a page the extension already captured and sent along.
pub struct PrecapturedPage {
    page: CapturedPage,
}

impl PrecapturedPage {
    pub fn new(page: CapturedPage) -> Self {
        Self { page }
    }
}

#[async_trait]
impl PageCapturer for PrecapturedPage {
    async fn capture(&self, _url: &str, _request: &CaptureRequest) -> Result<CaptureResponse, CaptureError> {
        Ok(CaptureResponse {
            success: true,
            data: Some(self.page.clone()),
            error: None,
        })
    }
}
