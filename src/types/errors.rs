use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// === StoreError ===

/// Errors raised by the local SQLite cache.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Database operation failed.
    #[error("Local store database error: {0}")]
    Database(String),
    /// Failed to serialize or deserialize a stored payload.
    #[error("Local store serialization error: {0}")]
    Serialization(String),
    /// Requested record does not exist.
    #[error("Local record not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

// === AiError ===

/// Classified failure of an AI provider call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AiError {
    /// The provider could not be reached.
    #[error("AI network error: {0}")]
    Network(String),
    /// The provider rejected the credentials (HTTP 401/403).
    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),
    /// The provider rate-limited the request (HTTP 429).
    #[error("AI rate limited: {0}")]
    RateLimit(String),
    /// Malformed response or any other provider failure.
    #[error("{provider} service error: {message}")]
    Service { provider: String, message: String },
    /// The attempt exceeded its time budget.
    #[error("AI request timed out after {0} ms")]
    Timeout(u64),
}

impl AiError {
    pub fn service(provider: &str, message: impl Into<String>) -> Self {
        AiError::Service {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

// === AdapterError ===

/// Raw failure emitted by a vendor adapter before classification.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    /// Already classified upstream; passed through unchanged.
    #[error("{0}")]
    Classified(AiError),
    /// Connection, DNS or TLS failure.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Non-2xx HTTP response.
    #[error("{message}")]
    Status { status: u16, message: String },
    /// Any other adapter failure (missing content, bad endpoint).
    #[error("{0}")]
    Other(String),
}

// === ApiError ===

/// Error surfaced by the remote TMarks API.
///
/// `status == Some(0)` marks a transport-level failure (no HTTP response).
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub code: Option<String>,
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(message: impl Into<String>, code: Option<&str>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            code: code.map(str::to_string),
            status,
        }
    }

    /// Transport failure with no HTTP response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(message, Some("NETWORK_ERROR"), Some(0))
    }
}

// === SyncError ===

/// Errors surfaced by the bookmark and tab-group sync services.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid user input.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Credentials missing, invalid or lacking permission. Never queued.
    #[error("Authentication error: {0}")]
    Auth(ApiError),
    /// Remote failure that is neither auth nor network, or a network failure
    /// in a mode that cannot be queued.
    #[error("Remote error: {0}")]
    Remote(ApiError),
    /// Local cache failure.
    #[error(transparent)]
    Storage(#[from] StoreError),
    /// Snapshot capture failure, surfaced only by explicit capture calls.
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

// === CaptureError ===

/// Errors related to full-page snapshot capture.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    /// The capture collaborator did not answer in time.
    #[error("Page capture timed out after {0} s")]
    Timeout(u64),
    /// The capture collaborator reported a failure.
    #[error("Page capture failed: {0}")]
    Failed(String),
    /// No capture collaborator is available for this page.
    #[error("Page capture unavailable")]
    Unavailable,
}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    #[error("Settings I/O error: {0}")]
    IoError(String),
    /// Failed to serialize or deserialize settings.
    #[error("Settings serialization error: {0}")]
    SerializationError(String),
    /// The provided settings key is invalid.
    #[error("Invalid settings key: {0}")]
    InvalidKey(String),
    /// The provided settings value is invalid.
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}

// === VaultError ===

/// Errors related to encrypted API key storage.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Failed to derive encryption key.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    /// Encryption operation failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),
    /// Decryption operation failed.
    #[error("Decryption failed: {0}")]
    Decryption(String),
    /// Failed to read or write the credentials table.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

// === FailureClass ===

/// Persistence-relevant classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Auth,
    Network,
    Other,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Auth => write!(f, "auth"),
            FailureClass::Network => write!(f, "network"),
            FailureClass::Other => write!(f, "other"),
        }
    }
}
