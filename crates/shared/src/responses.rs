//! Response bodies returned by the engine.

use serde::{Deserialize, Serialize};

/// Successful body of `POST /api/transmute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmuteResponse {
    pub result_url: String,
    /// Display number shown alongside the finished piece
    pub transmission_number: u32,
    pub mode: String,
    pub source_image_count: usize,
}

// =============================================================================
// Errors
// =============================================================================

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request was rejected before reaching any backend
    InvalidRequest,
    /// Backend answered with an error status
    UpstreamRejected,
    /// Backend answered 429
    RateLimited,
    /// Backend reported the job as failed
    GenerationFailed,
    /// Client-side polling ceiling reached
    GenerationTimedOut,
    Internal,

    /// Unknown variant for forward compatibility
    #[serde(other)]
    Unknown,
}

/// Error body returned with every non-2xx status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

/// Body of `GET /api/health/backend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealthResponse {
    pub backend: String,
    pub healthy: bool,
}
