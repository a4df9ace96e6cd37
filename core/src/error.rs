use serde::Serialize;
use utoipa::ToSchema;

/// Structured error body returned by every non-JSON-RPC endpoint.
/// Carries enough context for a client (or operator) to see what failed
/// and whether retrying makes sense.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "upstream_failed")
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received, or upstream diagnostics (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const PROVISIONING_FAILED: &str = "provisioning_failed";
    pub const UPSTREAM_FAILED: &str = "upstream_failed";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// A request field failed validation. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
