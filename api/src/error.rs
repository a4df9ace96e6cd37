use axum::Json;
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use docbridge_core::error::{self, ApiError, ValidationError};
use docbridge_mcp_runtime::handle::ProvisioningError;
use docbridge_mcp_runtime::ingest::IngestError;
use docbridge_mcp_runtime::upstream::UpstreamError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or wrong bearer token (401)
    Unauthorized(String),
    /// Store handle could not be loaded or created (502)
    Provisioning(ProvisioningError),
    /// Upstream call failed after provisioning (502)
    Upstream { message: String, source: UpstreamError },
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Unauthorized(description) => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiError {
                        error: error::codes::UNAUTHORIZED.to_string(),
                        message: description.clone(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: Some(
                            "Send 'Authorization: Bearer <token>' with the configured token."
                                .to_string(),
                        ),
                    }),
                )
                    .into_response();
                let challenge = format!(
                    "Bearer realm=\"docbridge\", error=\"invalid_token\", error_description=\"{}\"",
                    description.replace('"', "'")
                );
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    response.headers_mut().insert(WWW_AUTHENTICATE, value);
                }
                return response;
            }
            AppError::Provisioning(err) => {
                tracing::error!(event = "provisioning_failed", error = %err, "Store handle unavailable");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError {
                        error: error::codes::PROVISIONING_FAILED.to_string(),
                        message: err.to_string(),
                        field: None,
                        received: err.upstream().map(UpstreamError::to_value),
                        request_id,
                        docs_hint: Some(
                            "The vector store could not be loaded or created. Retrying is safe."
                                .to_string(),
                        ),
                    },
                )
            }
            AppError::Upstream { message, source } => {
                tracing::error!(
                    event = "upstream_call_failed",
                    status = ?source.status(),
                    error = %source,
                    "{message}"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError {
                        error: error::codes::UPSTREAM_FAILED.to_string(),
                        message: format!("{message}: {source}"),
                        field: None,
                        received: Some(source.to_value()),
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
            received: None,
            docs_hint: None,
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::validation(&err.field, format!("{}: {}", err.field, err.message))
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(err) => err.into(),
            IngestError::Provisioning(err) => AppError::Provisioning(err),
            IngestError::Upload(source) => AppError::Upstream {
                message: "File upload failed".to_string(),
                source,
            },
            IngestError::Attach { file_id, source } => AppError::Upstream {
                message: format!("Uploaded file {file_id} could not be attached"),
                source,
            },
        }
    }
}
