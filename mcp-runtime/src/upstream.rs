//! Outbound calls to the OpenAI-compatible files / vector-store / responses API.
//!
//! Everything the runtime needs from upstream goes through [`VectorStoreApi`],
//! so the dispatcher, the handle cache and the search client can be exercised
//! against in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::util::{client, parse_response_body};

/// Error codes the upstream uses when a request names a field it does not know.
const UNSUPPORTED_PARAMETER_CODES: [&str; 3] =
    ["unknown_parameter", "unsupported_parameter", "unrecognized_parameter"];

/// Message fragments seen on the same class of rejection when no code is sent.
const UNSUPPORTED_PARAMETER_HINTS: [&str; 4] = [
    "unknown parameter",
    "unsupported parameter",
    "unrecognized request argument",
    "unrecognized parameter",
];

const LIST_PAGE_SIZE: u32 = 100;
const LIST_MAX_PAGES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    ErrorCode,
    MessageHeuristic,
}

/// Why the upstream turned a request down, as far as the caller cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    UnsupportedParameter {
        param: Option<String>,
        detected_by: Detection,
    },
    Other,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {message}")]
    Transport { message: String, timed_out: bool },
    #[error("upstream returned HTTP {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
        reason: RejectionReason,
    },
    #[error("upstream response could not be decoded: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            UpstreamError::Status { code, .. } => code.as_deref(),
            UpstreamError::Transport { timed_out: true, .. } => Some("timeout"),
            _ => None,
        }
    }

    pub fn reason(&self) -> &RejectionReason {
        match self {
            UpstreamError::Status { reason, .. } => reason,
            _ => &RejectionReason::Other,
        }
    }

    pub fn upstream_message(&self) -> String {
        match self {
            UpstreamError::Transport { message, .. } => message.clone(),
            UpstreamError::Status { message, .. } => message.clone(),
            UpstreamError::Decode(message) => message.clone(),
        }
    }

    /// Diagnostics attached to JSON-RPC and REST error payloads.
    pub fn to_value(&self) -> Value {
        json!({
            "status": self.status(),
            "code": self.code(),
            "upstream_message": self.upstream_message(),
        })
    }
}

/// Turn a non-2xx upstream reply into a typed error.
pub fn classify_rejection(status: u16, body: &Value) -> UpstreamError {
    let error = body.get("error").unwrap_or(body);
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    let param = error
        .get("param")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .or_else(|| body.as_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| format!("HTTP {status}"));

    let reason = if !(400..500).contains(&status) {
        RejectionReason::Other
    } else if code
        .as_deref()
        .is_some_and(|code| UNSUPPORTED_PARAMETER_CODES.contains(&code))
    {
        RejectionReason::UnsupportedParameter {
            param,
            detected_by: Detection::ErrorCode,
        }
    } else {
        let lowered = message.to_ascii_lowercase();
        if UNSUPPORTED_PARAMETER_HINTS
            .iter()
            .any(|hint| lowered.contains(hint))
        {
            RejectionReason::UnsupportedParameter {
                param,
                detected_by: Detection::MessageHeuristic,
            }
        } else {
            RejectionReason::Other
        }
    };

    UpstreamError::Status {
        status,
        code,
        message,
        reason,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// A file attached to a vector store. `id` is the underlying file id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub usage_bytes: Option<u64>,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

impl VectorStoreFile {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.as_ref()?.get(key)?.as_str()
    }
}

#[async_trait]
pub trait VectorStoreApi: Send + Sync {
    /// Returns the new store's id.
    async fn create_vector_store(&self, name: &str) -> Result<String, UpstreamError>;

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>)
    -> Result<FileObject, UpstreamError>;

    async fn attach_file(
        &self,
        store_id: &str,
        file_id: &str,
        attributes: Map<String, Value>,
    ) -> Result<(), UpstreamError>;

    async fn list_store_files(&self, store_id: &str)
    -> Result<Vec<VectorStoreFile>, UpstreamError>;

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, UpstreamError>;

    /// POST a raw payload to the responses endpoint and return the body.
    async fn create_response(&self, payload: Value) -> Result<Value, UpstreamError>;
}

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = client(timeout).map_err(|e| UpstreamError::Transport {
            message: format!("Failed to build HTTP client: {e}"),
            timed_out: false,
        })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, UpstreamError> {
        let response = request.send().await.map_err(|e| UpstreamError::Transport {
            message: format!("Failed to reach upstream at {}: {e}", self.base_url),
            timed_out: e.is_timeout(),
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| UpstreamError::Transport {
            message: format!("Failed to read upstream response body: {e}"),
            timed_out: e.is_timeout(),
        })?;
        let body = parse_response_body(&bytes);

        if !(200..=299).contains(&status) {
            return Err(classify_rejection(status, &body));
        }
        Ok(body)
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value, what: &str) -> Result<T, UpstreamError> {
    serde_json::from_value(body).map_err(|e| UpstreamError::Decode(format!("{what}: {e}")))
}

#[async_trait]
impl VectorStoreApi for OpenAiClient {
    async fn create_vector_store(&self, name: &str) -> Result<String, UpstreamError> {
        let body = self
            .send(
                self.request(Method::POST, "/vector_stores")
                    .json(&json!({ "name": name })),
            )
            .await?;
        body.get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| UpstreamError::Decode("vector store response has no id".to_string()))
    }

    async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<FileObject, UpstreamError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);
        let body = self
            .send(self.request(Method::POST, "/files").multipart(form))
            .await?;
        decode(body, "file upload response")
    }

    async fn attach_file(
        &self,
        store_id: &str,
        file_id: &str,
        attributes: Map<String, Value>,
    ) -> Result<(), UpstreamError> {
        let mut payload = json!({ "file_id": file_id });
        if !attributes.is_empty() {
            payload["attributes"] = Value::Object(attributes);
        }
        self.send(
            self.request(Method::POST, &format!("/vector_stores/{store_id}/files"))
                .json(&payload),
        )
        .await?;
        Ok(())
    }

    async fn list_store_files(
        &self,
        store_id: &str,
    ) -> Result<Vec<VectorStoreFile>, UpstreamError> {
        let mut files = Vec::new();
        let mut after: Option<String> = None;

        for _ in 0..LIST_MAX_PAGES {
            let mut query = vec![("limit", LIST_PAGE_SIZE.to_string())];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }
            let body = self
                .send(
                    self.request(Method::GET, &format!("/vector_stores/{store_id}/files"))
                        .query(&query),
                )
                .await?;

            let page: Vec<VectorStoreFile> = decode(
                body.get("data").cloned().unwrap_or(Value::Array(Vec::new())),
                "vector store file list",
            )?;
            let has_more = body
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            after = page.last().map(|file| file.id.clone());
            files.extend(page);

            if !has_more || after.is_none() {
                break;
            }
        }

        Ok(files)
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, UpstreamError> {
        let body = self
            .send(self.request(Method::GET, &format!("/files/{file_id}")))
            .await?;
        decode(body, "file metadata")
    }

    async fn create_response(&self, payload: Value) -> Result<Value, UpstreamError> {
        self.send(self.request(Method::POST, "/responses").json(&payload))
            .await
    }
}
