//! Router fixtures shared by the route tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use docbridge_mcp_runtime::handle::MemoryHandleStore;
use docbridge_mcp_runtime::upstream::{
    FileObject, UpstreamError, VectorStoreApi, VectorStoreFile, classify_rejection,
};
use docbridge_mcp_runtime::{Runtime, RuntimeConfig};
use serde_json::{Map, Value, json};

use crate::routes;
use crate::state::AppState;

pub const TEST_MAX_BODY_BYTES: usize = 64 * 1024;

/// Upstream stand-in that counts every call, so tests can assert that a
/// rejected request never reached it.
#[derive(Default)]
pub struct CountingApi {
    calls: AtomicUsize,
    fail_create: AtomicBool,
    attributes: Mutex<Vec<Map<String, Value>>>,
}

impl CountingApi {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn last_attributes(&self) -> Option<Map<String, Value>> {
        self.attributes.lock().unwrap().last().cloned()
    }

    fn hit(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl VectorStoreApi for CountingApi {
    async fn create_vector_store(&self, _name: &str) -> Result<String, UpstreamError> {
        self.hit();
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(classify_rejection(
                503,
                &json!({ "error": { "message": "Service unavailable" } }),
            ));
        }
        Ok("vs_1".to_string())
    }

    async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<FileObject, UpstreamError> {
        self.hit();
        Ok(FileObject {
            id: "file-1".to_string(),
            filename: Some(filename.to_string()),
            bytes: Some(bytes.len() as u64),
            ..Default::default()
        })
    }

    async fn attach_file(
        &self,
        _store_id: &str,
        _file_id: &str,
        attributes: Map<String, Value>,
    ) -> Result<(), UpstreamError> {
        self.hit();
        self.attributes.lock().unwrap().push(attributes);
        Ok(())
    }

    async fn list_store_files(
        &self,
        _store_id: &str,
    ) -> Result<Vec<VectorStoreFile>, UpstreamError> {
        self.hit();
        Ok(Vec::new())
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, UpstreamError> {
        self.hit();
        Ok(FileObject {
            id: file_id.to_string(),
            ..Default::default()
        })
    }

    async fn create_response(&self, _payload: Value) -> Result<Value, UpstreamError> {
        self.hit();
        Ok(json!({
            "id": "resp_1",
            "output_text": "Section 4.2 of Town Code.pdf sets a 10 ft setback.\n```json\n[{\"filename\":\"Town Code.pdf\",\"section\":\"4.2\",\"snippet\":\"10 ft setback\"}]\n```"
        }))
    }
}

pub fn test_state(token: Option<&str>, api: Arc<CountingApi>) -> AppState {
    AppState {
        runtime: Runtime::new(
            api,
            Arc::new(MemoryHandleStore::default()),
            RuntimeConfig {
                model: "gpt-test".to_string(),
                store_name: "test-store".to_string(),
                include_raw_text_on_empty: true,
            },
        ),
        auth_token: token.map(Arc::from),
        sse_heartbeat: Duration::from_millis(50),
    }
}

pub fn test_app(token: Option<&str>) -> (Router, Arc<CountingApi>) {
    let api = Arc::new(CountingApi::default());
    let app = routes::build(test_state(token, api.clone()), TEST_MAX_BODY_BYTES);
    (app, api)
}

/// Hand-built multipart/form-data body: plain fields first, then the file part.
pub fn multipart_body(
    boundary: &str,
    fields: &[(&str, Option<&str>, &[u8])],
    file: Option<(&str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();
    let mut part = |name: &str, filename: Option<&str>, data: &[u8]| {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    };

    for (name, filename, data) in fields {
        part(name, *filename, data);
    }
    if let Some((name, filename, data)) = file {
        part(name, Some(filename), data);
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
