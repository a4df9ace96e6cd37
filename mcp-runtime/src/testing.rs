//! In-memory upstream used by the unit tests in this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::handle::MemoryHandleStore;
use crate::upstream::{
    FileObject, UpstreamError, VectorStoreApi, VectorStoreFile, classify_rejection,
};
use crate::{Runtime, RuntimeConfig};

/// Build the same typed error the real client produces for a non-2xx reply.
pub fn rejection(status: u16, code: Option<&str>, message: &str) -> UpstreamError {
    let mut error = json!({ "message": message });
    if let Some(code) = code {
        error["code"] = json!(code);
    }
    classify_rejection(status, &json!({ "error": error }))
}

pub fn runtime_with(api: Arc<FakeApi>) -> Runtime {
    Runtime::new(
        api,
        Arc::new(MemoryHandleStore::default()),
        RuntimeConfig {
            model: "gpt-test".to_string(),
            store_name: "zoning-docs".to_string(),
            include_raw_text_on_empty: true,
        },
    )
}

#[derive(Default)]
pub struct FakeApi {
    create_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    outbound: AtomicUsize,
    create_failure: Mutex<Option<UpstreamError>>,
    attach_failure: Mutex<Option<UpstreamError>>,
    responses: Mutex<VecDeque<Result<Value, UpstreamError>>>,
    response_payloads: Mutex<Vec<Value>>,
    attachments: Mutex<Vec<(String, String, Map<String, Value>)>>,
    store_files: Mutex<Vec<VectorStoreFile>>,
    file_objects: Mutex<Vec<FileObject>>,
}

impl FakeApi {
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn outbound_calls(&self) -> usize {
        self.outbound.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.response_payloads.lock().unwrap().len()
    }

    pub fn response_payloads(&self) -> Vec<Value> {
        self.response_payloads.lock().unwrap().clone()
    }

    pub fn attachments(&self) -> Vec<(String, String, Map<String, Value>)> {
        self.attachments.lock().unwrap().clone()
    }

    pub fn fail_create(&self, status: u16, message: &str) {
        *self.create_failure.lock().unwrap() = Some(rejection(status, None, message));
    }

    pub fn fail_attach(&self, status: u16, message: &str) {
        *self.attach_failure.lock().unwrap() = Some(rejection(status, None, message));
    }

    pub fn push_response(&self, response: Result<Value, UpstreamError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn add_store_file(&self, file: VectorStoreFile) {
        self.store_files.lock().unwrap().push(file);
    }

    pub fn add_file_object(&self, file: FileObject) {
        self.file_objects.lock().unwrap().push(file);
    }

    fn count(&self) {
        self.outbound.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStoreApi for FakeApi {
    async fn create_vector_store(&self, _name: &str) -> Result<String, UpstreamError> {
        self.count();
        if let Some(err) = self.create_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("vs_{n}"))
    }

    async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<FileObject, UpstreamError> {
        self.count();
        let n = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FileObject {
            id: format!("file-{n}"),
            filename: Some(filename.to_string()),
            bytes: Some(bytes.len() as u64),
            purpose: Some("assistants".to_string()),
            created_at: None,
        })
    }

    async fn attach_file(
        &self,
        store_id: &str,
        file_id: &str,
        attributes: Map<String, Value>,
    ) -> Result<(), UpstreamError> {
        self.count();
        if let Some(err) = self.attach_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.attachments.lock().unwrap().push((
            store_id.to_string(),
            file_id.to_string(),
            attributes,
        ));
        Ok(())
    }

    async fn list_store_files(
        &self,
        _store_id: &str,
    ) -> Result<Vec<VectorStoreFile>, UpstreamError> {
        self.count();
        Ok(self.store_files.lock().unwrap().clone())
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, UpstreamError> {
        self.count();
        self.file_objects
            .lock()
            .unwrap()
            .iter()
            .find(|file| file.id == file_id)
            .cloned()
            .ok_or_else(|| rejection(404, None, &format!("No such File object: {file_id}")))
    }

    async fn create_response(&self, payload: Value) -> Result<Value, UpstreamError> {
        self.count();
        self.response_payloads.lock().unwrap().push(payload);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "output_text": "" })))
    }
}
