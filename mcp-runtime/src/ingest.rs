use docbridge_core::error::ValidationError;
use docbridge_core::search::normalize_jurisdiction;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::Runtime;
use crate::handle::ProvisioningError;
use crate::upstream::UpstreamError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub file_id: String,
    pub vector_store_id: String,
    pub filename: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    #[error("file upload failed: {0}")]
    Upload(#[source] UpstreamError),
    #[error("uploaded file {file_id} could not be attached to the vector store: {source}")]
    Attach {
        file_id: String,
        #[source]
        source: UpstreamError,
    },
}

impl IngestError {
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            IngestError::Upload(err) => Some(err),
            IngestError::Attach { source, .. } => Some(source),
            IngestError::Provisioning(err) => err.upstream(),
            IngestError::Validation(_) => None,
        }
    }
}

/// Strip any client-side directory components; browsers and curl differ here.
fn clean_filename(raw: &str) -> Result<String, ValidationError> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError::new("file", "uploaded file must have a filename"));
    }
    Ok(name)
}

impl Runtime {
    /// Upload a document and attach it to the deployment's vector store.
    pub async fn ingest(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        jurisdiction: Option<&str>,
    ) -> Result<IngestReceipt, IngestError> {
        let filename = clean_filename(filename)?;
        if bytes.is_empty() {
            return Err(ValidationError::new("file", "uploaded file is empty").into());
        }
        let jurisdiction = match jurisdiction {
            Some(raw) => normalize_jurisdiction(raw)?,
            None => None,
        };

        let handle = self.handles.get_or_create().await?;
        let size = bytes.len();

        let file = self
            .api
            .upload_file(&filename, bytes)
            .await
            .map_err(IngestError::Upload)?;

        let mut attributes = Map::new();
        attributes.insert("filename".to_string(), Value::String(filename.clone()));
        if let Some(jurisdiction) = &jurisdiction {
            attributes.insert(
                "jurisdiction".to_string(),
                Value::String(jurisdiction.clone()),
            );
        }
        self.api
            .attach_file(&handle.id, &file.id, attributes)
            .await
            .map_err(|source| IngestError::Attach {
                file_id: file.id.clone(),
                source,
            })?;

        tracing::info!(
            event = "document_ingested",
            file_id = %file.id,
            vector_store_id = %handle.id,
            filename = %filename,
            jurisdiction = ?jurisdiction,
            bytes = size,
            "Document uploaded and attached"
        );

        Ok(IngestReceipt {
            file_id: file.id,
            vector_store_id: handle.id,
            filename,
        })
    }
}
