use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The remote vector store all documents are attached to.
///
/// One handle per deployment; once persisted it is reused until the state
/// file is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoreHandle {
    /// Opaque identifier assigned by the upstream service
    pub id: String,
    /// Display name the store was created with
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl StoreHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Some(Utc::now()),
        }
    }

    /// A handle without an id cannot address anything upstream.
    pub fn is_usable(&self) -> bool {
        !self.id.trim().is_empty()
    }
}
