use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ingest", post(ingest_document))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub ok: bool,
    pub file_id: String,
    pub vector_store_id: String,
    pub filename: String,
}

/// Shape of the multipart form, for the OpenAPI document only.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct IngestForm {
    /// The document to index
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// One of federal, state, county, municipal
    pub jurisdiction: Option<String>,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status().is_server_error() {
        return AppError::Internal(format!("reading multipart body: {}", err.body_text()));
    }
    AppError::Validation {
        message: format!("Malformed multipart body: {}", err.body_text()),
        field: None,
        received: None,
        docs_hint: Some(
            "POST multipart/form-data with a 'file' part and an optional 'jurisdiction' field."
                .to_string(),
        ),
    }
}

/// Upload a document and attach it to the deployment's vector store
#[utoipa::path(
    post,
    path = "/ingest",
    request_body(content = IngestForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Document uploaded and attached", body = IngestResponse),
        (status = 400, description = "Missing file or invalid jurisdiction", body = docbridge_core::error::ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = docbridge_core::error::ApiError),
        (status = 502, description = "Vector store or upstream API failure", body = docbridge_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "ingest"
)]
pub async fn ingest_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let mut multipart = multipart.map_err(|rejection| AppError::Validation {
        message: rejection.body_text(),
        field: None,
        received: None,
        docs_hint: Some("Send the document as multipart/form-data.".to_string()),
    })?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut jurisdiction: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(ToOwned::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("jurisdiction") => {
                jurisdiction = Some(field.text().await.map_err(multipart_error)?);
            }
            other => {
                tracing::debug!(
                    event = "ingest_field_ignored",
                    field = ?other,
                    "Ignoring unknown multipart field"
                );
            }
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(AppError::validation(
            "file",
            "multipart body must include a 'file' part",
        ));
    };

    let receipt = state
        .runtime
        .ingest(&filename, bytes, jurisdiction.as_deref())
        .await?;

    Ok(Json(IngestResponse {
        ok: true,
        file_id: receipt.file_id,
        vector_store_id: receipt.vector_store_id,
        filename: receipt.filename,
    }))
}
