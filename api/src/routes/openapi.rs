use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use crate::ApiDoc;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api-doc/openapi.json", get(openapi_document))
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
