//! Document upload: text extraction and task proposal.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
};

use super::routes::AppState;
use super::types::ExtractResponse;
use crate::extract::{self, ExtractError};
use crate::structure::StructureError;

type ApiError = (StatusCode, String);

pub(super) fn extract_status(err: &ExtractError) -> StatusCode {
    match err {
        ExtractError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ExtractError::NoText => StatusCode::UNPROCESSABLE_ENTITY,
        ExtractError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ExtractError::InvalidDataUri(_) | ExtractError::Archive(_) | ExtractError::MissingBody => {
            StatusCode::BAD_REQUEST
        }
    }
}

pub(super) fn structure_status(err: &StructureError) -> StatusCode {
    match err {
        StructureError::NoTasks => StatusCode::UNPROCESSABLE_ENTITY,
        StructureError::Llm(_) | StructureError::Parse(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Run a blocking `.docx` parse off the async workers.
pub(super) async fn extract_off_thread<F>(parse: F) -> Result<String, ExtractError>
where
    F: FnOnce() -> Result<String, ExtractError> + Send + 'static,
{
    tokio::task::spawn_blocking(parse)
        .await
        .map_err(|e| ExtractError::Archive(format!("extraction task failed: {}", e)))?
}

/// `POST /api/documents/extract` with a multipart `file` field.
pub async fn extract(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        upload = Some((content_type, file_name, bytes));
        break;
    }

    let (content_type, file_name, bytes) = upload.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Missing 'file' field".to_string(),
        )
    })?;

    if !extract::is_docx(content_type.as_deref(), file_name.as_deref()) {
        let shown = content_type.or(file_name).unwrap_or_default();
        let err = ExtractError::UnsupportedType(shown);
        return Err((extract_status(&err), err.to_string()));
    }

    tracing::info!(
        file_name = file_name.as_deref().unwrap_or(""),
        bytes = bytes.len(),
        "Extracting uploaded document"
    );

    let limit = state.config.max_document_bytes;
    let text = match extract_off_thread(move || extract::extract_text(&bytes, limit)).await {
        Ok(text) => text,
        Err(ExtractError::NoText) => {
            return Err((StatusCode::UNPROCESSABLE_ENTITY, "no tasks found".to_string()));
        }
        Err(e) => return Err((extract_status(&e), e.to_string())),
    };

    let tasks = state.structurer.structure(&text).await.map_err(|e| {
        tracing::warn!(error = %e, "Task structuring failed");
        (structure_status(&e), e.to_string())
    })?;

    Ok(Json(ExtractResponse { text, tasks }))
}
