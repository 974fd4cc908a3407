//! `POST /api/materialize`: push a task batch into a ClickUp list.
//!
//! Always answers with the two-state envelope. Bad input is a 400; every
//! other failure is reported in the envelope with a 200.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;

use super::auth::AuthUser;
use super::documents::extract_off_thread;
use super::routes::AppState;
use super::types::{MaterializeRequest, MaterializeResponse};
use crate::extract::{self, ExtractError};
use crate::materialize::MaterializeError;
use crate::structure::StructureError;
use crate::task::Task;

const NO_TASKS: &str = "No tasks found in document.";

type Envelope = (StatusCode, Json<MaterializeResponse>);

fn bad_request(error: impl Into<String>) -> Envelope {
    (
        StatusCode::BAD_REQUEST,
        Json(MaterializeResponse::error(error)),
    )
}

fn failed(error: impl Into<String>) -> Envelope {
    (StatusCode::OK, Json(MaterializeResponse::error(error)))
}

pub async fn materialize(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<MaterializeRequest>, JsonRejection>,
) -> Envelope {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let list_id = req.list_id.trim();
    if list_id.is_empty() {
        return bad_request("listId is required.");
    }
    if !is_plain_id(list_id) {
        return bad_request("listId must be a ClickUp list id.");
    }

    let start_date = match req.start_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => return bad_request("startDate must be YYYY-MM-DD."),
        },
    };

    let tasks = match resolve_tasks(&state, req.tasks, req.document_text, req.document_data_uri)
        .await
    {
        Ok(tasks) => tasks,
        Err(envelope) => return envelope,
    };
    if tasks.is_empty() {
        return failed(NO_TASKS);
    }

    match state
        .materializer
        .materialize_for_user(&user.id, &tasks, list_id, start_date)
        .await
    {
        Ok(report) => {
            let created = report.task_ids().len();
            tracing::info!(user_id = %user.id, list_id, tasks = created, "Materialize request done");
            (
                StatusCode::OK,
                Json(MaterializeResponse::success(created_message(created))),
            )
        }
        Err(e) => {
            if let MaterializeError::Write { report, .. } = &e {
                tracing::warn!(
                    user_id = %user.id,
                    created = report.task_ids().len(),
                    "Materialization stopped; created tasks were left in place"
                );
            }
            failed(e.to_string())
        }
    }
}

/// ClickUp list ids are opaque but never contain path or query syntax.
fn is_plain_id(id: &str) -> bool {
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn created_message(count: usize) -> String {
    match count {
        1 => "Created 1 task in ClickUp.".to_string(),
        n => format!("Created {} tasks in ClickUp.", n),
    }
}

/// Reviewed tasks win; otherwise structure the document on the server.
async fn resolve_tasks(
    state: &AppState,
    tasks: Option<Vec<Task>>,
    document_text: Option<String>,
    document_data_uri: Option<String>,
) -> Result<Vec<Task>, Envelope> {
    if let Some(tasks) = tasks {
        return Ok(tasks
            .into_iter()
            .filter(|t| !t.name.trim().is_empty())
            .collect());
    }

    let text = match (document_text, document_data_uri) {
        (Some(text), _) if !text.trim().is_empty() => text,
        (_, Some(uri)) if !uri.trim().is_empty() => {
            let limit = state.config.max_document_bytes;
            match extract_off_thread(move || extract::extract_text_from_data_uri(&uri, limit))
                .await
            {
                Ok(text) => text,
                Err(ExtractError::NoText) => return Err(failed(NO_TASKS)),
                Err(e) => return Err(bad_request(e.to_string())),
            }
        }
        (Some(_), _) => return Err(failed(NO_TASKS)),
        (None, _) => {
            return Err(bad_request(
                "One of tasks, documentText or documentDataUri is required.",
            ))
        }
    };

    match state.structurer.structure(&text).await {
        Ok(tasks) => Ok(tasks),
        Err(StructureError::NoTasks) => Err(failed(NO_TASKS)),
        Err(e) => {
            tracing::error!(error = %e, "Task structuring failed");
            Err(failed("Failed to extract tasks from document."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ids() {
        assert!(is_plain_id("901234"));
        assert!(is_plain_id("abc_12-x"));
        assert!(!is_plain_id("../team"));
        assert!(!is_plain_id("1?x="));
        assert!(!is_plain_id("9 01"));
    }

    #[test]
    fn test_created_message() {
        assert_eq!(created_message(1), "Created 1 task in ClickUp.");
        assert_eq!(created_message(3), "Created 3 tasks in ClickUp.");
    }
}
