//! Task intake and lookup routes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use taskrelay_core::task::{NewTask, Task, TaskStatus};

use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::server::AppState;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

/// Liveness check.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "TaskRelay is running!" }))
}

/// Validate and persist a submission as `pending`. Nothing runs here; the
/// worker picks it up once it is due.
pub(crate) fn submit(state: &AppState, task: &NewTask) -> ApiResult<Task> {
    task.validate()?;
    let stored = state.db.insert(task)?;
    if !state.can_dispatch(stored.task_type) {
        tracing::warn!(
            "⚠️ Task {} ({}) accepted, but no provider is configured for it; it stays pending",
            stored.id,
            stored.task_type
        );
    }
    if task.is_immediate(Utc::now(), state.immediate_threshold_secs) {
        tracing::info!(
            "📥 Task {} ({}) queued for immediate dispatch",
            stored.id,
            stored.task_type
        );
    } else {
        tracing::info!(
            "📥 Task {} ({}) scheduled for {}",
            stored.id,
            stored.task_type,
            stored.scheduled_at
        );
    }
    Ok(stored)
}

/// `POST /tasks/`
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    ApiJson(task): ApiJson<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let stored = submit(&state, &task)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// `GET /tasks/{id}`
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Task>> {
    state
        .db
        .get(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Task {id} not found")))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// `GET /tasks/?status=&limit=` — newest first.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListTasksParams>,
) -> ApiResult<Json<Vec<Task>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(ApiError::unprocessable(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }
    Ok(Json(state.db.list(params.status, limit)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{send, state_with};
    use axum::http::Method;
    use taskrelay_core::task::TaskType;
    use taskrelay_core::traits::Providers;

    #[tokio::test]
    async fn test_create_task_persists_pending() {
        let state = state_with(Providers::default());
        let (status, body) = send(
            &state,
            Method::POST,
            "/tasks/",
            Some(json!({
                "target": "+15551234567",
                "message": "Take the food out of the oven",
                "task_type": "sms",
                "scheduled_at": "2026-03-01T15:30:00"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["task_type"], "sms");

        let id = body["id"].as_i64().unwrap();
        let stored = state.db.get(id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(stored.scheduled_at.to_rfc3339(), "2026-03-01T15:30:00+00:00");
    }

    #[tokio::test]
    async fn test_create_task_defaults_to_now_and_stays_pending() {
        let state = state_with(Providers::default());
        let before = Utc::now();
        let (status, body) = send(
            &state,
            Method::POST,
            "/tasks/",
            Some(json!({"target": "a@b.com", "message": "hi", "task_type": "email"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let stored = state.db.get(body["id"].as_i64().unwrap()).unwrap().unwrap();
        assert!(stored.scheduled_at >= before);
        assert_eq!(stored.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_task_validation_errors() {
        let state = state_with(Providers::default());
        let cases = [
            json!({"target": "", "message": "x", "task_type": "sms"}),
            json!({"target": "+1", "message": "  ", "task_type": "sms"}),
            json!({"target": "+1", "message": "x", "task_type": "fax"}),
            json!({"target": "+1", "task_type": "sms"}),
            json!({"target": "+1", "message": "x", "task_type": "email", "extra_data": [1, 2]}),
            json!({"target": "+1", "message": "x", "task_type": "sms", "scheduled_at": "soon"}),
        ];
        for body in cases {
            let (status, value) = send(&state, Method::POST, "/tasks/", Some(body.clone())).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
            assert!(value["detail"].is_string());
        }
        assert!(state.db.list(None, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_task_malformed_json_is_400() {
        let state = state_with(Providers::default());
        let app = crate::build_router((*state).clone());
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/tasks/")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{\"target\": "))
            .unwrap();
        let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_task_without_provider_is_still_accepted() {
        let state = state_with(Providers::default());
        assert!(!state.can_dispatch(TaskType::Whatsapp));
        let (status, body) = send(
            &state,
            Method::POST,
            "/tasks/",
            Some(json!({"target": "+1555", "message": "hola", "task_type": "whatsapp"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
    }

    #[tokio::test]
    async fn test_get_task_and_404() {
        let state = state_with(Providers::default());
        let task = state
            .db
            .insert(&NewTask::new("+1", "ping", TaskType::Call, Utc::now()))
            .unwrap();

        let (status, body) = send(&state, Method::GET, &format!("/tasks/{}", task.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "ping");

        let (status, body) = send(&state, Method::GET, "/tasks/9999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Task 9999 not found");
    }

    #[tokio::test]
    async fn test_list_tasks_filters_and_limits() {
        let state = state_with(Providers::default());
        for i in 0..3 {
            let task = state
                .db
                .insert(&NewTask::new("+1", &format!("m{i}"), TaskType::Sms, Utc::now()))
                .unwrap();
            if i == 0 {
                state.db.mark(task.id, TaskStatus::Done).unwrap();
            }
        }

        let (status, body) = send(&state, Method::GET, "/tasks/?status=pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["message"], "m2");

        let (_, body) = send(&state, Method::GET, "/tasks/?limit=1", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(&state, Method::GET, "/tasks/?limit=0", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, _) = send(&state, Method::GET, "/tasks/?status=lost", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
