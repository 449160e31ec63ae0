//! Google Calendar passthrough routes under `/calendar`.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use taskrelay_core::calendar::{GoogleEvent, GoogleEventQuery, GoogleEventUpdate};
use taskrelay_core::payload::DEFAULT_GOOGLE_REMINDERS;
use taskrelay_core::task::{NewTask, Task, TaskType};
use taskrelay_core::traits::GoogleCalendar;
use taskrelay_scheduler::events;

use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::routes::submit;
use crate::server::AppState;

const PROVIDER: &str = "Google Calendar";
const MAX_RESULTS_LIMIT: u32 = 100;

/// Body of the create and schedule routes. Field names match the
/// `calendar_event` payload so the body can be stored as `extra_data` as is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleEventRequest {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(deserialize_with = "taskrelay_core::time::deserialize")]
    pub start_time: DateTime<Utc>,
    #[serde(deserialize_with = "taskrelay_core::time::deserialize")]
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub send_email_notification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_minutes: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_email_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
}

impl GoogleEventRequest {
    fn check(&self) -> ApiResult<()> {
        if self.summary.trim().is_empty() {
            return Err(ApiError::unprocessable("summary must not be empty"));
        }
        if self.end_time < self.start_time {
            return Err(ApiError::unprocessable("end_time is before start_time"));
        }
        Ok(())
    }

    fn to_event(&self, state: &AppState) -> GoogleEvent {
        GoogleEvent {
            summary: self.summary.clone(),
            description: self.description.clone().unwrap_or_default(),
            start: self.start_time,
            end: self.end_time,
            attendees: self.attendees.clone(),
            location: self.location.clone(),
            calendar_id: self.calendar_id.clone().unwrap_or_else(|| state.calendar_id.clone()),
            send_notifications: true,
            reminder_minutes: self
                .reminder_minutes
                .clone()
                .unwrap_or_else(|| DEFAULT_GOOGLE_REMINDERS.to_vec()),
            timezone: self.timezone.clone().unwrap_or_else(|| state.calendar_timezone.clone()),
        }
    }

    /// A `calendar_event` task that creates this event at `scheduled_at`.
    fn to_task(&self, scheduled_at: DateTime<Utc>) -> ApiResult<NewTask> {
        let target = self.attendees.first().map(String::as_str).unwrap_or("system");
        let message = match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => self.summary.as_str(),
        };
        let extra = serde_json::to_value(self).map_err(|e| ApiError::unprocessable(e.to_string()))?;
        Ok(NewTask::new(target, message, TaskType::CalendarEvent, scheduled_at).with_extra(extra))
    }
}

fn google(state: &AppState) -> ApiResult<&Arc<dyn GoogleCalendar>> {
    state
        .providers
        .google
        .as_ref()
        .ok_or_else(|| ApiError::not_configured(PROVIDER))
}

fn failed(err: taskrelay_core::RelayError) -> ApiError {
    ApiError::provider(StatusCode::INTERNAL_SERVER_ERROR, err)
}

/// `POST /calendar/events/` — create now, optionally mailing each attendee.
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<GoogleEventRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    request.check()?;
    let calendar = google(&state)?;
    let event = request.to_event(&state);

    if request.send_email_notification {
        let report = events::create_google_event_with_notification(
            calendar.as_ref(),
            state.providers.mailer.as_deref(),
            &event,
            request.additional_email_body.as_deref(),
        )
        .await
        .map_err(failed)?;
        let mut body = report.event;
        if let Value::Object(map) = &mut body {
            map.insert(
                "confirmation_emails".into(),
                json!({ "sent": report.sent, "failed": report.failed }),
            );
        }
        Ok((StatusCode::CREATED, Json(body)))
    } else {
        let created = calendar.create_event(&event).await.map_err(failed)?;
        Ok((StatusCode::CREATED, Json(created)))
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleParams {
    #[serde(deserialize_with = "taskrelay_core::time::deserialize")]
    pub scheduled_at: DateTime<Utc>,
}

/// `POST /calendar/events/schedule/?scheduled_at=` — defer creation to the worker.
pub async fn schedule_event(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ScheduleParams>,
    ApiJson(request): ApiJson<GoogleEventRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    request.check()?;
    let task = submit(&state, &request.to_task(params.scheduled_at)?)?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Debug, Deserialize)]
pub struct CalendarParams {
    #[serde(default)]
    pub calendar_id: Option<String>,
}

/// `GET /calendar/events/{id}`
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    ApiQuery(params): ApiQuery<CalendarParams>,
) -> ApiResult<Json<Value>> {
    let calendar_id = params.calendar_id.unwrap_or_else(|| state.calendar_id.clone());
    let event = google(&state)?
        .get_event(&calendar_id, &event_id)
        .await
        .map_err(|e| ApiError::provider(StatusCode::NOT_FOUND, e))?;
    Ok(Json(event))
}

/// `PUT /calendar/events/{id}` — partial update.
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    ApiQuery(params): ApiQuery<CalendarParams>,
    ApiJson(update): ApiJson<GoogleEventUpdate>,
) -> ApiResult<Json<Value>> {
    let calendar_id = params.calendar_id.unwrap_or_else(|| state.calendar_id.clone());
    let event = google(&state)?
        .update_event(&calendar_id, &event_id, &update)
        .await
        .map_err(failed)?;
    tracing::info!("📅 Updated Google event {event_id}");
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default = "default_true")]
    pub send_notifications: bool,
}

fn default_true() -> bool {
    true
}

/// `DELETE /calendar/events/{id}`
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> ApiResult<StatusCode> {
    let calendar_id = params.calendar_id.unwrap_or_else(|| state.calendar_id.clone());
    google(&state)?
        .delete_event(&calendar_id, &event_id, params.send_notifications)
        .await
        .map_err(failed)?;
    tracing::info!("🗑️ Deleted Google event {event_id}");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default, deserialize_with = "taskrelay_core::time::deserialize_opt")]
    pub time_min: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "taskrelay_core::time::deserialize_opt")]
    pub time_max: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_results: Option<u32>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub calendar_id: Option<String>,
}

/// `GET /calendar/events/`
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<Vec<Value>>> {
    let max_results = params.max_results.unwrap_or(10);
    if !(1..=MAX_RESULTS_LIMIT).contains(&max_results) {
        return Err(ApiError::unprocessable(format!(
            "max_results must be between 1 and {MAX_RESULTS_LIMIT}"
        )));
    }
    let query = GoogleEventQuery {
        calendar_id: params.calendar_id.unwrap_or_else(|| state.calendar_id.clone()),
        time_min: params.time_min,
        time_max: params.time_max,
        max_results,
        query: params.query,
    };
    let events = google(&state)?.list_events(&query).await.map_err(failed)?;
    Ok(Json(events))
}
