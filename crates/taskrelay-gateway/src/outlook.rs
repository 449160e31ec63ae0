//! Outlook (Microsoft Graph) calendar routes under `/outlook/calendar`.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use taskrelay_core::RelayError;
use taskrelay_core::calendar::{
    FreeBusyQuery, Importance, OutlookEvent, OutlookEventQuery, OutlookEventUpdate,
};
use taskrelay_core::payload::DEFAULT_OUTLOOK_REMINDER;
use taskrelay_core::task::{NewTask, Task, TaskType};
use taskrelay_core::traits::OutlookCalendar;
use taskrelay_scheduler::events::{self, FANOUT_OUTLOOK_REMINDER};

use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::routes::submit;
use crate::server::AppState;

const PROVIDER: &str = "Outlook Calendar";
const MAX_TOP: u32 = 100;

/// Body of the create and schedule routes; stored as the `outlook_event`
/// payload when scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlookEventRequest {
    pub subject: String,
    /// HTML body.
    #[serde(default)]
    pub body: String,
    #[serde(deserialize_with = "taskrelay_core::time::deserialize")]
    pub start_time: DateTime<Utc>,
    #[serde(deserialize_with = "taskrelay_core::time::deserialize")]
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub is_online_meeting: bool,
    #[serde(default)]
    pub send_email_notification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_minutes_before_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_email_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl OutlookEventRequest {
    fn check(&self) -> ApiResult<()> {
        if self.subject.trim().is_empty() {
            return Err(ApiError::unprocessable("subject must not be empty"));
        }
        if self.end_time < self.start_time {
            return Err(ApiError::unprocessable("end_time is before start_time"));
        }
        Ok(())
    }

    fn to_event(&self) -> OutlookEvent {
        let default_reminder = if self.send_email_notification {
            FANOUT_OUTLOOK_REMINDER
        } else {
            DEFAULT_OUTLOOK_REMINDER
        };
        OutlookEvent {
            subject: self.subject.clone(),
            body: self.body.clone(),
            start: self.start_time,
            end: self.end_time,
            attendees: self.attendees.clone(),
            location: self.location.clone(),
            is_online_meeting: self.is_online_meeting,
            reminder_minutes_before_start: self
                .reminder_minutes_before_start
                .unwrap_or(default_reminder),
            categories: self.categories.clone().unwrap_or_default(),
            importance: self.importance.unwrap_or_default(),
            send_response: true,
            timezone: self.timezone.clone(),
        }
    }

    fn to_task(&self, scheduled_at: DateTime<Utc>) -> ApiResult<NewTask> {
        let target = self.attendees.first().map(String::as_str).unwrap_or("system");
        let message = if self.body.trim().is_empty() {
            self.subject.as_str()
        } else {
            self.body.as_str()
        };
        let extra = serde_json::to_value(self).map_err(|e| ApiError::unprocessable(e.to_string()))?;
        Ok(NewTask::new(target, message, TaskType::OutlookEvent, scheduled_at).with_extra(extra))
    }
}

fn outlook(state: &AppState) -> ApiResult<&Arc<dyn OutlookCalendar>> {
    state
        .providers
        .outlook
        .as_ref()
        .ok_or_else(|| ApiError::not_configured(PROVIDER))
}

fn failed(err: RelayError) -> ApiError {
    ApiError::provider(StatusCode::INTERNAL_SERVER_ERROR, err)
}

/// `POST /outlook/calendar/events/`
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<OutlookEventRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    request.check()?;
    let calendar = outlook(&state)?;
    let event = request.to_event();

    if request.send_email_notification {
        let report = events::create_outlook_event_with_notification(
            calendar.as_ref(),
            state.providers.mailer.as_deref(),
            &event,
            request.additional_email_content.as_deref(),
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

/// `POST /outlook/calendar/events/schedule/?scheduled_at=`
pub async fn schedule_event(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ScheduleParams>,
    ApiJson(request): ApiJson<OutlookEventRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    request.check()?;
    let task = submit(&state, &request.to_task(params.scheduled_at)?)?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /outlook/calendar/events/{id}`
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let event = outlook(&state)?
        .get_event(&event_id)
        .await
        .map_err(|e| ApiError::provider(StatusCode::NOT_FOUND, e))?;
    Ok(Json(event))
}

/// `PUT /outlook/calendar/events/{id}`
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    ApiJson(update): ApiJson<OutlookEventUpdate>,
) -> ApiResult<Json<Value>> {
    let event = outlook(&state)?
        .update_event(&event_id, &update)
        .await
        .map_err(failed)?;
    tracing::info!("📅 Updated Outlook event {event_id}");
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default = "default_true")]
    pub send_cancellation: bool,
}

fn default_true() -> bool {
    true
}

/// `DELETE /outlook/calendar/events/{id}?send_cancellation=`
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> ApiResult<StatusCode> {
    outlook(&state)?
        .delete_event(&event_id, params.send_cancellation)
        .await
        .map_err(failed)?;
    tracing::info!("🗑️ Deleted Outlook event {event_id}");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default, deserialize_with = "taskrelay_core::time::deserialize_opt")]
    pub start_datetime: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "taskrelay_core::time::deserialize_opt")]
    pub end_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub top: Option<u32>,
    #[serde(default)]
    pub search: Option<String>,
}

/// `GET /outlook/calendar/events/`
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<Vec<Value>>> {
    let top = params.top.unwrap_or(10);
    if !(1..=MAX_TOP).contains(&top) {
        return Err(ApiError::unprocessable(format!("top must be between 1 and {MAX_TOP}")));
    }
    let query = OutlookEventQuery {
        start: params.start_datetime,
        end: params.end_datetime,
        top,
        search: params.search,
        order_by: "start/dateTime".into(),
    };
    let events = outlook(&state)?.list_events(&query).await.map_err(failed)?;
    Ok(Json(events))
}

/// `POST /outlook/calendar/schedule/free-busy/`
pub async fn free_busy(
    State(state): State<Arc<AppState>>,
    ApiJson(query): ApiJson<FreeBusyQuery>,
) -> ApiResult<Json<Value>> {
    if query.emails.is_empty() {
        return Err(ApiError::unprocessable("emails must not be empty"));
    }
    if query.end_time <= query.start_time {
        return Err(ApiError::unprocessable("end_time must be after start_time"));
    }
    let schedule = outlook(&state)?.free_busy(&query).await.map_err(failed)?;
    Ok(Json(schedule))
}
