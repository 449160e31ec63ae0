//! Typed `extra_data` payloads, one case per task type.
//!
//! `extra_data` is stored as open JSON. It is decoded here at intake (so bad
//! shapes are rejected before persisting) and again at dispatch, where absent
//! keys fall back to fixed defaults derived from the task itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{GoogleEvent, Importance, OutlookEvent};
use crate::error::{RelayError, Result};
use crate::task::{Task, TaskType};

pub const DEFAULT_EMAIL_SUBJECT: &str = "System reminder";
pub const DEFAULT_EVENT_TITLE: &str = "Untitled event";
pub const DEFAULT_GOOGLE_REMINDERS: [u32; 2] = [30, 10];
pub const DEFAULT_OUTLOOK_REMINDER: u32 = 15;

/// Decoded `extra_data`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    /// call / sms / whatsapp — only `target` and `message` matter.
    Message,
    Email(EmailPayload),
    CalendarEvent(GoogleEventPayload),
    OutlookEvent(OutlookEventPayload),
}

impl TaskPayload {
    /// Decode `extra` for `task_type`. A missing object decodes to all defaults.
    pub fn decode(task_type: TaskType, extra: Option<&serde_json::Value>) -> Result<Self> {
        match task_type {
            TaskType::Call | TaskType::Sms | TaskType::Whatsapp => Ok(Self::Message),
            TaskType::Email => decode_object(extra).map(Self::Email),
            TaskType::CalendarEvent => decode_object(extra).map(Self::CalendarEvent),
            TaskType::OutlookEvent => decode_object(extra).map(Self::OutlookEvent),
        }
    }
}

fn decode_object<T>(extra: Option<&serde_json::Value>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match extra {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(v @ serde_json::Value::Object(_)) => serde_json::from_value(v.clone())
            .map_err(|e| RelayError::Validation(format!("invalid extra_data: {e}"))),
        Some(_) => Err(RelayError::Validation("extra_data must be a JSON object".into())),
    }
}

/// `email` task fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailPayload {
    #[serde(default)]
    pub subject: Option<String>,
}

impl EmailPayload {
    pub fn subject(&self) -> &str {
        self.subject.as_deref().unwrap_or(DEFAULT_EMAIL_SUBJECT)
    }
}

/// `calendar_event` task fields (Google Calendar).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleEventPayload {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "crate::time::deserialize_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::time::deserialize_opt")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub send_email_notification: bool,
    #[serde(default)]
    pub reminder_minutes: Option<Vec<u32>>,
    #[serde(default)]
    pub additional_email_body: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub calendar_id: Option<String>,
}

impl GoogleEventPayload {
    /// Build the event to create, filling gaps from the owning task.
    pub fn resolve(&self, task: &Task) -> GoogleEvent {
        let start = self.start_time.unwrap_or(task.scheduled_at);
        GoogleEvent {
            summary: self.summary.clone().unwrap_or_else(|| DEFAULT_EVENT_TITLE.into()),
            description: self.description.clone().unwrap_or_else(|| task.message.clone()),
            start,
            end: self.end_time.unwrap_or(start),
            attendees: self.attendees.clone().unwrap_or_else(|| vec![task.target.clone()]),
            location: self.location.clone(),
            calendar_id: self.calendar_id.clone().unwrap_or_else(|| "primary".into()),
            send_notifications: true,
            reminder_minutes: self
                .reminder_minutes
                .clone()
                .unwrap_or_else(|| DEFAULT_GOOGLE_REMINDERS.to_vec()),
            timezone: self.timezone.clone().unwrap_or_else(|| "UTC".into()),
        }
    }
}

/// `outlook_event` task fields (Microsoft Graph).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlookEventPayload {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "crate::time::deserialize_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::time::deserialize_opt")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_online_meeting: bool,
    #[serde(default)]
    pub send_email_notification: bool,
    #[serde(default)]
    pub reminder_minutes_before_start: Option<u32>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub importance: Option<Importance>,
    #[serde(default)]
    pub additional_email_content: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl OutlookEventPayload {
    /// Build the event to create, filling gaps from the owning task.
    pub fn resolve(&self, task: &Task) -> OutlookEvent {
        let start = self.start_time.unwrap_or(task.scheduled_at);
        OutlookEvent {
            subject: self.subject.clone().unwrap_or_else(|| DEFAULT_EVENT_TITLE.into()),
            body: self.body.clone().unwrap_or_else(|| task.message.clone()),
            start,
            end: self.end_time.unwrap_or(start),
            attendees: self.attendees.clone().unwrap_or_else(|| vec![task.target.clone()]),
            location: self.location.clone(),
            is_online_meeting: self.is_online_meeting,
            reminder_minutes_before_start: self
                .reminder_minutes_before_start
                .unwrap_or(DEFAULT_OUTLOOK_REMINDER),
            categories: self.categories.clone().unwrap_or_default(),
            importance: self.importance.unwrap_or_default(),
            send_response: true,
            timezone: self.timezone.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use chrono::TimeZone;

    fn task(task_type: TaskType, extra: Option<serde_json::Value>) -> Task {
        let at = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        Task {
            id: 1,
            target: "ana@example.com".into(),
            message: "Quarterly review".into(),
            task_type,
            status: TaskStatus::Pending,
            scheduled_at: at,
            extra_data: extra,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_message_types_ignore_extra() {
        let p = TaskPayload::decode(TaskType::Sms, Some(&serde_json::json!([1, 2]))).unwrap();
        assert_eq!(p, TaskPayload::Message);
    }

    #[test]
    fn test_email_subject_default() {
        let TaskPayload::Email(p) = TaskPayload::decode(TaskType::Email, None).unwrap() else {
            panic!("expected email payload");
        };
        assert_eq!(p.subject(), DEFAULT_EMAIL_SUBJECT);
    }

    #[test]
    fn test_wrong_shapes_rejected() {
        let bad_subject = serde_json::json!({"subject": 42});
        assert!(TaskPayload::decode(TaskType::Email, Some(&bad_subject)).is_err());

        let bad_time = serde_json::json!({"start_time": "not a date"});
        assert!(TaskPayload::decode(TaskType::CalendarEvent, Some(&bad_time)).is_err());

        let not_object = serde_json::json!("subject");
        assert!(TaskPayload::decode(TaskType::OutlookEvent, Some(&not_object)).is_err());
    }

    #[test]
    fn test_unknown_keys_tolerated() {
        let extra = serde_json::json!({"subject": "Hi", "campaign": "spring"});
        assert!(TaskPayload::decode(TaskType::Email, Some(&extra)).is_ok());
    }

    #[test]
    fn test_google_resolve_defaults() {
        let t = task(TaskType::CalendarEvent, Some(serde_json::json!({})));
        let TaskPayload::CalendarEvent(p) = t.payload().unwrap() else {
            panic!("expected calendar payload");
        };
        let ev = p.resolve(&t);
        assert_eq!(ev.summary, DEFAULT_EVENT_TITLE);
        assert_eq!(ev.description, "Quarterly review");
        assert_eq!(ev.start, t.scheduled_at);
        assert_eq!(ev.end, t.scheduled_at);
        assert_eq!(ev.attendees, vec!["ana@example.com".to_string()]);
        assert_eq!(ev.reminder_minutes, vec![30, 10]);
        assert_eq!(ev.calendar_id, "primary");
    }

    #[test]
    fn test_outlook_resolve_parses_iso_strings() {
        let t = task(
            TaskType::OutlookEvent,
            Some(serde_json::json!({
                "subject": "Sync",
                "start_time": "2026-06-02T15:00:00Z",
                "end_time": "2026-06-02T16:00:00+00:00",
                "attendees": ["a@x.com", "b@x.com"],
                "importance": "high",
                "is_online_meeting": true
            })),
        );
        let TaskPayload::OutlookEvent(p) = t.payload().unwrap() else {
            panic!("expected outlook payload");
        };
        let ev = p.resolve(&t);
        assert_eq!(ev.subject, "Sync");
        assert_eq!(ev.start, Utc.with_ymd_and_hms(2026, 6, 2, 15, 0, 0).unwrap());
        assert_eq!(ev.end, Utc.with_ymd_and_hms(2026, 6, 2, 16, 0, 0).unwrap());
        assert_eq!(ev.attendees.len(), 2);
        assert_eq!(ev.importance, Importance::High);
        assert_eq!(ev.reminder_minutes_before_start, DEFAULT_OUTLOOK_REMINDER);
        assert!(ev.is_online_meeting);
    }

    #[test]
    fn test_payload_roundtrips_through_storage_json() {
        let p = GoogleEventPayload {
            summary: Some("Demo".into()),
            start_time: Some(Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap()),
            send_email_notification: true,
            ..Default::default()
        };
        let stored = serde_json::to_value(&p).unwrap();
        let back = TaskPayload::decode(TaskType::CalendarEvent, Some(&stored)).unwrap();
        assert_eq!(back, TaskPayload::CalendarEvent(p));
    }
}
