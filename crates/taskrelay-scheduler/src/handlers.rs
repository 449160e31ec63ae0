//! Built-in task handlers, one per provider action.

use async_trait::async_trait;
use std::sync::Arc;

use taskrelay_core::error::{RelayError, Result};
use taskrelay_core::payload::TaskPayload;
use taskrelay_core::task::Task;
use taskrelay_core::traits::{GoogleCalendar, Mailer, MessageChannel, OutlookCalendar};

use crate::events::{self, FANOUT_OUTLOOK_REMINDER};
use crate::registry::TaskHandler;

fn payload_mismatch(task: &Task) -> RelayError {
    RelayError::Validation(format!(
        "task {} payload does not match type {}",
        task.id, task.task_type
    ))
}

/// sms / call / whatsapp: forward `target` + `message` to a channel.
pub struct MessageHandler {
    channel: Arc<dyn MessageChannel>,
}

impl MessageHandler {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl TaskHandler for MessageHandler {
    fn name(&self) -> &str {
        self.channel.name()
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        let id = self.channel.send(&task.target, &task.message).await?;
        tracing::debug!("task {} delivered via {} ({id})", task.id, self.channel.name());
        Ok(())
    }
}

/// email: subject from the payload, `message` as the HTML body.
pub struct EmailHandler {
    mailer: Arc<dyn Mailer>,
}

impl EmailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl TaskHandler for EmailHandler {
    fn name(&self) -> &str {
        "email"
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        let TaskPayload::Email(payload) = task.payload()? else {
            return Err(payload_mismatch(task));
        };
        self.mailer
            .send_email(&task.target, payload.subject(), &task.message)
            .await
    }
}

/// calendar_event: create a Google event, optionally mail the attendees.
pub struct GoogleEventHandler {
    calendar: Arc<dyn GoogleCalendar>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl GoogleEventHandler {
    pub fn new(calendar: Arc<dyn GoogleCalendar>, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Self { calendar, mailer }
    }
}

#[async_trait]
impl TaskHandler for GoogleEventHandler {
    fn name(&self) -> &str {
        "google-calendar"
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        let TaskPayload::CalendarEvent(payload) = task.payload()? else {
            return Err(payload_mismatch(task));
        };
        let event = payload.resolve(task);

        if payload.send_email_notification {
            let report = events::create_google_event_with_notification(
                self.calendar.as_ref(),
                self.mailer.as_deref(),
                &event,
                payload.additional_email_body.as_deref(),
            )
            .await?;
            tracing::info!(
                "📅 Task {}: event created, {} confirmation(s) sent, {} failed",
                task.id,
                report.sent.len(),
                report.failed.len()
            );
        } else {
            self.calendar.create_event(&event).await?;
        }
        Ok(())
    }
}

/// outlook_event: create an Outlook event, optionally mail the attendees.
pub struct OutlookEventHandler {
    calendar: Arc<dyn OutlookCalendar>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl OutlookEventHandler {
    pub fn new(calendar: Arc<dyn OutlookCalendar>, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Self { calendar, mailer }
    }
}

#[async_trait]
impl TaskHandler for OutlookEventHandler {
    fn name(&self) -> &str {
        "outlook-calendar"
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        let TaskPayload::OutlookEvent(payload) = task.payload()? else {
            return Err(payload_mismatch(task));
        };
        let mut event = payload.resolve(task);

        if payload.send_email_notification {
            if payload.reminder_minutes_before_start.is_none() {
                event.reminder_minutes_before_start = FANOUT_OUTLOOK_REMINDER;
            }
            let report = events::create_outlook_event_with_notification(
                self.calendar.as_ref(),
                self.mailer.as_deref(),
                &event,
                payload.additional_email_content.as_deref(),
            )
            .await?;
            tracing::info!(
                "📅 Task {}: event created, {} confirmation(s) sent, {} failed",
                task.id,
                report.sent.len(),
                report.failed.len()
            );
        } else {
            self.calendar.create_event(&event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChannel, FakeGoogle, FakeMailer, FakeOutlook};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use taskrelay_core::payload::{DEFAULT_EMAIL_SUBJECT, DEFAULT_EVENT_TITLE};
    use taskrelay_core::task::{TaskStatus, TaskType};

    fn task(task_type: TaskType, extra: Option<serde_json::Value>) -> Task {
        let at = Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap();
        Task {
            id: 7,
            target: "lee@example.com".into(),
            message: "See you there".into(),
            task_type,
            status: TaskStatus::Pending,
            scheduled_at: at,
            extra_data: extra,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_message_handler_forwards_target_and_message() {
        let channel = Arc::new(FakeChannel::default());
        let handler = MessageHandler::new(channel.clone());
        handler.execute(&task(TaskType::Sms, None)).await.unwrap();
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent[0], ("lee@example.com".to_string(), "See you there".to_string()));
    }

    #[tokio::test]
    async fn test_email_handler_default_subject() {
        let mailer = Arc::new(FakeMailer::default());
        let handler = EmailHandler::new(mailer.clone());
        handler.execute(&task(TaskType::Email, None)).await.unwrap();
        handler
            .execute(&task(TaskType::Email, Some(json!({"subject": "Invoice"}))))
            .await
            .unwrap();
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].1, DEFAULT_EMAIL_SUBJECT);
        assert_eq!(sent[1].1, "Invoice");
        assert_eq!(sent[1].2, "See you there");
    }

    #[tokio::test]
    async fn test_email_handler_rejects_bad_extra() {
        let handler = EmailHandler::new(Arc::new(FakeMailer::default()));
        let result = handler.execute(&task(TaskType::Email, Some(json!("nope")))).await;
        assert!(result.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_google_handler_defaults_from_task() {
        let calendar = Arc::new(FakeGoogle::default());
        let handler = GoogleEventHandler::new(calendar.clone(), None);
        handler.execute(&task(TaskType::CalendarEvent, None)).await.unwrap();

        let created = calendar.created.lock().unwrap();
        let event = &created[0];
        assert_eq!(event.summary, DEFAULT_EVENT_TITLE);
        assert_eq!(event.description, "See you there");
        assert_eq!(event.attendees, vec!["lee@example.com"]);
        assert_eq!(event.reminder_minutes, vec![30, 10]);
        assert_eq!(event.start, event.end);
    }

    #[tokio::test]
    async fn test_google_handler_fanout_failure_does_not_fail_task() {
        let calendar = Arc::new(FakeGoogle::default());
        let mailer = Arc::new(FakeMailer::failing_for(&["b@x.com"]));
        let handler = GoogleEventHandler::new(calendar.clone(), Some(mailer.clone()));
        let extra = json!({
            "summary": "Offsite",
            "attendees": ["a@x.com", "b@x.com"],
            "send_email_notification": true,
            "start_time": "2026-08-10T09:00:00Z",
            "end_time": "2026-08-10T17:00:00Z"
        });
        handler
            .execute(&task(TaskType::CalendarEvent, Some(extra)))
            .await
            .unwrap();
        assert_eq!(calendar.created.lock().unwrap().len(), 1);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outlook_handler_fanout_uses_longer_reminder() {
        let calendar = Arc::new(FakeOutlook::default());
        let mailer = Arc::new(FakeMailer::default());
        let handler = OutlookEventHandler::new(calendar.clone(), Some(mailer.clone()));
        handler
            .execute(&task(TaskType::OutlookEvent, Some(json!({"send_email_notification": true}))))
            .await
            .unwrap();
        handler.execute(&task(TaskType::OutlookEvent, None)).await.unwrap();

        let created = calendar.created.lock().unwrap();
        assert_eq!(created[0].reminder_minutes_before_start, 30);
        assert_eq!(created[1].reminder_minutes_before_start, 15);
        assert_eq!(mailer.sent.lock().unwrap()[0].1, "Confirmation: Untitled event");
    }

    #[tokio::test]
    async fn test_outlook_handler_propagates_auth_error() {
        let handler = OutlookEventHandler::new(Arc::new(FakeOutlook::failing()), None);
        let err = handler.execute(&task(TaskType::OutlookEvent, None)).await.unwrap_err();
        assert!(matches!(err, RelayError::AuthFailed(_)));
    }
}
