//! In-memory fakes of the adapter traits. They record every call and fail
//! on demand. Enabled for this crate's tests and, through the `testing`
//! feature, for the gateway's.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskrelay_core::calendar::{
    FreeBusyQuery, GoogleEvent, GoogleEventQuery, GoogleEventUpdate, OutlookEvent,
    OutlookEventQuery, OutlookEventUpdate,
};
use taskrelay_core::error::{RelayError, Result};
use taskrelay_core::traits::{GoogleCalendar, Mailer, MessageChannel, OutlookCalendar};

/// Event id the calendar fakes treat as missing.
pub const MISSING_EVENT_ID: &str = "missing";

/// Records `(to, body)` pairs; fails for listed targets.
#[derive(Default)]
pub struct FakeChannel {
    pub sent: Mutex<Vec<(String, String)>>,
    failing_targets: Vec<String>,
    auth_error: bool,
}

impl FakeChannel {
    pub fn failing_for(targets: &[&str]) -> Self {
        Self {
            failing_targets: targets.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Fails for listed targets with an expired-token style error.
    pub fn auth_failing_for(targets: &[&str]) -> Self {
        Self {
            auth_error: true,
            ..Self::failing_for(targets)
        }
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageChannel for FakeChannel {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(&self, to: &str, body: &str) -> Result<String> {
        if self.failing_targets.iter().any(|t| t == to) {
            return Err(if self.auth_error {
                RelayError::AuthFailed("token expired".into())
            } else {
                RelayError::Channel(format!("rejected {to}"))
            });
        }
        let mut sent = self.sent.lock().map_err(|e| RelayError::Other(e.to_string()))?;
        sent.push((to.to_string(), body.to_string()));
        Ok(format!("fake-{}", sent.len()))
    }
}

/// Records `(to, subject, html)`; fails for listed recipients.
#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
    failing: Vec<String>,
}

impl FakeMailer {
    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            sent: Mutex::default(),
            failing: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        if self.failing.iter().any(|r| r == to) {
            return Err(RelayError::Channel(format!("mailbox {to} unavailable")));
        }
        self.sent
            .lock()
            .map_err(|e| RelayError::Other(e.to_string()))?
            .push((to.to_string(), subject.to_string(), html_body.to_string()));
        Ok(())
    }
}

/// Google Calendar fake.
#[derive(Default)]
pub struct FakeGoogle {
    pub created: Mutex<Vec<GoogleEvent>>,
    pub deleted: Mutex<Vec<(String, String, bool)>>,
    fail: bool,
    next_id: AtomicUsize,
}

impl FakeGoogle {
    /// Every call fails with a provider error.
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    fn check(&self, event_id: &str) -> Result<()> {
        if self.fail {
            return Err(RelayError::Channel("Google Calendar API error 500: backend".into()));
        }
        if event_id == MISSING_EVENT_ID {
            return Err(RelayError::NotFound(format!("event {event_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl GoogleCalendar for FakeGoogle {
    async fn create_event(&self, event: &GoogleEvent) -> Result<Value> {
        self.check("")?;
        let id = format!("g{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.created
            .lock()
            .map_err(|e| RelayError::Other(e.to_string()))?
            .push(event.clone());
        Ok(json!({
            "id": id,
            "summary": event.summary,
            "htmlLink": format!("https://calendar.example/{id}"),
        }))
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Value> {
        self.check(event_id)?;
        Ok(json!({ "id": event_id, "organizer": { "email": calendar_id } }))
    }

    async fn update_event(
        &self,
        _calendar_id: &str,
        event_id: &str,
        update: &GoogleEventUpdate,
    ) -> Result<Value> {
        self.check(event_id)?;
        Ok(json!({ "id": event_id, "summary": update.summary }))
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str, notify: bool) -> Result<()> {
        self.check(event_id)?;
        self.deleted
            .lock()
            .map_err(|e| RelayError::Other(e.to_string()))?
            .push((calendar_id.to_string(), event_id.to_string(), notify));
        Ok(())
    }

    async fn list_events(&self, query: &GoogleEventQuery) -> Result<Vec<Value>> {
        self.check("")?;
        Ok((0..query.max_results.min(2))
            .map(|i| json!({ "id": format!("g{i}"), "calendar": query.calendar_id }))
            .collect())
    }
}

/// Outlook calendar fake.
#[derive(Default)]
pub struct FakeOutlook {
    pub created: Mutex<Vec<OutlookEvent>>,
    pub deleted: Mutex<Vec<(String, bool)>>,
    fail: bool,
}

impl FakeOutlook {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    fn check(&self, event_id: &str) -> Result<()> {
        if self.fail {
            return Err(RelayError::AuthFailed("Graph calendar API error 401: expired".into()));
        }
        if event_id == MISSING_EVENT_ID {
            return Err(RelayError::NotFound(format!("event {event_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl OutlookCalendar for FakeOutlook {
    async fn create_event(&self, event: &OutlookEvent) -> Result<Value> {
        self.check("")?;
        self.created
            .lock()
            .map_err(|e| RelayError::Other(e.to_string()))?
            .push(event.clone());
        Ok(json!({
            "id": "o1",
            "subject": event.subject,
            "webLink": "https://outlook.example/o1",
            "onlineMeeting": { "joinUrl": "https://teams.example/join/o1" },
        }))
    }

    async fn get_event(&self, event_id: &str) -> Result<Value> {
        self.check(event_id)?;
        Ok(json!({ "id": event_id }))
    }

    async fn update_event(&self, event_id: &str, update: &OutlookEventUpdate) -> Result<Value> {
        self.check(event_id)?;
        Ok(json!({ "id": event_id, "subject": update.subject }))
    }

    async fn delete_event(&self, event_id: &str, send_cancellation: bool) -> Result<()> {
        self.check(event_id)?;
        self.deleted
            .lock()
            .map_err(|e| RelayError::Other(e.to_string()))?
            .push((event_id.to_string(), send_cancellation));
        Ok(())
    }

    async fn list_events(&self, query: &OutlookEventQuery) -> Result<Vec<Value>> {
        self.check("")?;
        Ok(vec![json!({ "id": "o1", "top": query.top })])
    }

    async fn free_busy(&self, query: &FreeBusyQuery) -> Result<Value> {
        self.check("")?;
        let value: Vec<Value> = query
            .emails
            .iter()
            .map(|email| json!({ "scheduleId": email, "availabilityView": "0000" }))
            .collect();
        Ok(json!({ "value": value }))
    }
}
