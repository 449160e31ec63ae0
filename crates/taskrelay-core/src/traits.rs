//! Adapter seams. The worker and HTTP handlers only see these traits;
//! concrete provider clients live in `taskrelay-channels`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::calendar::{
    FreeBusyQuery, GoogleEvent, GoogleEventQuery, GoogleEventUpdate, OutlookEvent,
    OutlookEventQuery, OutlookEventUpdate,
};
use crate::error::Result;

/// A one-way text channel: SMS, voice call, or chat message.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Short name used in logs ("twilio-sms", "whatsapp-gateway", ...).
    fn name(&self) -> &str;

    /// Deliver `body` to `to`. Returns the provider's message identifier.
    async fn send(&self, to: &str, body: &str) -> Result<String>;
}

/// Transactional email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

/// Google Calendar operations. Event records are returned as provider JSON.
#[async_trait]
pub trait GoogleCalendar: Send + Sync {
    async fn create_event(&self, event: &GoogleEvent) -> Result<serde_json::Value>;
    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<serde_json::Value>;
    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        update: &GoogleEventUpdate,
    ) -> Result<serde_json::Value>;
    async fn delete_event(&self, calendar_id: &str, event_id: &str, notify: bool) -> Result<()>;
    async fn list_events(&self, query: &GoogleEventQuery) -> Result<Vec<serde_json::Value>>;
}

/// Outlook calendar operations over Microsoft Graph.
#[async_trait]
pub trait OutlookCalendar: Send + Sync {
    async fn create_event(&self, event: &OutlookEvent) -> Result<serde_json::Value>;
    async fn get_event(&self, event_id: &str) -> Result<serde_json::Value>;
    async fn update_event(
        &self,
        event_id: &str,
        update: &OutlookEventUpdate,
    ) -> Result<serde_json::Value>;
    async fn delete_event(&self, event_id: &str, send_cancellation: bool) -> Result<()>;
    async fn list_events(&self, query: &OutlookEventQuery) -> Result<Vec<serde_json::Value>>;
    async fn free_busy(&self, query: &FreeBusyQuery) -> Result<serde_json::Value>;
}

/// Every adapter the process was able to build from its configuration.
/// Built once at startup and shared by the worker and the HTTP gateway.
#[derive(Clone, Default)]
pub struct Providers {
    pub sms: Option<Arc<dyn MessageChannel>>,
    pub voice: Option<Arc<dyn MessageChannel>>,
    pub whatsapp: Option<Arc<dyn MessageChannel>>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub google: Option<Arc<dyn GoogleCalendar>>,
    pub outlook: Option<Arc<dyn OutlookCalendar>>,
}

impl Providers {
    /// Names of the configured adapters, for the startup banner.
    pub fn summary(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.sms.is_some() {
            names.push("sms");
        }
        if self.voice.is_some() {
            names.push("call");
        }
        if self.whatsapp.is_some() {
            names.push("whatsapp");
        }
        if self.mailer.is_some() {
            names.push("email");
        }
        if self.google.is_some() {
            names.push("google-calendar");
        }
        if self.outlook.is_some() {
            names.push("outlook-calendar");
        }
        names
    }
}
