//! Calendar event descriptions handed to the calendar adapters.
//! Provider request shapes are built from these inside `taskrelay-channels`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Google Calendar event to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<String>,
    pub location: Option<String>,
    pub calendar_id: String,
    /// Let Google email the attendees about the change.
    pub send_notifications: bool,
    /// Minutes-before reminders; empty means the calendar default.
    pub reminder_minutes: Vec<u32>,
    pub timezone: String,
}

/// Partial update for an existing Google event. `None` fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleEventUpdate {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "crate::time::deserialize_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::time::deserialize_opt")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub send_notifications: Option<bool>,
}

/// Filters for listing Google events.
#[derive(Debug, Clone)]
pub struct GoogleEventQuery {
    pub calendar_id: String,
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    pub max_results: u32,
    pub query: Option<String>,
}

/// Outlook event importance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// An Outlook (Microsoft Graph) event to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlookEvent {
    pub subject: String,
    /// HTML body.
    pub body: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<String>,
    pub location: Option<String>,
    /// Create a Teams meeting alongside the event.
    pub is_online_meeting: bool,
    pub reminder_minutes_before_start: u32,
    pub categories: Vec<String>,
    pub importance: Importance,
    /// Request responses and push invitations to attendees.
    pub send_response: bool,
    /// IANA/Windows zone name; `None` uses the adapter's configured zone.
    pub timezone: Option<String>,
}

/// Partial update for an existing Outlook event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutlookEventUpdate {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "crate::time::deserialize_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::time::deserialize_opt")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

/// Filters for listing Outlook events.
#[derive(Debug, Clone)]
pub struct OutlookEventQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub top: u32,
    pub search: Option<String>,
    pub order_by: String,
}

/// Free/busy lookup across several mailboxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeBusyQuery {
    pub emails: Vec<String>,
    #[serde(deserialize_with = "crate::time::deserialize")]
    pub start_time: DateTime<Utc>,
    #[serde(deserialize_with = "crate::time::deserialize")]
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
}

fn default_interval() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_busy_defaults_interval() {
        let q: FreeBusyQuery = serde_json::from_value(serde_json::json!({
            "emails": ["a@x.com", "b@x.com"],
            "start_time": "2026-04-01T09:00:00",
            "end_time": "2026-04-01T18:00:00Z"
        }))
        .unwrap();
        assert_eq!(q.interval_minutes, 30);
        assert_eq!(q.emails.len(), 2);
    }

    #[test]
    fn test_update_leaves_missing_fields_none() {
        let u: GoogleEventUpdate =
            serde_json::from_value(serde_json::json!({"summary": "Moved"})).unwrap();
        assert_eq!(u.summary.as_deref(), Some("Moved"));
        assert!(u.start_time.is_none());
        assert!(u.attendees.is_none());
    }

    #[test]
    fn test_importance_serde() {
        let i: Importance = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(i, Importance::High);
        assert_eq!(Importance::default().as_str(), "normal");
    }
}
