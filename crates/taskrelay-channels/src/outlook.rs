//! Outlook calendar over Microsoft Graph (`/users/{sender}/events`).
//!
//! Event times are sent in UTC; the configured zone only controls how Graph
//! renders times in its responses (`Prefer: outlook.timezone`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use taskrelay_core::calendar::{
    FreeBusyQuery, OutlookEvent, OutlookEventQuery, OutlookEventUpdate,
};
use taskrelay_core::config::MicrosoftConfig;
use taskrelay_core::error::{RelayError, Result};
use taskrelay_core::traits::OutlookCalendar;

use crate::graph::GraphAuth;

const PROVIDER: &str = "Graph calendar";
const CANCEL_COMMENT: &str = "This event has been cancelled.";

pub struct OutlookCalendarClient {
    auth: Arc<GraphAuth>,
    client: reqwest::Client,
    graph_base: String,
    sender: String,
    timezone: String,
}

impl OutlookCalendarClient {
    pub fn new(auth: Arc<GraphAuth>, config: &MicrosoftConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            auth,
            client: crate::http_client(timeout)?,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            sender: config.sender_email.clone(),
            timezone: config.timezone.clone(),
        })
    }

    /// `{graph}/users/{sender}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.graph_base)
            .map_err(|e| RelayError::Config(format!("Invalid graph_base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| RelayError::Config("graph_base cannot be a base URL".into()))?
            .pop_if_empty()
            .push("users")
            .push(&self.sender)
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: reqwest::Url,
        zone: Option<&str>,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let zone = zone.unwrap_or(self.timezone.as_str());
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header("Prefer", format!("outlook.timezone=\"{zone}\""));
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_LENGTH, "0"),
        };
        let response = request
            .send()
            .await
            .map_err(|e| crate::transport_error(PROVIDER, e))?;
        crate::ensure_success(PROVIDER, response).await
    }

    async fn send_invitations(&self, event_id: &str) -> Result<()> {
        let url = self.url(&["events", event_id, "send"])?;
        self.request(reqwest::Method::POST, url, None, None).await?;
        Ok(())
    }
}

fn graph_time(dt: &DateTime<Utc>) -> Value {
    json!({
        "dateTime": dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "timeZone": "UTC",
    })
}

fn graph_attendees(emails: &[String]) -> Value {
    emails
        .iter()
        .map(|email| {
            let name = email.split('@').next().unwrap_or(email);
            json!({
                "emailAddress": { "address": email, "name": name },
                "type": "required",
            })
        })
        .collect()
}

/// Request body for `POST /events`.
pub fn event_payload(event: &OutlookEvent) -> Value {
    let mut payload = json!({
        "subject": event.subject,
        "body": { "contentType": "HTML", "content": event.body },
        "start": graph_time(&event.start),
        "end": graph_time(&event.end),
        "reminderMinutesBeforeStart": event.reminder_minutes_before_start,
        "isReminderOn": true,
        "importance": event.importance.as_str(),
        "responseRequested": event.send_response,
    });
    if let Some(location) = &event.location {
        payload["location"] = json!({ "displayName": location });
    }
    if !event.attendees.is_empty() {
        payload["attendees"] = graph_attendees(&event.attendees);
    }
    if !event.categories.is_empty() {
        payload["categories"] = json!(event.categories);
    }
    if event.is_online_meeting {
        payload["isOnlineMeeting"] = json!(true);
        payload["onlineMeetingProvider"] = json!("teamsForBusiness");
    }
    payload
}

/// Request body for `PATCH /events/{id}`: only the supplied fields.
pub fn update_payload(update: &OutlookEventUpdate) -> Value {
    let mut payload = json!({});
    if let Some(subject) = &update.subject {
        payload["subject"] = json!(subject);
    }
    if let Some(body) = &update.body {
        payload["body"] = json!({ "contentType": "HTML", "content": body });
    }
    if let Some(start) = &update.start_time {
        payload["start"] = graph_time(start);
    }
    if let Some(end) = &update.end_time {
        payload["end"] = graph_time(end);
    }
    if let Some(location) = &update.location {
        payload["location"] = json!({ "displayName": location });
    }
    if let Some(attendees) = &update.attendees {
        payload["attendees"] = graph_attendees(attendees);
    }
    payload
}

/// OData query parameters for listing events.
pub fn list_params(query: &OutlookEventQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("$top".to_string(), query.top.to_string()),
        ("$orderby".to_string(), query.order_by.clone()),
    ];
    let mut filters = Vec::new();
    if let Some(start) = &query.start {
        filters.push(format!("start/dateTime ge '{}'", start.format("%Y-%m-%dT%H:%M:%S")));
    }
    if let Some(end) = &query.end {
        filters.push(format!("end/dateTime le '{}'", end.format("%Y-%m-%dT%H:%M:%S")));
    }
    if !filters.is_empty() {
        params.push(("$filter".to_string(), filters.join(" and ")));
    }
    if let Some(search) = &query.search {
        params.push(("$search".to_string(), format!("\"{search}\"")));
    }
    params
}

/// Request body for `POST /calendar/getSchedule`.
pub fn free_busy_payload(query: &FreeBusyQuery) -> Value {
    json!({
        "schedules": query.emails,
        "startTime": graph_time(&query.start_time),
        "endTime": graph_time(&query.end_time),
        "availabilityViewInterval": query.interval_minutes,
    })
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    response
        .json()
        .await
        .map_err(|e| RelayError::Channel(format!("Invalid {PROVIDER} response: {e}")))
}

#[async_trait]
impl OutlookCalendar for OutlookCalendarClient {
    async fn create_event(&self, event: &OutlookEvent) -> Result<Value> {
        let url = self.url(&["events"])?;
        let response = self
            .request(
                reqwest::Method::POST,
                url,
                event.timezone.as_deref(),
                Some(&event_payload(event)),
            )
            .await?;
        let created = read_json(response).await?;
        tracing::info!(
            "📅 Outlook event created: {}",
            created["webLink"].as_str().unwrap_or("-")
        );

        if !event.attendees.is_empty() && event.send_response {
            match created["id"].as_str() {
                Some(id) => {
                    if let Err(e) = self.send_invitations(id).await {
                        tracing::warn!("⚠️ Outlook invitations for {id} not sent: {e}");
                    }
                }
                None => tracing::warn!("⚠️ Outlook create response has no id; invitations skipped"),
            }
        }
        Ok(created)
    }

    async fn get_event(&self, event_id: &str) -> Result<Value> {
        let url = self.url(&["events", event_id])?;
        let response = self.request(reqwest::Method::GET, url, None, None).await?;
        read_json(response).await
    }

    async fn update_event(&self, event_id: &str, update: &OutlookEventUpdate) -> Result<Value> {
        let url = self.url(&["events", event_id])?;
        let response = self
            .request(reqwest::Method::PATCH, url, None, Some(&update_payload(update)))
            .await?;
        let updated = read_json(response).await?;
        tracing::info!("📅 Outlook event {event_id} updated");
        Ok(updated)
    }

    async fn delete_event(&self, event_id: &str, send_cancellation: bool) -> Result<()> {
        if send_cancellation {
            let url = self.url(&["events", event_id, "cancel"])?;
            let comment = json!({ "comment": CANCEL_COMMENT });
            match self.request(reqwest::Method::POST, url, None, Some(&comment)).await {
                Ok(_) => tracing::info!("📅 Outlook event {event_id} cancelled, attendees notified"),
                Err(e) => tracing::warn!("⚠️ Outlook cancel for {event_id} failed: {e}"),
            }
        }
        let url = self.url(&["events", event_id])?;
        self.request(reqwest::Method::DELETE, url, None, None).await?;
        tracing::info!("🗑️ Outlook event {event_id} deleted");
        Ok(())
    }

    async fn list_events(&self, query: &OutlookEventQuery) -> Result<Vec<Value>> {
        let mut url = self.url(&["events"])?;
        url.query_pairs_mut().extend_pairs(list_params(query));
        let response = self.request(reqwest::Method::GET, url, None, None).await?;
        let body = read_json(response).await?;
        Ok(body["value"].as_array().cloned().unwrap_or_default())
    }

    async fn free_busy(&self, query: &FreeBusyQuery) -> Result<Value> {
        let url = self.url(&["calendar", "getSchedule"])?;
        let response = self
            .request(reqwest::Method::POST, url, None, Some(&free_busy_payload(query)))
            .await?;
        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use taskrelay_core::calendar::Importance;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, 0, 0).unwrap()
    }

    fn event() -> OutlookEvent {
        OutlookEvent {
            subject: "Review".into(),
            body: "<p>Quarterly</p>".into(),
            start: at(15),
            end: at(16),
            attendees: vec!["ana@corp.com".into()],
            location: Some("Room 4".into()),
            is_online_meeting: true,
            reminder_minutes_before_start: 15,
            categories: vec!["Work".into()],
            importance: Importance::High,
            send_response: true,
            timezone: None,
        }
    }

    fn client() -> OutlookCalendarClient {
        let config = MicrosoftConfig {
            tenant_id: "t".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            sender_email: "bot@corp.com".into(),
            ..Default::default()
        };
        let timeout = Duration::from_secs(5);
        let auth = Arc::new(GraphAuth::new(&config, timeout).unwrap());
        OutlookCalendarClient::new(auth, &config, timeout).unwrap()
    }

    #[test]
    fn test_event_payload() {
        let p = event_payload(&event());
        assert_eq!(p["start"]["dateTime"], "2026-05-04T15:00:00");
        assert_eq!(p["start"]["timeZone"], "UTC");
        assert_eq!(p["importance"], "high");
        assert_eq!(p["isReminderOn"], true);
        assert_eq!(p["responseRequested"], true);
        assert_eq!(p["location"]["displayName"], "Room 4");
        assert_eq!(p["attendees"][0]["emailAddress"]["name"], "ana");
        assert_eq!(p["attendees"][0]["type"], "required");
        assert_eq!(p["onlineMeetingProvider"], "teamsForBusiness");
        assert_eq!(p["categories"][0], "Work");
    }

    #[test]
    fn test_event_payload_omits_empty_optionals() {
        let mut e = event();
        e.location = None;
        e.attendees.clear();
        e.categories.clear();
        e.is_online_meeting = false;
        let p = event_payload(&e);
        assert!(p.get("location").is_none());
        assert!(p.get("attendees").is_none());
        assert!(p.get("categories").is_none());
        assert!(p.get("isOnlineMeeting").is_none());
    }

    #[test]
    fn test_update_payload_only_supplied_fields() {
        let p = update_payload(&OutlookEventUpdate {
            subject: Some("Moved".into()),
            end_time: Some(at(18)),
            ..Default::default()
        });
        let obj = p.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(p["end"]["dateTime"], "2026-05-04T18:00:00");
    }

    #[test]
    fn test_list_params() {
        let params = list_params(&OutlookEventQuery {
            start: Some(at(0)),
            end: Some(at(23)),
            top: 5,
            search: Some("standup".into()),
            order_by: "start/dateTime".into(),
        });
        let get = |k: &str| params.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("$top"), Some("5"));
        assert_eq!(
            get("$filter"),
            Some("start/dateTime ge '2026-05-04T00:00:00' and end/dateTime le '2026-05-04T23:00:00'")
        );
        assert_eq!(get("$search"), Some("\"standup\""));
    }

    #[test]
    fn test_list_params_without_filters() {
        let params = list_params(&OutlookEventQuery {
            start: None,
            end: None,
            top: 10,
            search: None,
            order_by: "start/dateTime".into(),
        });
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_free_busy_payload() {
        let p = free_busy_payload(&FreeBusyQuery {
            emails: vec!["a@corp.com".into()],
            start_time: at(9),
            end_time: at(17),
            interval_minutes: 60,
        });
        assert_eq!(p["schedules"][0], "a@corp.com");
        assert_eq!(p["availabilityViewInterval"], 60);
        assert_eq!(p["endTime"]["dateTime"], "2026-05-04T17:00:00");
    }

    #[test]
    fn test_url_encodes_event_id() {
        let url = client().url(&["events", "AAMk/a=="]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/users/bot@corp.com/events/AAMk%2Fa=="
        );
    }
}
