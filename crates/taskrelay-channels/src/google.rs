//! Google Calendar v3 through a service account.
//!
//! Auth is the OAuth2 JWT-bearer flow: sign an RS256 assertion with the
//! service account's private key, exchange it for an access token, cache it.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use std::time::Duration;

use taskrelay_core::calendar::{GoogleEvent, GoogleEventQuery, GoogleEventUpdate};
use taskrelay_core::config::GoogleConfig;
use taskrelay_core::error::{RelayError, Result};
use taskrelay_core::traits::GoogleCalendar;

use crate::oauth::{TokenCache, fetch_token};

const PROVIDER: &str = "Google Calendar";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// The fields we need from a service-account JSON key file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

/// Service-account token source.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    signing_key: SigningKey<Sha256>,
    client: reqwest::Client,
    cache: TokenCache,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, timeout: Duration) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(&key.private_key)
            .map_err(|e| RelayError::Config(format!("Invalid service account private key: {e}")))?;
        Ok(Self {
            key,
            signing_key: SigningKey::<Sha256>::new(private_key),
            client: crate::http_client(timeout)?,
            cache: TokenCache::default(),
        })
    }

    /// Signed JWT assertion for the token exchange.
    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let unsigned = unsigned_jwt(&self.key, now)?;
        let signature = self.signing_key.sign(unsigned.as_bytes());
        Ok(format!("{unsigned}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes())))
    }

    pub async fn access_token(&self) -> Result<String> {
        self.cache
            .get_or_refresh(|| async {
                let assertion = self.assertion(Utc::now())?;
                let request = self.client.post(&self.key.token_uri).form(&[
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ]);
                fetch_token(PROVIDER, request).await
            })
            .await
    }
}

/// `base64url(header).base64url(claims)` for the service account.
pub fn unsigned_jwt(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
    let header = json!({ "alg": "RS256", "typ": "JWT" });
    let iat = now.timestamp();
    let claims = json!({
        "iss": key.client_email,
        "scope": CALENDAR_SCOPE,
        "aud": key.token_uri,
        "iat": iat,
        "exp": iat + ASSERTION_LIFETIME_SECS,
    });
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    ))
}

/// Google Calendar adapter.
pub struct GoogleCalendarClient {
    auth: ServiceAccountAuth,
    client: reqwest::Client,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(auth: ServiceAccountAuth, api_base: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            auth,
            client: crate::http_client(timeout)?,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Read the key file named in the config and build the client.
    pub fn from_config(config: &GoogleConfig, timeout: Duration) -> Result<Self> {
        let path = config.credentials_file();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            RelayError::Config(format!("Failed to read Google credentials {}: {e}", path.display()))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| RelayError::Config(format!("Invalid Google credentials file: {e}")))?;
        tracing::info!("🔐 Google service account: {}", key.client_email);
        Self::new(ServiceAccountAuth::new(key, timeout)?, &config.api_base, timeout)
    }

    fn events_url(&self, calendar_id: &str, event_id: Option<&str>) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| RelayError::Config(format!("Invalid Google api_base: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RelayError::Config("Google api_base cannot be a base URL".into()))?;
            segments.pop_if_empty().extend(["calendars", calendar_id, "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| crate::transport_error(PROVIDER, e))?;
        crate::ensure_success(PROVIDER, response).await
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| RelayError::Channel(format!("Invalid {PROVIDER} response: {e}")))
    }
}

fn send_updates(notify: bool) -> &'static str {
    if notify { "all" } else { "none" }
}

fn google_time(dt: &DateTime<Utc>, timezone: &str) -> Value {
    json!({
        "dateTime": dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        "timeZone": timezone,
    })
}

fn google_attendees(emails: &[String]) -> Value {
    emails.iter().map(|email| json!({ "email": email })).collect()
}

/// Request body for `events.insert`.
pub fn event_payload(event: &GoogleEvent) -> Value {
    let mut payload = json!({
        "summary": event.summary,
        "description": event.description,
        "start": google_time(&event.start, &event.timezone),
        "end": google_time(&event.end, &event.timezone),
    });
    if let Some(location) = &event.location {
        payload["location"] = json!(location);
    }
    if !event.attendees.is_empty() {
        payload["attendees"] = google_attendees(&event.attendees);
    }
    payload["reminders"] = if event.reminder_minutes.is_empty() {
        json!({ "useDefault": true })
    } else {
        let overrides: Vec<Value> = ["email", "popup"]
            .iter()
            .flat_map(|method| {
                event
                    .reminder_minutes
                    .iter()
                    .map(move |minutes| json!({ "method": method, "minutes": minutes }))
            })
            .collect();
        json!({ "useDefault": false, "overrides": overrides })
    };
    payload
}

/// Overlay a partial update on an event fetched from the API.
pub fn apply_update(event: &mut Value, update: &GoogleEventUpdate, default_timezone: &str) {
    if let Some(summary) = &update.summary {
        event["summary"] = json!(summary);
    }
    if let Some(description) = &update.description {
        event["description"] = json!(description);
    }
    if let Some(location) = &update.location {
        event["location"] = json!(location);
    }
    let timezone = update.timezone.as_deref().unwrap_or(default_timezone);
    if let Some(start) = &update.start_time {
        event["start"] = google_time(start, timezone);
    }
    if let Some(end) = &update.end_time {
        event["end"] = google_time(end, timezone);
    }
    if let Some(attendees) = &update.attendees {
        event["attendees"] = google_attendees(attendees);
    }
}

/// Query parameters for `events.list`. `timeMin` defaults to `now`.
pub fn list_params(query: &GoogleEventQuery, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let rfc = |dt: &DateTime<Utc>| dt.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut params = vec![
        ("timeMin", rfc(query.time_min.as_ref().unwrap_or(&now))),
        ("maxResults", query.max_results.to_string()),
        ("singleEvents", "true".to_string()),
        ("orderBy", "startTime".to_string()),
    ];
    if let Some(max) = &query.time_max {
        params.push(("timeMax", rfc(max)));
    }
    if let Some(q) = &query.query {
        params.push(("q", q.clone()));
    }
    params
}

#[async_trait]
impl GoogleCalendar for GoogleCalendarClient {
    async fn create_event(&self, event: &GoogleEvent) -> Result<Value> {
        let url = self.events_url(&event.calendar_id, None)?;
        let request = self
            .client
            .post(url)
            .query(&[("sendUpdates", send_updates(event.send_notifications))])
            .json(&event_payload(event));
        let created = self.send_json(request).await?;
        tracing::info!(
            "📅 Google event created: {}",
            created["htmlLink"].as_str().unwrap_or("-")
        );
        Ok(created)
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Value> {
        let url = self.events_url(calendar_id, Some(event_id))?;
        self.send_json(self.client.get(url)).await
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        update: &GoogleEventUpdate,
    ) -> Result<Value> {
        let mut event = self.get_event(calendar_id, event_id).await?;
        apply_update(&mut event, update, "UTC");

        let url = self.events_url(calendar_id, Some(event_id))?;
        let notify = update.send_notifications.unwrap_or(true);
        let request = self
            .client
            .put(url)
            .query(&[("sendUpdates", send_updates(notify))])
            .json(&event);
        let updated = self.send_json(request).await?;
        tracing::info!("📅 Google event {event_id} updated");
        Ok(updated)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str, notify: bool) -> Result<()> {
        let url = self.events_url(calendar_id, Some(event_id))?;
        let request = self
            .client
            .delete(url)
            .query(&[("sendUpdates", send_updates(notify))]);
        self.send(request).await?;
        tracing::info!("🗑️ Google event {event_id} deleted");
        Ok(())
    }

    async fn list_events(&self, query: &GoogleEventQuery) -> Result<Vec<Value>> {
        let url = self.events_url(&query.calendar_id, None)?;
        let request = self.client.get(url).query(&list_params(query, Utc::now()));
        let body = self.send_json(request).await?;
        Ok(body["items"].as_array().cloned().unwrap_or_default())
    }
}
