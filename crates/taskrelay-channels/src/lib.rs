//! # TaskRelay Channels
//! Provider adapter implementations.
//!
//! Each adapter wraps one external HTTP API behind a `taskrelay-core` trait.
//! Calls are single-shot: no retry, no circuit breaking.

pub mod email;
pub mod google;
pub mod graph;
pub mod oauth;
pub mod outlook;
pub mod twilio;
pub mod whatsapp_gateway;

use std::sync::Arc;
use std::time::Duration;

use taskrelay_core::config::RelayConfig;
use taskrelay_core::error::{RelayError, Result};
use taskrelay_core::traits::Providers;

/// Build every adapter the configuration allows.
/// Sections that are absent or incomplete simply produce no adapter.
pub fn build_providers(config: &RelayConfig) -> Result<Providers> {
    let timeout = Duration::from_secs(config.http.timeout_secs);
    let mut providers = Providers::default();

    // Twilio: SMS + voice, and WhatsApp unless the gateway takes over
    if let Some(tw) = &config.twilio {
        if tw.is_complete() {
            let client = Arc::new(twilio::TwilioClient::new(tw.clone(), timeout)?);
            providers.sms = Some(Arc::new(twilio::TwilioChannel::new(
                client.clone(),
                twilio::TwilioMode::Sms,
            )));
            providers.voice = Some(Arc::new(twilio::TwilioChannel::new(
                client.clone(),
                twilio::TwilioMode::Voice,
            )));
            providers.whatsapp = Some(Arc::new(twilio::TwilioChannel::new(
                client,
                twilio::TwilioMode::WhatsApp,
            )));
        } else {
            tracing::warn!("⚠️ [twilio] section incomplete — sms/call disabled");
        }
    }

    if let Some(gw) = &config.whatsapp_gateway {
        if gw.is_complete() {
            providers.whatsapp = Some(Arc::new(whatsapp_gateway::GatewayWhatsApp::new(
                gw.clone(),
                timeout,
            )?));
        } else {
            tracing::warn!("⚠️ [whatsapp_gateway] section incomplete — ignored");
        }
    }

    // Microsoft Graph: one token cache shared by mail and calendar
    if let Some(ms) = &config.microsoft {
        if ms.is_complete() {
            let auth = Arc::new(graph::GraphAuth::new(ms, timeout)?);
            providers.mailer = Some(Arc::new(email::GraphMailer::new(auth.clone(), ms, timeout)?));
            providers.outlook = Some(Arc::new(outlook::OutlookCalendarClient::new(
                auth, ms, timeout,
            )?));
        } else {
            tracing::warn!("⚠️ [microsoft] section incomplete — email/outlook disabled");
        }
    }

    if let Some(g) = &config.google
        && !g.credentials_path.is_empty()
    {
        providers.google = Some(Arc::new(google::GoogleCalendarClient::from_config(g, timeout)?));
    }

    Ok(providers)
}

/// Shared `reqwest` client builder: every adapter gets a request timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RelayError::Config(format!("HTTP client: {e}")))
}

/// Turn a non-2xx response into a `RelayError` carrying status and body.
pub(crate) async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!("{provider} error body: {body}");
    Err(RelayError::from_status(provider, status.as_u16(), &body))
}

/// Read a successful JSON body.
pub(crate) async fn read_json(provider: &str, response: reqwest::Response) -> Result<serde_json::Value> {
    let response = ensure_success(provider, response).await?;
    response
        .json()
        .await
        .map_err(|e| RelayError::Channel(format!("Invalid {provider} response: {e}")))
}

/// Map a transport failure (connect, timeout, TLS).
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> RelayError {
    RelayError::Http(format!("{provider} request failed: {err}"))
}
