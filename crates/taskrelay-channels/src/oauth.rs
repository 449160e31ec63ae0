//! Bearer-token cache shared by the Graph and Google authenticators.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use taskrelay_core::error::{RelayError, Result};

/// Refresh this long before the provider-reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Parse an OAuth2 token endpoint response.
pub fn parse_token_response(
    provider: &str,
    body: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<CachedToken> {
    if let Some(err) = body["error"].as_str() {
        let description = body["error_description"].as_str().unwrap_or("");
        return Err(RelayError::AuthFailed(format!("{provider}: {err} {description}")));
    }
    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| RelayError::AuthFailed(format!("{provider}: no access_token in response")))?
        .to_string();
    let expires_in = body["expires_in"].as_i64().unwrap_or(3600);
    Ok(CachedToken {
        access_token,
        expires_at: now + Duration::seconds(expires_in),
    })
}

/// Single-slot token cache. The lock is held across a refresh so
/// concurrent callers don't stampede the token endpoint.
#[derive(Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CachedToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref()
            && token.is_fresh(Utc::now())
        {
            return Ok(token.access_token.clone());
        }
        let token = refresh().await?;
        let access = token.access_token.clone();
        *slot = Some(token);
        Ok(access)
    }
}

/// Send a token request and parse the result. Token endpoints return
/// JSON error bodies on 4xx, so the body is parsed before the status check.
pub(crate) async fn fetch_token(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<CachedToken> {
    let response = request
        .send()
        .await
        .map_err(|e| crate::transport_error(provider, e))?;
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    if !status.is_success() && body["error"].is_null() {
        return Err(RelayError::AuthFailed(format!(
            "{provider} token endpoint returned {status}"
        )));
    }
    let token = parse_token_response(provider, &body, Utc::now())?;
    tracing::debug!("🔑 {provider} token refreshed (expires {})", token.expires_at);
    Ok(token)
}
