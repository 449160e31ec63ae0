//! Microsoft Graph app-only authentication (OAuth2 client credentials).

use std::time::Duration;

use taskrelay_core::config::MicrosoftConfig;
use taskrelay_core::error::Result;

use crate::oauth::{TokenCache, fetch_token};

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Acquires and caches Graph access tokens for one app registration.
pub struct GraphAuth {
    token_url: String,
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
    cache: TokenCache,
}

impl GraphAuth {
    pub fn new(config: &MicrosoftConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            token_url: token_url(&config.login_base, &config.tenant_id),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            client: crate::http_client(timeout)?,
            cache: TokenCache::default(),
        })
    }

    /// A valid bearer token, refreshed when within a minute of expiry.
    pub async fn access_token(&self) -> Result<String> {
        self.cache
            .get_or_refresh(|| {
                let request = self.client.post(&self.token_url).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("scope", GRAPH_SCOPE),
                ]);
                fetch_token("Microsoft Graph", request)
            })
            .await
    }
}

pub fn token_url(login_base: &str, tenant_id: &str) -> String {
    format!(
        "{}/{tenant_id}/oauth2/v2.0/token",
        login_base.trim_end_matches('/')
    )
}
