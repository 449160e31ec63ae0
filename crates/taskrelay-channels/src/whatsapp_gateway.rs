//! Self-hosted WhatsApp gateway (Evolution-style REST API).
//!
//! `POST {url}/message/sendText/{instance}` with an `apikey` header.
//! Swapped in for Twilio's WhatsApp channel when configured; the worker
//! never knows which one it is talking to.

use async_trait::async_trait;
use std::time::Duration;

use taskrelay_core::config::WhatsAppGatewayConfig;
use taskrelay_core::error::Result;
use taskrelay_core::traits::MessageChannel;

/// WhatsApp over the self-hosted gateway.
pub struct GatewayWhatsApp {
    config: WhatsAppGatewayConfig,
    client: reqwest::Client,
}

impl GatewayWhatsApp {
    pub fn new(config: WhatsAppGatewayConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            config,
            client: crate::http_client(timeout)?,
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/message/sendText/{}",
            self.config.url.trim_end_matches('/'),
            self.config.instance
        )
    }
}

/// Gateway numbers are bare digits: no `+`, spaces, or `whatsapp:` prefix.
pub fn normalize_number(number: &str) -> String {
    number
        .trim_start_matches("whatsapp:")
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect()
}

pub fn send_text_payload(to: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "number": normalize_number(to),
        "text": text,
    })
}

#[async_trait]
impl MessageChannel for GatewayWhatsApp {
    fn name(&self) -> &str {
        "whatsapp-gateway"
    }

    async fn send(&self, to: &str, body: &str) -> Result<String> {
        let response = self
            .client
            .post(self.send_url())
            .header("apikey", &self.config.api_key)
            .json(&send_text_payload(to, body))
            .send()
            .await
            .map_err(|e| crate::transport_error("WhatsApp gateway", e))?;

        let result = crate::read_json("WhatsApp gateway", response).await?;
        let msg_id = result["key"]["id"].as_str().unwrap_or("unknown").to_string();
        tracing::info!("💬 WhatsApp (gateway) sent to {to} (id={msg_id})");
        Ok(msg_id)
    }
}
