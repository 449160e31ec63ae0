//! Twilio carrier API — SMS, voice calls, WhatsApp.
//!
//! Uses the REST API directly: form-encoded POSTs with HTTP basic auth
//! (account SID + auth token). Returns the resource `sid`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use taskrelay_core::config::TwilioConfig;
use taskrelay_core::error::{RelayError, Result};
use taskrelay_core::traits::MessageChannel;

/// Low-level Twilio REST client.
pub struct TwilioClient {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            config,
            client: crate::http_client(timeout)?,
        })
    }

    fn account_url(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{resource}.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    async fn post_form(&self, resource: &str, form: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .post(self.account_url(resource))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| crate::transport_error("Twilio", e))?;

        let body = crate::read_json("Twilio", response).await?;
        body["sid"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| RelayError::Channel("Twilio response missing sid".into()))
    }

    /// Send a text message. `from`/`to` may carry a `whatsapp:` prefix.
    pub async fn send_message(&self, from: &str, to: &str, body: &str) -> Result<String> {
        let sid = self
            .post_form("Messages", &[("From", from), ("To", to), ("Body", body)])
            .await?;
        tracing::info!("📤 Twilio message sent to {to} (sid={sid})");
        Ok(sid)
    }

    /// Place a call that reads `message` aloud.
    pub async fn make_call(&self, to: &str, message: &str) -> Result<String> {
        let twiml = twiml_say(message, &self.config.voice_language);
        let sid = self
            .post_form(
                "Calls",
                &[("From", self.config.phone_number.as_str()), ("To", to), ("Twiml", twiml.as_str())],
            )
            .await?;
        tracing::info!("📞 Twilio call started to {to} (sid={sid})");
        Ok(sid)
    }
}

/// TwiML document that speaks `message`.
pub fn twiml_say(message: &str, language: &str) -> String {
    format!(
        "<Response><Say language=\"{}\">{}</Say></Response>",
        xml_escape(language),
        xml_escape(message)
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Which Twilio product a channel drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwilioMode {
    Sms,
    Voice,
    WhatsApp,
}

/// `MessageChannel` over a shared `TwilioClient`.
pub struct TwilioChannel {
    client: Arc<TwilioClient>,
    mode: TwilioMode,
}

impl TwilioChannel {
    pub fn new(client: Arc<TwilioClient>, mode: TwilioMode) -> Self {
        Self { client, mode }
    }
}

/// WhatsApp addresses on Twilio carry a `whatsapp:` scheme.
pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

#[async_trait]
impl MessageChannel for TwilioChannel {
    fn name(&self) -> &str {
        match self.mode {
            TwilioMode::Sms => "twilio-sms",
            TwilioMode::Voice => "twilio-voice",
            TwilioMode::WhatsApp => "twilio-whatsapp",
        }
    }

    async fn send(&self, to: &str, body: &str) -> Result<String> {
        let from = &self.client.config.phone_number;
        match self.mode {
            TwilioMode::Sms => self.client.send_message(from, to, body).await,
            TwilioMode::Voice => self.client.make_call(to, body).await,
            TwilioMode::WhatsApp => {
                self.client
                    .send_message(&whatsapp_address(from), &whatsapp_address(to), body)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TwilioClient {
        TwilioClient::new(
            TwilioConfig {
                account_sid: "AC42".into(),
                auth_token: "tok".into(),
                phone_number: "+15550001111".into(),
                api_base: "https://api.twilio.com/".into(),
                ..Default::default()
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_account_url() {
        assert_eq!(
            client().account_url("Messages"),
            "https://api.twilio.com/2010-04-01/Accounts/AC42/Messages.json"
        );
    }

    #[test]
    fn test_twiml_escapes_message() {
        let twiml = twiml_say("Take <pills> & rest", "es-MX");
        assert_eq!(
            twiml,
            "<Response><Say language=\"es-MX\">Take &lt;pills&gt; &amp; rest</Say></Response>"
        );
    }

    #[test]
    fn test_whatsapp_address_prefix_once() {
        assert_eq!(whatsapp_address("+1555"), "whatsapp:+1555");
        assert_eq!(whatsapp_address("whatsapp:+1555"), "whatsapp:+1555");
    }

    #[test]
    fn test_channel_names() {
        let c = Arc::new(client());
        assert_eq!(TwilioChannel::new(c.clone(), TwilioMode::Voice).name(), "twilio-voice");
        assert_eq!(TwilioChannel::new(c, TwilioMode::Sms).name(), "twilio-sms");
    }
}
