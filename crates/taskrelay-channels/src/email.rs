//! Transactional email through Microsoft Graph `sendMail`.
//!
//! Mail is sent from the configured sender mailbox with an HTML body and
//! saved to its Sent Items.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use taskrelay_core::config::MicrosoftConfig;
use taskrelay_core::error::Result;
use taskrelay_core::traits::Mailer;

use crate::graph::GraphAuth;

pub struct GraphMailer {
    auth: Arc<GraphAuth>,
    client: reqwest::Client,
    graph_base: String,
    sender: String,
}

impl GraphMailer {
    pub fn new(auth: Arc<GraphAuth>, config: &MicrosoftConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            auth,
            client: crate::http_client(timeout)?,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            sender: config.sender_email.clone(),
        })
    }
}

/// `sendMail` request body.
pub fn mail_payload(to: &str, subject: &str, html_body: &str) -> serde_json::Value {
    serde_json::json!({
        "message": {
            "subject": subject,
            "body": { "contentType": "HTML", "content": html_body },
            "toRecipients": [ { "emailAddress": { "address": to } } ],
        },
        "saveToSentItems": true,
    })
}

#[async_trait]
impl Mailer for GraphMailer {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/users/{}/sendMail", self.graph_base, self.sender);
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&mail_payload(to, subject, html_body))
            .send()
            .await
            .map_err(|e| crate::transport_error("Graph sendMail", e))?;
        crate::ensure_success("Graph sendMail", response).await?;
        tracing::info!("📧 Email sent to {to}: {subject}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_payload_shape() {
        let body = mail_payload("pat@example.com", "Reminder", "<p>Hi</p>");
        assert_eq!(body["message"]["subject"], "Reminder");
        assert_eq!(body["message"]["body"]["contentType"], "HTML");
        assert_eq!(
            body["message"]["toRecipients"][0]["emailAddress"]["address"],
            "pat@example.com"
        );
        assert_eq!(body["saveToSentItems"], true);
    }
}
