// Outbound email behind a trait; delivery failures are reported, never fatal

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

// Brevo transactional email API.
pub struct BrevoMailer {
    client: reqwest::Client,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

const BREVO_SEND_URL: &str = "https://api.brevo.com/v3/smtp/email";

impl BrevoMailer {
    pub fn new(api_key: String, sender_email: String, sender_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            sender_email,
            sender_name,
        }
    }
}

#[async_trait]
impl Mailer for BrevoMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let response = self
            .client
            .post(BREVO_SEND_URL)
            .header("api-key", &self.api_key)
            .json(&json!({
                "sender": { "name": self.sender_name, "email": self.sender_email },
                "to": [{ "email": mail.to }],
                "subject": mail.subject,
                "htmlContent": mail.html,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %mail.to, subject = %mail.subject, "Email sent");
        Ok(())
    }
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            "Mail relay not configured; email logged only"
        );
        Ok(())
    }
}

pub fn from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match &config.brevo_api_key {
        Some(key) => Arc::new(BrevoMailer::new(
            key.clone(),
            config.sender_email.clone(),
            config.sender_name.clone(),
        )),
        None => {
            tracing::warn!("BREVO_API_KEY not set; outgoing email will only be logged");
            Arc::new(LogMailer)
        }
    }
}
