//! Email processor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_common::config::EmailConfig;
use courier_common::{AppError, AppResult};
use courier_db::entities::job::JobType;
use reqwest::Client;
use serde_json::{Value, json};

use super::{Processor, http_client};
use crate::jobs::{self, EmailJob};

/// Delivers one email message.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send a message. Fails if the provider is not configured or rejects it.
    async fn send(&self, message: &EmailJob) -> AppResult<()>;
}

/// Sends mail through a JSON HTTP API authenticated with a bearer key.
#[derive(Clone)]
pub struct HttpEmailSender {
    config: EmailConfig,
    http_client: Client,
}

impl HttpEmailSender {
    /// Create a new sender.
    #[must_use]
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            http_client: http_client(Duration::from_secs(15)),
        }
    }

    /// Whether an API key is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn body(&self, message: &EmailJob) -> Value {
        let mut body = json!({
            "from": format!("{} <{}>", self.config.from_name, self.config.from_address),
            "to": [message.to],
            "subject": message.subject,
            "text": message.text,
        });
        if let Some(html) = &message.html {
            body["html"] = json!(html);
        }
        body
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailJob) -> AppResult<()> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Processor("Email service not configured".to_string()))?;

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&self.body(message))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Email request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Email provider returned {status}: {detail}"
            )));
        }

        tracing::debug!(to = %message.to, "Email accepted by provider");
        Ok(())
    }
}

/// Processor for `email` jobs.
#[derive(Clone)]
pub struct EmailProcessor {
    sender: Arc<dyn EmailSender>,
}

impl EmailProcessor {
    /// Create a new email processor.
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Processor for EmailProcessor {
    fn job_type(&self) -> JobType {
        JobType::Email
    }

    async fn process(&self, payload: &Value) -> AppResult<()> {
        let message: EmailJob = jobs::decode(payload)?;
        self.sender.send(&message).await
    }
}
