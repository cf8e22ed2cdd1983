use crate::alerts::{AlertSink, SinkError};
use crate::config::WebhookConfig;
use crate::evaluator::Issue;
use crate::reading::{format_timestamp, now_unix_ms, HostInfo};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    host: &'a str,
    sent_at: String,
    issues: &'a [Issue],
}

/// Posts each issue batch as JSON to a configured URL.
pub struct WebhookSink {
    client: Client,
    url: String,
    timeout: Duration,
    host: HostInfo,
}

impl WebhookSink {
    pub fn new(cfg: &WebhookConfig, host: HostInfo) -> Self {
        let client = Client::builder()
            .user_agent(concat!("resmon/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url: cfg.url.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
            host,
        }
    }

    fn payload(&self, issues: &[Issue]) -> Result<Vec<u8>, SinkError> {
        let payload = WebhookPayload {
            host: self.host.display_name(),
            sent_at: format_timestamp(now_unix_ms()),
            issues,
        };
        Ok(serde_json::to_vec(&payload)?)
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, issues: &[Issue]) -> Result<(), SinkError> {
        let body = self.payload(issues)?;
        self.client
            .post(&self.url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
