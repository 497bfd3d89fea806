// src/notify/webhook.rs

use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Serialize;

use crate::notify::NotificationSink;
use crate::types::{BoxFuture, Severity};

/// Chat webhook (Discord/Slack-compatible `{"content": ...}` payload).
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct Payload<'a> {
    content: &'a str,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

/// `"<emoji> **Jobwarden**\n\n<message>"`
pub fn render(message: &str, severity: Severity) -> String {
    format!("{} **Jobwarden**\n\n{}", severity.emoji(), message)
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send<'a>(
        &'a self,
        message: &'a str,
        severity: Severity,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let content = render(message, severity);
            let resp = self
                .client
                .post(&self.url)
                .json(&Payload { content: &content })
                .send()
                .await
                .context("posting to webhook")?;

            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("webhook responded with {status}"));
            }
            Ok(())
        })
    }
}
