use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde_json::json;
use url::Url;

use crate::error::NotifyError;
use crate::types::NewRecord;

pub const DEFAULT_CAP: usize = 10;

/// Best-effort outbound message. Callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Slack-style incoming webhook.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook: Url,
}

impl SlackNotifier {
    pub fn new(webhook: Url) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("building webhook client")?;
        Ok(Self { client, webhook })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let rsp = self
            .client
            .post(self.webhook.clone())
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| NotifyError(anyhow!(e).context("posting to webhook")))?;

        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(NotifyError(anyhow!("webhook answered {status}: {body}")));
        }
        Ok(())
    }
}

/// Count heading plus at most `cap` entries, then "...and N more".
pub fn summary_message(records: &[NewRecord], cap: usize) -> String {
    let mut text = format!(
        "🚨 *{} new site{} without a seller* 🚨\n\n",
        records.len(),
        if records.len() == 1 { "" } else { "s" }
    );
    for r in records.iter().take(cap) {
        let _ = writeln!(text, "• *{}* ({}) — {}", r.display_url, r.identifier, r.detail_link);
    }
    if records.len() > cap {
        let _ = write!(text, "...and {} more", records.len() - cap);
    }
    text
}
