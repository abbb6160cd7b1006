use crate::core::models::tenant::Tenant;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// Best-effort Slack webhook sender. Failures are logged and swallowed;
/// a notification must never abort the operation that triggered it.
pub struct SlackNotifier {
    client: Client,
}

impl SlackNotifier {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("slack http client should build");

        SlackNotifier { client }
    }

    async fn post(&self, webhook_url: &str, payload: Value) {
        match self.client.post(webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Slack notification delivered");
            }
            Ok(response) => {
                warn!("Slack webhook returned http {}", response.status());
            }
            Err(e) => {
                warn!("Failed to send Slack notification: {}", e);
            }
        }
    }

    pub async fn notify_media_buy_event(
        &self,
        tenant: &Tenant,
        event_type: &str,
        media_buy_id: Option<&str>,
        principal_name: &str,
        details: Value,
        success: bool,
    ) {
        let Some(webhook_url) = tenant.slack_webhook_url.as_deref() else {
            return;
        };

        let emoji = if success { ":tada:" } else { ":rotating_light:" };
        let text = format!(
            "{} Media buy {} — {} (principal: {}, tenant: {})",
            emoji,
            media_buy_id.unwrap_or("n/a"),
            event_type,
            principal_name,
            tenant.name,
        );

        self.post(
            webhook_url,
            json!({
                "text": text,
                "attachments": [{"fields": details}],
            }),
        )
        .await;
    }

    pub async fn notify_creative_pending(
        &self,
        tenant: &Tenant,
        creative_id: &str,
        principal_name: &str,
        format: Option<&str>,
        review_reason: Option<&str>,
    ) {
        let Some(webhook_url) = tenant.slack_webhook_url.as_deref() else {
            return;
        };

        let mut text = format!(
            ":frame_with_picture: Creative {} from {} awaits review (format: {})",
            creative_id,
            principal_name,
            format.unwrap_or("unknown"),
        );
        if let Some(reason) = review_reason {
            text.push_str(&format!("\nReview note: {}", reason));
        }

        self.post(webhook_url, json!({ "text": text })).await;
    }

    pub async fn notify_approval_required(
        &self,
        tenant: &Tenant,
        step_id: &str,
        tool_name: &str,
        principal_name: &str,
    ) {
        let Some(webhook_url) = tenant.slack_webhook_url.as_deref() else {
            return;
        };

        self.post(
            webhook_url,
            json!({
                "text": format!(
                    ":hourglass: {} from {} requires approval (workflow step {})",
                    tool_name, principal_name, step_id
                ),
            }),
        )
        .await;
    }
}

impl Default for SlackNotifier {
    fn default() -> Self {
        Self::new()
    }
}
