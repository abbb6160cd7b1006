use crate::core::models::workflow::{PushAuthScheme, PushNotificationConfig};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

/// Signs a webhook body with the registration's shared secret.
pub fn hmac_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    format!("sha256={}", to_hex(&mac.finalize().into_bytes()))
}

/// Delivers workflow notifications to registered push endpoints.
/// Sends for one step are serialized in registration order; failures
/// are logged and never propagate to the triggering operation.
pub struct WebhookDeliverer {
    client: Client,
}

impl WebhookDeliverer {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("webhook http client should build");

        WebhookDeliverer { client }
    }

    pub async fn deliver(&self, configs: &[PushNotificationConfig], payload: &Value) {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!("Webhook payload failed to serialize: {}", e);
                return;
            }
        };

        for push_config in configs {
            let mut request = self
                .client
                .post(&push_config.url)
                .header("Content-Type", "application/json")
                .body(body.clone());

            match push_config.auth_scheme {
                PushAuthScheme::HmacSha256 => {
                    let Some(secret) = push_config.credentials.as_deref() else {
                        warn!("Push config {} uses HMAC-SHA256 without credentials, skipping", push_config.id);
                        continue;
                    };
                    request = request.header("X-Signature", hmac_signature(secret, &body));
                }
                PushAuthScheme::Bearer => {
                    let Some(token) = push_config.credentials.as_deref() else {
                        warn!("Push config {} uses Bearer without credentials, skipping", push_config.id);
                        continue;
                    };
                    request = request.header("Authorization", format!("Bearer {}", token));
                }
                PushAuthScheme::None => {}
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Webhook delivered to {}", push_config.url);
                }
                Ok(response) => {
                    warn!("Webhook to {} returned http {}", push_config.url, response.status());
                }
                Err(e) => {
                    warn!("Webhook to {} failed: {}", push_config.url, e);
                }
            }
        }
    }
}

impl Default for WebhookDeliverer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_signature_is_deterministic() {
        let a = hmac_signature("secret", b"payload");
        let b = hmac_signature("secret", b"payload");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));
        assert_eq!(a.len(), "sha256=".len() + 64);
    }

    #[test]
    fn test_hmac_signature_varies_with_key_and_body() {
        let base = hmac_signature("secret", b"payload");
        assert_ne!(base, hmac_signature("other", b"payload"));
        assert_ne!(base, hmac_signature("secret", b"other payload"));
    }
}
