use anyhow::{Error, anyhow};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct AdResponse {
    pub status_code: u16,
    pub body: Option<Value>,
}

/// Long-lived HTTP client shared by the ad-server adapters. Built
/// eagerly so a bad TLS stack fails at startup rather than on the
/// first media buy.
pub struct AdClient {
    client: Client,
}

impl AdClient {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::ClientBuilder::new()
            .user_agent("ad-sales-agent")
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .tcp_keepalive(Some(Duration::from_secs(20)))
            .tcp_nodelay(true)
            .referer(false)
            .redirect(reqwest::redirect::Policy::none())
            .gzip(true)
            .deflate(true)
            .hickory_dns(true)
            .build()?;

        Ok(AdClient { client })
    }

    /// POSTs a JSON payload. Non-2xx responses return Ok with the
    /// status code; only transport failures are errors.
    pub async fn post_json(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
    ) -> Result<AdResponse, Error> {
        let mut request = self.client.post(url).json(body);

        if let Some(key) = api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Failed to execute http request to {}: {}", url, e))?;

        let status_code = response.status().as_u16();

        if !response.status().is_success() {
            debug!("Non 2xx status {} from {}", status_code, url);
            return Ok(AdResponse {
                status_code,
                body: None,
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| anyhow!("Failed to read http response from {}: {}", url, e))?;

        Ok(AdResponse {
            status_code,
            body: Some(body),
        })
    }
}
