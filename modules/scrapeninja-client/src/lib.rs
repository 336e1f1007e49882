pub mod error;
pub mod types;

pub use error::{Result, ScrapeNinjaError};
pub use types::{ScrapeRequest, ScrapeResponse};

use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://scrapeninja.apiroad.net/scrape";

const USER_AGENT: &str =
    "User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Client for the ScrapeNinja rendering proxy. Marketplace and
/// image-search pages are fetched through this rather than hitting the
/// sites directly; the proxy handles JS rendering and geo routing.
pub struct ScrapeNinjaClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ScrapeNinjaClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests, self-hosted proxy).
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Fetch a URL through the proxy and return the rendered HTML body.
    pub async fn scrape(&self, url: &str) -> Result<String> {
        let request = ScrapeRequest {
            url: url.to_string(),
            geo: "us".to_string(),
            retry_num: 1,
            timeout: 15,
            headers: vec![USER_AGENT.to_string()],
        };

        tracing::debug!(url, "Fetching via ScrapeNinja");

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-apiroad-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ScrapeNinjaError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScrapeNinjaError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ScrapeResponse = resp.json().await?;
        if parsed.body.is_empty() {
            return Err(ScrapeNinjaError::EmptyBody(url.to_string()));
        }

        if let Some(info) = &parsed.info {
            tracing::debug!(url, upstream_status = info.status_code, "ScrapeNinja fetch complete");
        }

        Ok(parsed.body)
    }
}
