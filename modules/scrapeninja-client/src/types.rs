use serde::{Deserialize, Serialize};

/// Request payload for the `/scrape` endpoint.
#[derive(Debug, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    pub geo: String,
    #[serde(rename = "retryNum")]
    pub retry_num: u32,
    /// Upstream fetch timeout in seconds.
    pub timeout: u32,
    pub headers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScrapeResponse {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub info: Option<ScrapeInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ScrapeInfo {
    #[serde(rename = "statusCode", default)]
    pub status_code: u16,
    #[serde(rename = "finalUrl", default)]
    pub final_url: Option<String>,
}
