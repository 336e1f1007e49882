use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeNinjaError>;

#[derive(Debug, Error)]
pub enum ScrapeNinjaError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by proxy")]
    RateLimited,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty body for {0}")]
    EmptyBody(String),
}

impl From<reqwest::Error> for ScrapeNinjaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeNinjaError::Network("timeout".to_string())
        } else {
            ScrapeNinjaError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScrapeNinjaError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeNinjaError::Parse(err.to_string())
    }
}
