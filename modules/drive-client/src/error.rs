use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriveError>;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DriveError {
    /// Whether a retry could plausibly succeed (network hiccup or 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            DriveError::Network(_) => true,
            DriveError::Api { status, .. } => *status >= 500 || *status == 429,
            DriveError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for DriveError {
    fn from(err: reqwest::Error) -> Self {
        DriveError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for DriveError {
    fn from(err: serde_json::Error) -> Self {
        DriveError::Parse(err.to_string())
    }
}
