pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use config::{Config, CollectorConfig, DedupConfig, QualityConfig, RetryConfig, SourceLimits};
pub use error::{ErrorClass, SourceError};
pub use types::*;
