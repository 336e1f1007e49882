use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Process configuration loaded from environment variables.
/// Secrets and connection strings only; pipeline tuning lives in
/// [`CollectorConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // Source credentials. Empty string disables the source.
    pub scrapeninja_api_key: String,
    pub sneakerdb_api_key: String,

    // Object-storage sink. Empty token disables uploads.
    pub drive_token: String,
    pub drive_folder_id: String,
}

impl Config {
    /// Load configuration from environment variables. Missing optional
    /// vars fall back to defaults; only the database URL has a baked-in
    /// local default.
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://sneakers.db".to_string()),
            scrapeninja_api_key: env::var("SCRAPENINJA_API_KEY").unwrap_or_default(),
            sneakerdb_api_key: env::var("SNEAKERDB_API_KEY").unwrap_or_default(),
            drive_token: env::var("DRIVE_TOKEN").unwrap_or_default(),
            drive_folder_id: env::var("DRIVE_FOLDER_ID").unwrap_or_default(),
        }
    }
}

/// Per-source request quota.
#[derive(Debug, Clone, Copy)]
pub struct SourceLimits {
    /// Hard ceiling on requests per run. Once reached the source is done
    /// for the run.
    pub max_requests: u32,
    /// Minimum spacing between consecutive requests to the same source.
    pub min_interval: Duration,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            max_requests: 200,
            min_interval: Duration::from_millis(1500),
        }
    }
}

/// Image dedup tuning.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Maximum Hamming distance (bits out of 64) at which two perceptual
    /// hashes still count as the same image. A candidate is a duplicate
    /// only when *all* hash variants are within this distance.
    pub max_hamming: u32,
    /// Capacity of the cross-item near-duplicate window. 0 disables it.
    pub global_window: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_hamming: 5,
            global_window: 512,
        }
    }
}

/// Quality-gate thresholds. All boundaries are inclusive. The keyword
/// lists and the sharpness/edge thresholds are tunable heuristics, not
/// contracts.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub min_width: u32,
    pub min_height: u32,
    /// Laplacian-variance floor. Flat placeholder/logo images land near 0.
    pub sharpness_floor: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Fraction of high-gradient pixels above which an image is judged a
    /// busy scene (people, street shots) rather than a product photo.
    pub max_edge_ratio: f64,
    /// URL/alt-text keywords that reject a candidate outright.
    pub deny_keywords: Vec<String>,
    /// URL/alt-text keywords that mark a candidate as on-subject.
    pub subject_keywords: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_bytes: 5 * 1024,
            max_bytes: 10 * 1024 * 1024,
            min_width: 300,
            min_height: 300,
            sharpness_floor: 100.0,
            min_aspect: 0.5,
            max_aspect: 3.0,
            max_edge_ratio: 0.30,
            deny_keywords: [
                "person", "people", "model", "wearing", "outfit", "fashion", "lifestyle",
                "street", "portrait", "face", "body", "legs", "socks", "pants", "jeans",
                "shorts", "dress", "logo", "banner", "advertisement",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            subject_keywords: [
                "sneaker", "shoe", "jordan", "nike", "adidas", "yeezy", "dunk", "air-max",
                "air max", "force", "boost", "sole", "midsole", "outsole", "heel",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Bounded-retry policy applied by the coordinator around adapter calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Base backoff; actual delay is base * 3^attempt plus jitter.
    pub base_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(3),
        }
    }
}

/// Tuning for one collection run. No dynamic reconfiguration mid-run.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Stop dispatching new work once this many items were accepted.
    pub item_target: u32,
    /// Stop dispatching new work once this many images were accepted.
    pub image_target: u32,
    /// Per-item cap on accepted images.
    pub images_per_item: u32,
    /// Wall-clock deadline for the whole run.
    pub deadline: Duration,
    /// Bounded worker-pool size, independent of source count.
    pub workers: usize,
    /// Per-source overrides; sources not listed use `default_limits`.
    pub source_limits: HashMap<String, SourceLimits>,
    pub default_limits: SourceLimits,
    pub dedup: DedupConfig,
    pub quality: QualityConfig,
    pub retry: RetryConfig,
    /// Upload retries before an image is persisted without a storage ref.
    pub storage_retries: u32,
    /// Where the JSON run report is written.
    pub report_path: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            item_target: 2000,
            image_target: 1000,
            images_per_item: 3,
            deadline: Duration::from_secs(6 * 60 * 60),
            workers: 4,
            source_limits: HashMap::new(),
            default_limits: SourceLimits::default(),
            dedup: DedupConfig::default(),
            quality: QualityConfig::default(),
            retry: RetryConfig::default(),
            storage_retries: 2,
            report_path: "run_report.json".to_string(),
        }
    }
}

impl CollectorConfig {
    /// Apply optional environment overrides (targets and deadline).
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = parse_env("ITEM_TARGET") {
            self.item_target = v;
        }
        if let Some(v) = parse_env("IMAGE_TARGET") {
            self.image_target = v;
        }
        if let Some(mins) = parse_env::<u64>("DEADLINE_MINS") {
            self.deadline = Duration::from_secs(mins * 60);
        }
        if let Some(v) = parse_env("WORKERS") {
            self.workers = v;
        }
        self
    }

    pub fn limits_for(&self, source: &str) -> SourceLimits {
        self.source_limits
            .get(source)
            .copied()
            .unwrap_or(self.default_limits)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
