use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Canonical catalog records ---

/// A normalized, source-independent catalog entity.
///
/// Uniqueness: the normalized SKU when present, otherwise the normalized
/// `(brand, name)` pair. Created once by the entity resolver; later
/// sightings only fill fields that are still empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub colorway: Option<String>,
    pub sku: Option<String>,
    pub retail_price: Option<f64>,
    pub release_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One source sighting of a product, already mapped into the canonical
/// shape by a source adapter. Missing fields stay `None` — adapters never
/// guess.
#[derive(Debug, Clone, Default)]
pub struct RawItem {
    pub name: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub colorway: Option<String>,
    pub sku: Option<String>,
    pub retail_price: Option<f64>,
    pub release_date: Option<NaiveDate>,
    pub description: Option<String>,
    /// Source id this sighting came from (e.g. "stockx").
    pub marketplace: String,
    pub image_refs: Vec<RawImageRef>,
}

/// Reference to a candidate image, prior to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImageRef {
    pub url: String,
    /// Alt/caption text when the source provides one; feeds the keyword
    /// heuristic in the quality gate.
    pub alt_text: Option<String>,
}

// --- Images ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Primary,
    Detail,
}

impl ImageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRole::Primary => "primary",
            ImageRole::Detail => "detail",
        }
    }

    pub fn parse(s: &str) -> ImageRole {
        match s {
            "primary" => ImageRole::Primary,
            _ => ImageRole::Detail,
        }
    }
}

impl std::fmt::Display for ImageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted image that passed dedup and the quality gate.
///
/// `storage_ref` is `None` when the sink upload failed after bounded
/// retries; the metadata row is kept so a repair pass can retry later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedImage {
    pub id: Uuid,
    pub item_id: Uuid,
    pub source_url: String,
    /// SHA-256 of the raw bytes, hex-encoded.
    pub byte_hash: String,
    /// 8x8 average hash.
    pub ahash: u64,
    /// 8x8 difference hash.
    pub dhash: u64,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub storage_ref: Option<String>,
    pub role: ImageRole,
    pub created_at: DateTime<Utc>,
}

// --- Prices ---

/// One observed list price for an item on one marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub item_id: Uuid,
    pub marketplace: String,
    pub price: f64,
    pub currency: String,
    pub observed_at: DateTime<Utc>,
}
