//! TheSneakerDatabase API adapter. A plain JSON API, no rendering proxy
//! needed.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use soledex_common::normalize::{extract_brand, extract_colorway, extract_model};
use soledex_common::{RawImageRef, RawItem, SourceError};

use crate::traits::SourceAdapter;

pub const SOURCE_ID: &str = "sneakerdb";

const BASE_URL: &str = "https://api.thesneakerdatabase.com/v2";

pub struct SneakerDbAdapter {
    client: reqwest::Client,
    api_key: String,
}

impl SneakerDbAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SneakerRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SneakerRecord {
    #[serde(default, alias = "shoeName")]
    name: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default, alias = "styleID")]
    style_id: Option<String>,
    #[serde(default)]
    silhouette: Option<String>,
    #[serde(default)]
    colorway: Option<String>,
    #[serde(default)]
    retail_price: Option<f64>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    #[serde(default)]
    original: Option<String>,
    #[serde(default)]
    small: Option<String>,
}

#[async_trait]
impl SourceAdapter for SneakerDbAdapter {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        let url = format!("{BASE_URL}/sneakers");
        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .query(&[("name", query), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout
                } else {
                    SourceError::BadResponse(e.to_string())
                }
            })?;

        let status = resp.status();
        match status.as_u16() {
            200 => {}
            401 | 403 => return Err(SourceError::Auth(format!("status {status}"))),
            429 => return Err(SourceError::RateLimited { retry_after: None }),
            404 => return Err(SourceError::NotFound),
            _ => return Err(SourceError::BadResponse(format!("status {status}"))),
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SourceError::BadResponse(e.to_string()))?;

        let items: Vec<RawItem> = parsed
            .results
            .into_iter()
            .filter_map(map_record)
            .take(limit)
            .collect();
        debug!(query, count = items.len(), "SneakerDB search complete");
        Ok(items)
    }
}

/// Map one API record into the canonical shape. Records without a name
/// are unusable and dropped.
fn map_record(record: SneakerRecord) -> Option<RawItem> {
    let name = record.name.filter(|n| !n.trim().is_empty())?;

    let mut image_refs = Vec::new();
    if let Some(image) = record.image {
        for url in [image.original, image.small].into_iter().flatten() {
            if !url.is_empty() {
                image_refs.push(RawImageRef {
                    url,
                    alt_text: Some(name.clone()),
                });
                break; // original preferred; small is the same shot downsized
            }
        }
    }

    Some(RawItem {
        brand: record.brand.filter(|b| !b.is_empty()).or_else(|| extract_brand(&name)),
        model: record
            .silhouette
            .filter(|s| !s.is_empty())
            .or_else(|| extract_model(&name)),
        colorway: record
            .colorway
            .filter(|c| !c.is_empty())
            .or_else(|| extract_colorway(&name)),
        sku: record.style_id.filter(|s| !s.is_empty()),
        retail_price: record.retail_price.filter(|p| *p > 0.0),
        release_date: record
            .release_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        description: record.description.filter(|d| !d.is_empty()),
        marketplace: SOURCE_ID.to_string(),
        image_refs,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_a_full_record() {
        let json = r#"{
            "results": [{
                "shoeName": "Air Jordan 1 Retro High OG Chicago",
                "brand": "Nike",
                "styleID": "DZ5485-612",
                "silhouette": "Air Jordan 1",
                "colorway": "Varsity Red/Black",
                "retailPrice": 180.0,
                "releaseDate": "2022-11-19",
                "image": {"original": "https://img.example.com/aj1.jpg"}
            }]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let item = map_record(parsed.results.into_iter().next().unwrap()).unwrap();

        assert_eq!(item.name, "Air Jordan 1 Retro High OG Chicago");
        assert_eq!(item.brand.as_deref(), Some("Nike"));
        assert_eq!(item.sku.as_deref(), Some("DZ5485-612"));
        assert_eq!(item.model.as_deref(), Some("Air Jordan 1"));
        assert_eq!(item.retail_price, Some(180.0));
        assert_eq!(
            item.release_date,
            Some(NaiveDate::from_ymd_opt(2022, 11, 19).unwrap())
        );
        assert_eq!(item.image_refs.len(), 1);
        assert_eq!(item.image_refs[0].url, "https://img.example.com/aj1.jpg");
    }

    #[test]
    fn sparse_record_leaves_fields_empty_but_derives_from_name() {
        let json = r#"{"results": [{"name": "Yeezy Boost 350 V2 Zebra"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let item = map_record(parsed.results.into_iter().next().unwrap()).unwrap();

        assert_eq!(item.brand.as_deref(), Some("Adidas"));
        assert_eq!(item.model.as_deref(), Some("Yeezy Boost 350"));
        assert_eq!(item.sku, None);
        assert_eq!(item.retail_price, None);
        assert!(item.image_refs.is_empty());
    }

    #[test]
    fn nameless_records_are_dropped() {
        let json = r#"{"results": [{"brand": "Nike"}, {"name": "  "}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let mapped: Vec<_> = parsed.results.into_iter().filter_map(map_record).collect();
        assert!(mapped.is_empty());
    }

    #[test]
    fn bad_release_dates_become_none() {
        let json = r#"{"results": [{"name": "Dunk Low", "releaseDate": "soon"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let item = map_record(parsed.results.into_iter().next().unwrap()).unwrap();
        assert_eq!(item.release_date, None);
    }
}
