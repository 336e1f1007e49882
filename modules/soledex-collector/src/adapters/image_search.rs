//! Generic web image search, used to backfill items whose product
//! sources carried no usable image refs.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use scrapeninja_client::ScrapeNinjaClient;
use soledex_common::normalize::sanitize_url;
use soledex_common::{CanonicalItem, RawImageRef, SourceError};

use crate::adapters::proxy_error;
use crate::traits::ImageSource;

pub const SOURCE_ID: &str = "bing-images";

pub struct BingImageSearchAdapter {
    proxy: Arc<ScrapeNinjaClient>,
    murl: Regex,
}

impl BingImageSearchAdapter {
    pub fn new(proxy: Arc<ScrapeNinjaClient>) -> Self {
        Self {
            proxy,
            // Full-size image URLs are embedded as JSON in tile metadata.
            murl: Regex::new(r#""murl":"([^"]+)""#).expect("murl regex"),
        }
    }
}

#[async_trait]
impl ImageSource for BingImageSearchAdapter {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn search_images(
        &self,
        item: &CanonicalItem,
        limit: usize,
    ) -> Result<Vec<RawImageRef>, SourceError> {
        let query = search_query(item);
        let url =
            url::Url::parse_with_params("https://www.bing.com/images/search", &[("q", &query)])
                .map_err(|e| SourceError::BadResponse(e.to_string()))?;

        let html = self.proxy.scrape(url.as_str()).await.map_err(proxy_error)?;
        let refs = extract_image_refs(&self.murl, &html, limit);
        debug!(query, count = refs.len(), "Image search complete");
        Ok(refs)
    }
}

/// Build the search query the way a person would: brand, model or full
/// name, colorway.
fn search_query(item: &CanonicalItem) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !item.brand.is_empty() {
        parts.push(&item.brand);
    }
    if !item.model.is_empty() {
        parts.push(&item.model);
    } else {
        parts.push(&item.name);
    }
    if let Some(colorway) = &item.colorway {
        parts.push(colorway);
    }
    parts.join(" ")
}

/// Pull image URLs out of a rendered results page: tile metadata first
/// (full-size URLs), thumbnail `img` tags as a fallback.
fn extract_image_refs(murl: &Regex, html: &str, limit: usize) -> Vec<RawImageRef> {
    let mut refs: Vec<RawImageRef> = Vec::new();

    for caps in murl.captures_iter(html) {
        if refs.len() >= limit {
            return refs;
        }
        let url = caps[1].replace("\\/", "/");
        if is_plausible_image_url(&url) {
            let url = sanitize_url(&url);
            if !refs.iter().any(|r| r.url == url) {
                refs.push(RawImageRef { url, alt_text: None });
            }
        }
    }

    if refs.len() < limit {
        let document = Html::parse_document(html);
        let img_sel = Selector::parse("img.mimg").unwrap();
        for img in document.select(&img_sel) {
            if refs.len() >= limit {
                break;
            }
            let Some(src) = img.value().attr("src") else {
                continue;
            };
            if !is_plausible_image_url(src) {
                continue;
            }
            let url = sanitize_url(src);
            if !refs.iter().any(|r| r.url == url) {
                refs.push(RawImageRef {
                    url,
                    alt_text: img.value().attr("alt").map(|a| a.to_string()),
                });
            }
        }
    }

    refs
}

/// Cheap URL plausibility filter applied before spending a download:
/// a known image extension, or an image-ish path segment.
pub fn is_plausible_image_url(url: &str) -> bool {
    if !url.starts_with("http") || url.len() < 10 {
        return false;
    }
    let lower = url.to_lowercase();

    const EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif"];
    if EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
        return true;
    }

    const PATTERNS: &[&str] = &["image", "img", "photo", "pic", "thumb"];
    PATTERNS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn item(brand: &str, model: &str, name: &str, colorway: Option<&str>) -> CanonicalItem {
        let now = Utc::now();
        CanonicalItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            brand: brand.to_string(),
            model: model.to_string(),
            colorway: colorway.map(|c| c.to_string()),
            sku: None,
            retail_price: None,
            release_date: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn query_uses_brand_model_colorway() {
        let query = search_query(&item("Nike", "Dunk Low", "Nike Dunk Low Panda", Some("Panda")));
        assert_eq!(query, "Nike Dunk Low Panda");
    }

    #[test]
    fn query_falls_back_to_full_name_without_model() {
        let query = search_query(&item("Adidas", "", "Yeezy Foam Runner Onyx", None));
        assert_eq!(query, "Adidas Yeezy Foam Runner Onyx");
    }

    #[test]
    fn extracts_metadata_urls_then_thumbnails() {
        let murl = Regex::new(r#""murl":"([^"]+)""#).unwrap();
        let html = r#"
            <html><body>
              <a class="iusc" m='{"murl":"https:\/\/cdn.example.com\/aj1-full.jpg"}'></a>
              <img class="mimg" src="https://tse.example.com/th/id/abc?pid=ImgDet" alt="air jordan thumb"/>
            </body></html>
        "#;
        let refs = extract_image_refs(&murl, html, 5);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].url, "https://cdn.example.com/aj1-full.jpg");
        assert_eq!(refs[1].alt_text.as_deref(), Some("air jordan thumb"));
    }

    #[test]
    fn limit_and_dedup_apply() {
        let murl = Regex::new(r#""murl":"([^"]+)""#).unwrap();
        let html = r#"
            "murl":"https://cdn.example.com/a.jpg"
            "murl":"https://cdn.example.com/a.jpg"
            "murl":"https://cdn.example.com/b.jpg"
            "murl":"https://cdn.example.com/c.jpg"
        "#;
        let refs = extract_image_refs(&murl, html, 2);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].url, "https://cdn.example.com/a.jpg");
        assert_eq!(refs[1].url, "https://cdn.example.com/b.jpg");
    }

    #[test]
    fn implausible_urls_are_filtered() {
        assert!(is_plausible_image_url("https://cdn.example.com/shoe.webp"));
        assert!(is_plausible_image_url("https://cdn.example.com/images/12345"));
        assert!(!is_plausible_image_url("data:image/png;base64,AAAA"));
        assert!(!is_plausible_image_url("https://a.io/x"));
    }
}
