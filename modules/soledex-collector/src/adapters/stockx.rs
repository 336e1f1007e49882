//! StockX marketplace adapter. Search pages are fetched through the
//! rendering proxy and parsed structurally.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use scrapeninja_client::ScrapeNinjaClient;
use soledex_common::normalize::{
    extract_brand, extract_colorway, extract_model, parse_price, sanitize_url,
};
use soledex_common::{RawImageRef, RawItem, SourceError};

use crate::adapters::proxy_error;
use crate::traits::SourceAdapter;

pub const SOURCE_ID: &str = "stockx";

pub struct StockxAdapter {
    proxy: Arc<ScrapeNinjaClient>,
}

impl StockxAdapter {
    pub fn new(proxy: Arc<ScrapeNinjaClient>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl SourceAdapter for StockxAdapter {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        let url = url::Url::parse_with_params("https://stockx.com/search", &[("s", query)])
            .map_err(|e| SourceError::BadResponse(e.to_string()))?;

        let html = self.proxy.scrape(url.as_str()).await.map_err(proxy_error)?;
        let items = parse_search_html(&html, limit);
        if items.is_empty() {
            debug!(query, "StockX search returned no parseable tiles");
        }
        Ok(items)
    }
}

/// Extract product tiles from a rendered StockX search page.
fn parse_search_html(html: &str, limit: usize) -> Vec<RawItem> {
    let document = Html::parse_document(html);
    let tile = Selector::parse("div.browse-tile").unwrap();
    let name_sel = Selector::parse("p.tile-name").unwrap();
    let price_sel = Selector::parse("div.tile-price").unwrap();
    let img_sel = Selector::parse("img").unwrap();

    let mut items = Vec::new();
    for product in document.select(&tile).take(limit) {
        let Some(name) = product
            .select(&name_sel)
            .next()
            .map(|n| n.text().collect::<String>().trim().to_string())
            .filter(|n| !n.is_empty())
        else {
            continue;
        };

        let price = product
            .select(&price_sel)
            .next()
            .and_then(|p| parse_price(&p.text().collect::<String>()));

        let image_refs = product
            .select(&img_sel)
            .filter_map(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .filter(|src| src.starts_with("http"))
            .map(|src| RawImageRef {
                url: sanitize_url(src),
                alt_text: Some(name.clone()),
            })
            .take(1)
            .collect();

        items.push(RawItem {
            brand: extract_brand(&name),
            model: extract_model(&name),
            colorway: extract_colorway(&name),
            sku: None,
            retail_price: price,
            release_date: None,
            description: None,
            marketplace: SOURCE_ID.to_string(),
            image_refs,
            name,
        });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body>
          <div class="browse-tile">
            <img src="https://images.stockx.com/aj1-chicago.jpg?utm_source=tile"/>
            <p class="tile-name">Air Jordan 1 Retro High OG Chicago</p>
            <div class="tile-price">$412</div>
          </div>
          <div class="browse-tile">
            <p class="tile-name">Nike Dunk Low Black White</p>
          </div>
          <div class="browse-tile">
            <div class="tile-price">$99</div>
          </div>
        </body></html>
    "#;

    #[test]
    fn parses_tiles_with_name_price_and_image() {
        let items = parse_search_html(FIXTURE, 10);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.name, "Air Jordan 1 Retro High OG Chicago");
        assert_eq!(first.brand.as_deref(), Some("Nike"));
        assert_eq!(first.retail_price, Some(412.0));
        assert_eq!(
            first.image_refs[0].url,
            "https://images.stockx.com/aj1-chicago.jpg"
        );

        let second = &items[1];
        assert_eq!(second.colorway.as_deref(), Some("Black White"));
        assert!(second.image_refs.is_empty());
        assert_eq!(second.retail_price, None);
    }

    #[test]
    fn limit_bounds_the_tile_count() {
        let items = parse_search_html(FIXTURE, 1);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn empty_page_parses_to_no_items() {
        assert!(parse_search_html("<html></html>", 10).is_empty());
    }
}
