//! GOAT marketplace adapter. Same proxy + structural parse shape as the
//! StockX adapter, different page layout.

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

pub const SOURCE_ID: &str = "goat";

pub struct GoatAdapter {
    proxy: Arc<ScrapeNinjaClient>,
}

impl GoatAdapter {
    pub fn new(proxy: Arc<ScrapeNinjaClient>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl SourceAdapter for GoatAdapter {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        let url = url::Url::parse_with_params("https://www.goat.com/search", &[("query", query)])
            .map_err(|e| SourceError::BadResponse(e.to_string()))?;

        let html = self.proxy.scrape(url.as_str()).await.map_err(proxy_error)?;
        let items = parse_search_html(&html, limit);
        if items.is_empty() {
            debug!(query, "GOAT search returned no parseable tiles");
        }
        Ok(items)
    }
}

fn parse_search_html(html: &str, limit: usize) -> Vec<RawItem> {
    let document = Html::parse_document(html);
    let tile = Selector::parse("div.ProductTile").unwrap();
    let name_sel = Selector::parse("h3").unwrap();
    let price_sel = Selector::parse("[data-qa='price']").unwrap();
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
            .filter_map(|img| img.value().attr("src"))
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
          <div class="ProductTile">
            <h3>Yeezy Boost 350 V2 Zebra</h3>
            <span data-qa="price">$240</span>
            <img src="https://image.goat.com/350-zebra.png"/>
          </div>
        </body></html>
    "#;

    #[test]
    fn parses_goat_product_tiles() {
        let items = parse_search_html(FIXTURE, 8);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Yeezy Boost 350 V2 Zebra");
        assert_eq!(items[0].brand.as_deref(), Some("Adidas"));
        assert_eq!(items[0].retail_price, Some(240.0));
        assert_eq!(items[0].image_refs[0].url, "https://image.goat.com/350-zebra.png");
    }
}
