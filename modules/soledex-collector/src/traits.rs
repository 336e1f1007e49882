// Trait abstractions for the coordinator's dependencies.
//
// SourceAdapter/ImageSource cover the external sources, ImageFetcher the
// raw byte downloads, ObjectStore the blob sink, CatalogStore the catalog
// persistence. Concrete impls live next to the traits; in-memory fakes in
// `testing` make the whole pipeline testable with no network or database.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use soledex_common::{
    AcceptedImage, CanonicalItem, PriceObservation, RawImageRef, RawItem, SourceError,
};
use soledex_store::{CatalogWriter, InsertOutcome, ItemRef, StoredImageHash};

// ---------------------------------------------------------------------------
// SourceAdapter — one per external product source
// ---------------------------------------------------------------------------

/// Translates source-specific search results into canonical `RawItem`s.
/// Adapters are stateless between calls; all rate-limit and retry state
/// lives with the coordinator's budget tracker and retry policy.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> &str;

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError>;
}

/// A source that finds candidate image URLs for an already-resolved item.
/// Used for items whose product sources returned no usable refs.
#[async_trait]
pub trait ImageSource: Send + Sync {
    fn id(&self) -> &str;

    async fn search_images(
        &self,
        item: &CanonicalItem,
        limit: usize,
    ) -> Result<Vec<RawImageRef>, SourceError>;
}

// ---------------------------------------------------------------------------
// ImageFetcher — raw image downloads
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, SourceError>;
}

/// Plain reqwest downloader with a browser User-Agent; image CDNs serve
/// these URLs directly, no rendering proxy needed.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, SourceError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout
            } else {
                SourceError::BadResponse(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited { retry_after: None });
        }
        if status.as_u16() == 404 {
            return Err(SourceError::NotFound);
        }
        if !status.is_success() {
            return Err(SourceError::BadResponse(format!("status {status}")));
        }

        resp.bytes()
            .await
            .map_err(|e| SourceError::BadResponse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ObjectStore — blob sink for accepted images
// ---------------------------------------------------------------------------

/// Narrow contract over the blob sink: store bytes under a name inside a
/// folder hint, idempotent-safe by name via `find`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Return the external id if an object of this name already exists.
    async fn find(&self, name: &str, folder_hint: &str) -> Result<Option<String>>;

    /// Store bytes and return the external object id.
    async fn store(&self, data: Bytes, name: &str, folder_hint: &str) -> Result<String>;
}

/// Drive-backed sink. Folder hints become child folders of the configured
/// root (one per brand), created on first use.
pub struct DriveStore {
    client: drive_client::DriveClient,
    root_folder_id: String,
}

impl DriveStore {
    pub fn new(client: drive_client::DriveClient, root_folder_id: String) -> Self {
        Self {
            client,
            root_folder_id,
        }
    }

    async fn folder_for(&self, folder_hint: &str) -> Result<String> {
        if folder_hint.is_empty() {
            return Ok(self.root_folder_id.clone());
        }
        Ok(self
            .client
            .ensure_folder(folder_hint, &self.root_folder_id)
            .await?)
    }
}

#[async_trait]
impl ObjectStore for DriveStore {
    async fn find(&self, name: &str, folder_hint: &str) -> Result<Option<String>> {
        let folder_id = self.folder_for(folder_hint).await?;
        Ok(self.client.find_file(name, &folder_id).await?)
    }

    async fn store(&self, data: Bytes, name: &str, folder_hint: &str) -> Result<String> {
        let folder_id = self.folder_for(folder_hint).await?;
        Ok(self
            .client
            .upload(data, name, &folder_id, "image/jpeg")
            .await?)
    }
}

// ---------------------------------------------------------------------------
// CatalogStore — catalog persistence behind one trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // --- Items ---

    async fn insert_item_if_absent(&self, item: &CanonicalItem) -> Result<InsertOutcome>;

    async fn find_by_sku_key(&self, key: &str) -> Result<Option<Uuid>>;

    async fn find_by_brand_name(&self, brand_key: &str, name_key: &str) -> Result<Option<Uuid>>;

    async fn items_for_brand(&self, brand_key: &str) -> Result<Vec<ItemRef>>;

    async fn fill_missing(&self, id: Uuid, raw: &RawItem) -> Result<()>;

    async fn item_count(&self) -> Result<u64>;

    async fn items_missing_images(&self, min_images: u32, limit: u32)
        -> Result<Vec<CanonicalItem>>;

    // --- Images ---

    async fn insert_image(&self, image: &AcceptedImage) -> Result<()>;

    async fn image_hashes_for_item(&self, item_id: Uuid) -> Result<Vec<StoredImageHash>>;

    async fn image_url_known(&self, source_url: &str) -> Result<bool>;

    async fn image_count_for_item(&self, item_id: Uuid) -> Result<u32>;

    async fn image_count(&self) -> Result<u64>;

    // --- Prices ---

    async fn record_price(&self, obs: &PriceObservation) -> Result<()>;
}

#[async_trait]
impl CatalogStore for CatalogWriter {
    async fn insert_item_if_absent(&self, item: &CanonicalItem) -> Result<InsertOutcome> {
        CatalogWriter::insert_item_if_absent(self, item).await
    }

    async fn find_by_sku_key(&self, key: &str) -> Result<Option<Uuid>> {
        CatalogWriter::find_by_sku_key(self, key).await
    }

    async fn find_by_brand_name(&self, brand_key: &str, name_key: &str) -> Result<Option<Uuid>> {
        CatalogWriter::find_by_brand_name(self, brand_key, name_key).await
    }

    async fn items_for_brand(&self, brand_key: &str) -> Result<Vec<ItemRef>> {
        CatalogWriter::items_for_brand(self, brand_key).await
    }

    async fn fill_missing(&self, id: Uuid, raw: &RawItem) -> Result<()> {
        CatalogWriter::fill_missing(self, id, raw).await
    }

    async fn item_count(&self) -> Result<u64> {
        CatalogWriter::item_count(self).await
    }

    async fn items_missing_images(
        &self,
        min_images: u32,
        limit: u32,
    ) -> Result<Vec<CanonicalItem>> {
        CatalogWriter::items_missing_images(self, min_images, limit).await
    }

    async fn insert_image(&self, image: &AcceptedImage) -> Result<()> {
        CatalogWriter::insert_image(self, image).await
    }

    async fn image_hashes_for_item(&self, item_id: Uuid) -> Result<Vec<StoredImageHash>> {
        CatalogWriter::image_hashes_for_item(self, item_id).await
    }

    async fn image_url_known(&self, source_url: &str) -> Result<bool> {
        CatalogWriter::image_url_known(self, source_url).await
    }

    async fn image_count_for_item(&self, item_id: Uuid) -> Result<u32> {
        CatalogWriter::image_count_for_item(self, item_id).await
    }

    async fn image_count(&self) -> Result<u64> {
        CatalogWriter::image_count(self).await
    }

    async fn record_price(&self, obs: &PriceObservation) -> Result<()> {
        CatalogWriter::record_price(self, obs).await
    }
}
