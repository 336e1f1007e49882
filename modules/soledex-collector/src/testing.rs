//! In-memory fakes for deterministic pipeline tests: no network, no
//! database. Semantics mirror the real store closely enough that the
//! resolver and coordinator tests exercise the same code paths either
//! way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GrayImage, Luma};
use uuid::Uuid;

use soledex_common::normalize::{normalize_key, sku_key};
use soledex_common::{
    AcceptedImage, CanonicalItem, PriceObservation, RawImageRef, RawItem, SourceError,
};
use soledex_store::{InsertOutcome, ItemRef, StoredImageHash};

use crate::traits::{CatalogStore, ImageFetcher, ImageSource, ObjectStore, SourceAdapter};

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

struct StoredItem {
    item: CanonicalItem,
    name_key: String,
    brand_key: String,
    sku_key: Option<String>,
}

#[derive(Default)]
struct CatalogInner {
    items: Vec<StoredItem>,
    images: Vec<AcceptedImage>,
    prices: Vec<PriceObservation>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<CatalogInner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<CanonicalItem> {
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .iter()
            .find(|s| s.item.id == id)
            .map(|s| s.item.clone())
    }

    pub fn images(&self) -> Vec<AcceptedImage> {
        self.inner.lock().unwrap().images.clone()
    }

    pub fn prices(&self) -> Vec<PriceObservation> {
        self.inner.lock().unwrap().prices.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn insert_item_if_absent(&self, item: &CanonicalItem) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let name_key = normalize_key(&item.name);
        let brand_key = normalize_key(&item.brand);
        let item_sku_key = item.sku.as_deref().map(sku_key).filter(|k| !k.is_empty());

        for stored in &inner.items {
            let sku_hit = matches!((&item_sku_key, &stored.sku_key), (Some(a), Some(b)) if a == b);
            if sku_hit || (stored.brand_key == brand_key && stored.name_key == name_key) {
                return Ok(InsertOutcome::Exists(stored.item.id));
            }
        }

        inner.items.push(StoredItem {
            item: item.clone(),
            name_key,
            brand_key,
            sku_key: item_sku_key,
        });
        Ok(InsertOutcome::Inserted(item.id))
    }

    async fn find_by_sku_key(&self, key: &str) -> Result<Option<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .items
            .iter()
            .find(|s| s.sku_key.as_deref() == Some(key))
            .map(|s| s.item.id))
    }

    async fn find_by_brand_name(&self, brand_key: &str, name_key: &str) -> Result<Option<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .items
            .iter()
            .find(|s| s.brand_key == brand_key && s.name_key == name_key)
            .map(|s| s.item.id))
    }

    async fn items_for_brand(&self, brand_key: &str) -> Result<Vec<ItemRef>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .items
            .iter()
            .filter(|s| s.brand_key == brand_key)
            .map(|s| ItemRef {
                id: s.item.id,
                name_key: s.name_key.clone(),
            })
            .collect())
    }

    async fn fill_missing(&self, id: Uuid, raw: &RawItem) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(stored) = inner.items.iter_mut().find(|s| s.item.id == id) else {
            anyhow::bail!("no item {id}");
        };
        let item = &mut stored.item;

        if item.model.is_empty() {
            if let Some(model) = &raw.model {
                item.model = model.clone();
            }
        }
        if item.colorway.is_none() {
            item.colorway = raw.colorway.clone();
        }
        if item.sku.is_none() {
            item.sku = raw.sku.clone();
            stored.sku_key = raw.sku.as_deref().map(sku_key).filter(|k| !k.is_empty());
        }
        if item.retail_price.is_none() {
            item.retail_price = raw.retail_price;
        }
        if item.release_date.is_none() {
            item.release_date = raw.release_date;
        }
        if item.description.is_none() {
            item.description = raw.description.clone();
        }
        Ok(())
    }

    async fn item_count(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().items.len() as u64)
    }

    async fn items_missing_images(
        &self,
        min_images: u32,
        limit: u32,
    ) -> Result<Vec<CanonicalItem>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .items
            .iter()
            .filter(|s| {
                let count = inner
                    .images
                    .iter()
                    .filter(|img| img.item_id == s.item.id)
                    .count() as u32;
                count < min_images
            })
            .take(limit as usize)
            .map(|s| s.item.clone())
            .collect())
    }

    async fn insert_image(&self, image: &AcceptedImage) -> Result<()> {
        self.inner.lock().unwrap().images.push(image.clone());
        Ok(())
    }

    async fn image_hashes_for_item(&self, item_id: Uuid) -> Result<Vec<StoredImageHash>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .images
            .iter()
            .filter(|img| img.item_id == item_id)
            .map(|img| StoredImageHash {
                image_id: img.id,
                byte_hash: img.byte_hash.clone(),
                ahash: img.ahash,
                dhash: img.dhash,
            })
            .collect())
    }

    async fn image_url_known(&self, source_url: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.images.iter().any(|img| img.source_url == source_url))
    }

    async fn image_count_for_item(&self, item_id: Uuid) -> Result<u32> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .images
            .iter()
            .filter(|img| img.item_id == item_id)
            .count() as u32)
    }

    async fn image_count(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().images.len() as u64)
    }

    async fn record_price(&self, obs: &PriceObservation) -> Result<()> {
        self.inner.lock().unwrap().prices.push(obs.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Returns the same canned items for every query.
pub struct StaticAdapter {
    id: String,
    items: Vec<RawItem>,
    calls: AtomicU32,
}

impl StaticAdapter {
    pub fn new(id: &str, items: Vec<RawItem>) -> Self {
        Self {
            id: id.to_string(),
            items,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, _query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}

/// Fails every fetch with the error produced by the factory.
pub struct FailingAdapter {
    id: String,
    make_error: fn() -> SourceError,
    calls: AtomicU32,
}

impl FailingAdapter {
    pub fn new(id: &str, make_error: fn() -> SourceError) -> Self {
        Self {
            id: id.to_string(),
            make_error,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for FailingAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, _query: &str, _limit: usize) -> Result<Vec<RawItem>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.make_error)())
    }
}

/// Returns the same canned refs for every item.
pub struct FakeImageSource {
    id: String,
    refs: Vec<RawImageRef>,
    calls: AtomicU32,
}

impl FakeImageSource {
    pub fn new(id: &str, refs: Vec<RawImageRef>) -> Self {
        Self {
            id: id.to_string(),
            refs,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for FakeImageSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search_images(
        &self,
        _item: &CanonicalItem,
        limit: usize,
    ) -> Result<Vec<RawImageRef>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.refs.iter().take(limit).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Image fetcher / object store
// ---------------------------------------------------------------------------

/// Serves bytes from a URL → bytes map; unknown URLs are NotFound.
#[derive(Default)]
pub struct FakeImageFetcher {
    responses: Mutex<HashMap<String, Bytes>>,
}

impl FakeImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::from(bytes));
    }
}

#[async_trait]
impl ImageFetcher for FakeImageFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, SourceError> {
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(SourceError::NotFound)
    }
}

/// In-memory blob sink with injectable transient failures.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), String>>,
    fail_remaining: AtomicU32,
    stores: AtomicU32,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` store calls fail.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn store_calls(&self) -> u32 {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn find(&self, name: &str, folder_hint: &str) -> Result<Option<String>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .get(&(folder_hint.to_string(), name.to_string()))
            .cloned())
    }

    async fn store(&self, _data: Bytes, name: &str, folder_hint: &str) -> Result<String> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("sink unavailable");
        }
        let mut objects = self.objects.lock().unwrap();
        let external_id = format!("obj-{}", objects.len() + 1);
        objects.insert(
            (folder_hint.to_string(), name.to_string()),
            external_id.clone(),
        );
        Ok(external_id)
    }
}

// ---------------------------------------------------------------------------
// Image fixtures
// ---------------------------------------------------------------------------

/// Encode to PNG in memory, the way candidates arrive off the wire.
pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("png encode");
    buf
}

/// A sharp, non-busy test photo: dark left of the split, light right.
/// Different split fractions produce perceptually distinct images.
pub fn split_image(width: u32, height: u32, split_frac: f32) -> DynamicImage {
    let split = ((width as f32) * split_frac) as u32;
    let img = GrayImage::from_fn(width, height, |x, _| {
        if x < split {
            Luma([10])
        } else {
            Luma([240])
        }
    });
    DynamicImage::ImageLuma8(img)
}
