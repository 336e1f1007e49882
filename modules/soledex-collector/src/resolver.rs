//! Entity resolution: decide whether a source sighting is a new catalog
//! entity or another view of an existing one.
//!
//! Ladder, cheapest first: exact normalized SKU, exact normalized
//! (brand, name), then normalized-substring containment within the same
//! brand. Source data does not warrant heavier fuzzy matching — token
//! containment is the documented behavior. Creation is an atomic
//! insert-if-absent; a worker losing that race falls back to the match
//! path.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use soledex_common::normalize::{name_contains, normalize_key, sku_key};
use soledex_common::{CanonicalItem, RawItem};
use soledex_store::InsertOutcome;

use crate::traits::CatalogStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The sighting matched an existing item; missing fields were filled.
    Matched(Uuid),
    /// A new item was created and persisted.
    Created(Uuid),
}

impl Resolution {
    pub fn item_id(&self) -> Uuid {
        match self {
            Resolution::Matched(id) | Resolution::Created(id) => *id,
        }
    }
}

pub struct EntityResolver {
    store: Arc<dyn CatalogStore>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, raw: &RawItem) -> Result<Resolution> {
        // 1. Exact SKU.
        if let Some(key) = raw.sku.as_deref().map(sku_key).filter(|k| !k.is_empty()) {
            if let Some(id) = self.store.find_by_sku_key(&key).await? {
                debug!(name = raw.name.as_str(), %id, "Resolved by SKU");
                self.store.fill_missing(id, raw).await?;
                return Ok(Resolution::Matched(id));
            }
        }

        // 2. Exact (brand, name).
        let brand_key = normalize_key(raw.brand.as_deref().unwrap_or(""));
        let name_key = normalize_key(&raw.name);
        if let Some(id) = self.store.find_by_brand_name(&brand_key, &name_key).await? {
            debug!(name = raw.name.as_str(), %id, "Resolved by brand+name");
            self.store.fill_missing(id, raw).await?;
            return Ok(Resolution::Matched(id));
        }

        // 3. Containment within the same brand.
        if !brand_key.is_empty() {
            for existing in self.store.items_for_brand(&brand_key).await? {
                if name_contains(&name_key, &existing.name_key) {
                    debug!(
                        name = raw.name.as_str(),
                        existing = existing.name_key.as_str(),
                        id = %existing.id,
                        "Resolved by name containment"
                    );
                    self.store.fill_missing(existing.id, raw).await?;
                    return Ok(Resolution::Matched(existing.id));
                }
            }
        }

        // 4. New entity. The item is persisted before any of its images
        // are processed so they can reference a stable id.
        let item = canonical_from_raw(raw);
        match self.store.insert_item_if_absent(&item).await? {
            InsertOutcome::Inserted(id) => Ok(Resolution::Created(id)),
            InsertOutcome::Exists(id) => {
                // Lost the race to a concurrent worker.
                self.store.fill_missing(id, raw).await?;
                Ok(Resolution::Matched(id))
            }
        }
    }
}

fn canonical_from_raw(raw: &RawItem) -> CanonicalItem {
    let now = Utc::now();
    CanonicalItem {
        id: Uuid::new_v4(),
        name: raw.name.clone(),
        brand: raw.brand.clone().unwrap_or_default(),
        model: raw.model.clone().unwrap_or_default(),
        colorway: raw.colorway.clone(),
        sku: raw.sku.clone(),
        retail_price: raw.retail_price,
        release_date: raw.release_date,
        description: raw.description.clone(),
        created_at: now,
        updated_at: now,
    }
}
