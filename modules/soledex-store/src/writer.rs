use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use soledex_common::normalize::{normalize_key, sku_key};
use soledex_common::{AcceptedImage, CanonicalItem, PriceObservation, RawItem};

use crate::client::CatalogClient;

/// Outcome of an atomic insert-if-absent against the unique item keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Uuid),
    /// Another sighting (possibly a concurrent worker) got there first.
    Exists(Uuid),
}

/// Minimal item projection used by the resolver's fuzzy pass.
#[derive(Debug, Clone)]
pub struct ItemRef {
    pub id: Uuid,
    pub name_key: String,
}

/// Hashes of one persisted image, as loaded for dedup comparison.
#[derive(Debug, Clone)]
pub struct StoredImageHash {
    pub image_id: Uuid,
    pub byte_hash: String,
    pub ahash: u64,
    pub dhash: u64,
}

/// All catalog reads and writes used by the pipeline.
#[derive(Clone)]
pub struct CatalogWriter {
    client: CatalogClient,
}

impl CatalogWriter {
    pub fn new(client: CatalogClient) -> Self {
        Self { client }
    }

    // --- Items ---

    /// Insert a new item unless one already exists under the same unique
    /// keys. INSERT OR IGNORE rides on the unique indexes, so two workers
    /// racing on the same (brand, name) key cannot both succeed; the
    /// loser observes `Exists`.
    pub async fn insert_item_if_absent(&self, item: &CanonicalItem) -> Result<InsertOutcome> {
        let name_key = normalize_key(&item.name);
        let brand_key = normalize_key(&item.brand);
        let item_sku_key = item.sku.as_deref().map(sku_key).filter(|k| !k.is_empty());

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO items
                (id, name, brand, model, colorway, sku, retail_price, release_date,
                 description, name_key, brand_key, sku_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.name)
        .bind(&item.brand)
        .bind(&item.model)
        .bind(&item.colorway)
        .bind(&item.sku)
        .bind(item.retail_price)
        .bind(item.release_date)
        .bind(&item.description)
        .bind(&name_key)
        .bind(&brand_key)
        .bind(&item_sku_key)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(self.client.pool())
        .await?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted(item.id));
        }

        // Lost the race or a duplicate sighting: resolve to the existing row.
        if let Some(key) = &item_sku_key {
            if let Some(id) = self.find_by_sku_key(key).await? {
                return Ok(InsertOutcome::Exists(id));
            }
        }
        match self.find_by_brand_name(&brand_key, &name_key).await? {
            Some(id) => Ok(InsertOutcome::Exists(id)),
            None => anyhow::bail!(
                "insert ignored but no existing item found for '{}' / '{}'",
                brand_key,
                name_key
            ),
        }
    }

    pub async fn find_by_sku_key(&self, key: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM items WHERE sku_key = ?")
            .bind(key)
            .fetch_optional(self.client.pool())
            .await?;
        row.map(|r| parse_uuid(r.try_get::<String, _>("id")?)).transpose()
    }

    pub async fn find_by_brand_name(&self, brand_key: &str, name_key: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM items WHERE brand_key = ? AND name_key = ?")
            .bind(brand_key)
            .bind(name_key)
            .fetch_optional(self.client.pool())
            .await?;
        row.map(|r| parse_uuid(r.try_get::<String, _>("id")?)).transpose()
    }

    /// All items of one brand, for the resolver's containment pass.
    pub async fn items_for_brand(&self, brand_key: &str) -> Result<Vec<ItemRef>> {
        let rows = sqlx::query("SELECT id, name_key FROM items WHERE brand_key = ?")
            .bind(brand_key)
            .fetch_all(self.client.pool())
            .await?;

        rows.into_iter()
            .map(|r| {
                Ok(ItemRef {
                    id: parse_uuid(r.try_get::<String, _>("id")?)?,
                    name_key: r.try_get("name_key")?,
                })
            })
            .collect()
    }

    /// Fill fields that are still empty on an existing item from a new
    /// sighting. Populated fields are never overwritten, so a sparse
    /// source cannot clobber a richer one.
    pub async fn fill_missing(&self, id: Uuid, raw: &RawItem) -> Result<()> {
        let raw_sku_key = raw.sku.as_deref().map(sku_key).filter(|k| !k.is_empty());

        sqlx::query(
            r#"
            UPDATE items SET
                model        = CASE WHEN model = '' THEN COALESCE(?, model) ELSE model END,
                colorway     = COALESCE(colorway, ?),
                sku          = COALESCE(sku, ?),
                sku_key      = COALESCE(sku_key, ?),
                retail_price = COALESCE(retail_price, ?),
                release_date = COALESCE(release_date, ?),
                description  = COALESCE(description, ?),
                updated_at   = ?
            WHERE id = ?
            "#,
        )
        .bind(&raw.model)
        .bind(&raw.colorway)
        .bind(&raw.sku)
        .bind(&raw_sku_key)
        .bind(raw.retail_price)
        .bind(raw.release_date)
        .bind(&raw.description)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(self.client.pool())
        .await?;

        Ok(())
    }

    pub async fn get_item(&self, id: Uuid) -> Result<Option<CanonicalItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, brand, model, colorway, sku, retail_price,
                   release_date, description, created_at, updated_at
            FROM items WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.client.pool())
        .await?;

        row.map(item_from_row).transpose()
    }

    pub async fn item_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM items")
            .fetch_one(self.client.pool())
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    /// Items with fewer than `min_images` accepted images, oldest first.
    /// Drives the image-backfill phase.
    pub async fn items_missing_images(&self, min_images: u32, limit: u32) -> Result<Vec<CanonicalItem>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.name, i.brand, i.model, i.colorway, i.sku, i.retail_price,
                   i.release_date, i.description, i.created_at, i.updated_at
            FROM items i
            LEFT JOIN images im ON im.item_id = i.id
            GROUP BY i.id
            HAVING COUNT(im.id) < ?
            ORDER BY i.created_at ASC
            LIMIT ?
            "#,
        )
        .bind(min_images as i64)
        .bind(limit as i64)
        .fetch_all(self.client.pool())
        .await?;

        rows.into_iter().map(item_from_row).collect()
    }

    // --- Images ---

    pub async fn insert_image(&self, image: &AcceptedImage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO images
                (id, item_id, source_url, byte_hash, ahash, dhash, width, height,
                 byte_size, storage_ref, role, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(image.id.to_string())
        .bind(image.item_id.to_string())
        .bind(&image.source_url)
        .bind(&image.byte_hash)
        .bind(image.ahash as i64)
        .bind(image.dhash as i64)
        .bind(image.width as i64)
        .bind(image.height as i64)
        .bind(image.byte_size as i64)
        .bind(&image.storage_ref)
        .bind(image.role.as_str())
        .bind(image.created_at)
        .execute(self.client.pool())
        .await?;

        Ok(())
    }

    /// Hashes of every accepted image for one item.
    pub async fn image_hashes_for_item(&self, item_id: Uuid) -> Result<Vec<StoredImageHash>> {
        let rows = sqlx::query("SELECT id, byte_hash, ahash, dhash FROM images WHERE item_id = ?")
            .bind(item_id.to_string())
            .fetch_all(self.client.pool())
            .await?;

        rows.into_iter().map(hash_from_row).collect()
    }

    /// Hashes of every accepted image in the catalog, with owning item.
    /// Used by the audit binary, not the hot path.
    pub async fn all_image_hashes(&self) -> Result<Vec<(Uuid, StoredImageHash)>> {
        let rows = sqlx::query("SELECT id, item_id, byte_hash, ahash, dhash FROM images")
            .fetch_all(self.client.pool())
            .await?;

        rows.into_iter()
            .map(|r| {
                let item_id = parse_uuid(r.try_get::<String, _>("item_id")?)?;
                Ok((item_id, hash_from_row(r)?))
            })
            .collect()
    }

    /// Cheap pre-download check: has this source URL already been accepted?
    pub async fn image_url_known(&self, source_url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS x FROM images WHERE source_url = ? LIMIT 1")
            .bind(source_url)
            .fetch_optional(self.client.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn image_count_for_item(&self, item_id: Uuid) -> Result<u32> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM images WHERE item_id = ?")
            .bind(item_id.to_string())
            .fetch_one(self.client.pool())
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u32)
    }

    pub async fn image_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM images")
            .fetch_one(self.client.pool())
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    pub async fn set_storage_ref(&self, image_id: Uuid, storage_ref: &str) -> Result<()> {
        sqlx::query("UPDATE images SET storage_ref = ? WHERE id = ?")
            .bind(storage_ref)
            .bind(image_id.to_string())
            .execute(self.client.pool())
            .await?;
        Ok(())
    }

    // --- Prices ---

    pub async fn record_price(&self, obs: &PriceObservation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_history (item_id, marketplace, price, currency, observed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(obs.item_id.to_string())
        .bind(&obs.marketplace)
        .bind(obs.price)
        .bind(&obs.currency)
        .bind(obs.observed_at)
        .execute(self.client.pool())
        .await?;
        Ok(())
    }
}

fn parse_uuid(s: String) -> Result<Uuid> {
    Ok(Uuid::parse_str(&s)?)
}

fn item_from_row(row: sqlx::sqlite::SqliteRow) -> Result<CanonicalItem> {
    Ok(CanonicalItem {
        id: parse_uuid(row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        brand: row.try_get("brand")?,
        model: row.try_get("model")?,
        colorway: row.try_get("colorway")?,
        sku: row.try_get("sku")?,
        retail_price: row.try_get("retail_price")?,
        release_date: row.try_get("release_date")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn hash_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StoredImageHash> {
    Ok(StoredImageHash {
        image_id: parse_uuid(row.try_get::<String, _>("id")?)?,
        byte_hash: row.try_get("byte_hash")?,
        ahash: row.try_get::<i64, _>("ahash")? as u64,
        dhash: row.try_get::<i64, _>("dhash")? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate;
    use soledex_common::ImageRole;

    async fn writer() -> CatalogWriter {
        let client = CatalogClient::in_memory().await.unwrap();
        migrate(&client).await.unwrap();
        CatalogWriter::new(client)
    }

    fn item(name: &str, brand: &str, sku: Option<&str>) -> CanonicalItem {
        let now = Utc::now();
        CanonicalItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            brand: brand.to_string(),
            model: String::new(),
            colorway: None,
            sku: sku.map(|s| s.to_string()),
            retail_price: None,
            release_date: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn second_insert_with_same_keys_resolves_to_existing() {
        let writer = writer().await;

        let first = item("Air Jordan 1 Chicago", "Nike", None);
        let outcome = writer.insert_item_if_absent(&first).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(first.id));

        let second = item("air jordan 1  chicago", "NIKE", None);
        let outcome = writer.insert_item_if_absent(&second).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Exists(first.id));

        assert_eq!(writer.item_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sku_collision_wins_over_differing_names() {
        let writer = writer().await;

        let first = item("Air Jordan 1 Retro High OG", "Nike", Some("DZ5485-612"));
        writer.insert_item_if_absent(&first).await.unwrap();

        let second = item("Jordan 1 High Chicago Lost and Found", "Nike", Some("dz5485 612"));
        let outcome = writer.insert_item_if_absent(&second).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Exists(first.id));
    }

    #[tokio::test]
    async fn fill_missing_never_overwrites_populated_fields() {
        let writer = writer().await;

        let mut first = item("Dunk Low Panda", "Nike", None);
        first.retail_price = Some(110.0);
        writer.insert_item_if_absent(&first).await.unwrap();

        let raw = RawItem {
            name: "Dunk Low Panda".to_string(),
            retail_price: Some(999.0),
            description: Some("Black and white colorway".to_string()),
            ..Default::default()
        };
        writer.fill_missing(first.id, &raw).await.unwrap();

        let loaded = writer.get_item(first.id).await.unwrap().unwrap();
        assert_eq!(loaded.retail_price, Some(110.0));
        assert_eq!(loaded.description.as_deref(), Some("Black and white colorway"));
    }

    #[tokio::test]
    async fn image_hashes_round_trip_including_high_bit() {
        let writer = writer().await;

        let owner = item("Yeezy 350 Zebra", "Adidas", None);
        writer.insert_item_if_absent(&owner).await.unwrap();

        let image = AcceptedImage {
            id: Uuid::new_v4(),
            item_id: owner.id,
            source_url: "https://img.example.com/zebra.jpg".to_string(),
            byte_hash: "abc123".to_string(),
            ahash: u64::MAX - 5,
            dhash: 0x8000_0000_0000_0001,
            width: 800,
            height: 600,
            byte_size: 123_456,
            storage_ref: None,
            role: ImageRole::Primary,
            created_at: Utc::now(),
        };
        writer.insert_image(&image).await.unwrap();

        let hashes = writer.image_hashes_for_item(owner.id).await.unwrap();
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes[0].ahash, u64::MAX - 5);
        assert_eq!(hashes[0].dhash, 0x8000_0000_0000_0001);
        assert!(writer
            .image_url_known("https://img.example.com/zebra.jpg")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_images_query_excludes_covered_items() {
        let writer = writer().await;

        let covered = item("Air Max 90 Infrared", "Nike", None);
        let uncovered = item("Gazelle Bold Pink", "Adidas", None);
        writer.insert_item_if_absent(&covered).await.unwrap();
        writer.insert_item_if_absent(&uncovered).await.unwrap();

        for i in 0..3 {
            let image = AcceptedImage {
                id: Uuid::new_v4(),
                item_id: covered.id,
                source_url: format!("https://img.example.com/am90-{i}.jpg"),
                byte_hash: format!("hash-{i}"),
                ahash: i,
                dhash: i,
                width: 640,
                height: 480,
                byte_size: 10_000,
                storage_ref: None,
                role: ImageRole::Detail,
                created_at: Utc::now(),
            };
            writer.insert_image(&image).await.unwrap();
        }

        let missing = writer.items_missing_images(3, 10).await.unwrap();
        let ids: Vec<Uuid> = missing.iter().map(|i| i.id).collect();
        assert!(ids.contains(&uncovered.id));
        assert!(!ids.contains(&covered.id));
    }
}
