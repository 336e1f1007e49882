use anyhow::Result;
use tracing::info;

use crate::client::CatalogClient;

/// Idempotent schema migration. Every statement is CREATE IF NOT EXISTS,
/// so re-running on an existing database is a no-op.
pub async fn migrate(client: &CatalogClient) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            brand         TEXT NOT NULL DEFAULT '',
            model         TEXT NOT NULL DEFAULT '',
            colorway      TEXT,
            sku           TEXT,
            retail_price  REAL,
            release_date  TEXT,
            description   TEXT,
            name_key      TEXT NOT NULL,
            brand_key     TEXT NOT NULL,
            sku_key       TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        )
        "#,
        // Uniqueness backing the entity resolver's insert-if-absent:
        // normalized (brand, name) pair, and normalized SKU when present.
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_items_brand_name
            ON items (brand_key, name_key)
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_items_sku
            ON items (sku_key) WHERE sku_key IS NOT NULL
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id           TEXT PRIMARY KEY,
            item_id      TEXT NOT NULL REFERENCES items (id),
            source_url   TEXT NOT NULL,
            byte_hash    TEXT NOT NULL,
            ahash        INTEGER NOT NULL,
            dhash        INTEGER NOT NULL,
            width        INTEGER NOT NULL,
            height       INTEGER NOT NULL,
            byte_size    INTEGER NOT NULL,
            storage_ref  TEXT,
            role         TEXT NOT NULL,
            created_at   TEXT NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ix_images_item ON images (item_id)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ix_images_byte_hash ON images (byte_hash)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ix_images_source_url ON images (source_url)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS price_history (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id      TEXT NOT NULL REFERENCES items (id),
            marketplace  TEXT NOT NULL,
            price        REAL NOT NULL,
            currency     TEXT NOT NULL DEFAULT 'USD',
            observed_at  TEXT NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ix_price_history_item ON price_history (item_id)
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(client.pool()).await?;
    }

    info!("Catalog schema migration complete");
    Ok(())
}
