pub mod client;
pub mod migrate;
pub mod writer;

pub use client::CatalogClient;
pub use migrate::migrate;
pub use writer::{CatalogWriter, InsertOutcome, ItemRef, StoredImageHash};
