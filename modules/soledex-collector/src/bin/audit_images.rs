//! Read-only audit over the stored image hashes: finds byte-identical
//! and perceptually near-duplicate groups across the whole catalog,
//! including cross-item duplicates the per-item invariant cannot see.

use std::collections::HashMap;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use soledex_collector::dedup::hamming;
use soledex_store::{migrate, CatalogClient, CatalogWriter, StoredImageHash};

#[derive(Parser)]
#[command(about = "Audit stored catalog images for duplicates")]
struct Args {
    /// Catalog database URL.
    #[arg(long, default_value = "sqlite://sneakers.db")]
    database_url: String,

    /// Hamming threshold (bits out of 64); both hash variants must be
    /// within it.
    #[arg(long, default_value_t = 5)]
    max_hamming: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("soledex=info".parse()?))
        .init();

    let args = Args::parse();

    let client = CatalogClient::connect(&args.database_url).await?;
    migrate(&client).await?;
    let writer = CatalogWriter::new(client);

    let all = writer.all_image_hashes().await?;
    info!(images = all.len(), "Loaded image hashes");

    let exact_groups = exact_duplicate_groups(&all);
    let near_groups = near_duplicate_groups(&all, args.max_hamming);

    println!("=== Image Audit ===");
    println!("Images scanned:        {}", all.len());
    println!("Byte-identical groups: {}", exact_groups.len());
    println!("Near-duplicate groups: {}", near_groups.len());

    for (hash, members) in &exact_groups {
        println!("\nbyte-identical ({} images, hash {}…):", members.len(), &hash[..12]);
        for (item_id, image_id) in members {
            println!("  item {item_id}  image {image_id}");
        }
    }

    for group in &near_groups {
        println!("\nnear-duplicate ({} images):", group.len());
        for (item_id, image_id) in group {
            println!("  item {item_id}  image {image_id}");
        }
    }

    Ok(())
}

fn exact_duplicate_groups(all: &[(Uuid, StoredImageHash)]) -> Vec<(String, Vec<(Uuid, Uuid)>)> {
    let mut by_hash: HashMap<&str, Vec<(Uuid, Uuid)>> = HashMap::new();
    for (item_id, hash) in all {
        by_hash
            .entry(hash.byte_hash.as_str())
            .or_default()
            .push((*item_id, hash.image_id));
    }

    let mut groups: Vec<(String, Vec<(Uuid, Uuid)>)> = by_hash
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(hash, members)| (hash.to_string(), members))
        .collect();
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    groups
}

/// Greedy grouping: each image joins the first group it is within the
/// threshold of, on both hash variants.
fn near_duplicate_groups(
    all: &[(Uuid, StoredImageHash)],
    max_hamming: u32,
) -> Vec<Vec<(Uuid, Uuid)>> {
    let mut grouped = vec![false; all.len()];
    let mut groups = Vec::new();

    for i in 0..all.len() {
        if grouped[i] {
            continue;
        }
        let mut members = vec![(all[i].0, all[i].1.image_id)];
        grouped[i] = true;

        for j in (i + 1)..all.len() {
            if grouped[j] {
                continue;
            }
            // Skip byte-identical pairs; the exact report covers them.
            if all[i].1.byte_hash == all[j].1.byte_hash {
                continue;
            }
            if hamming(all[i].1.ahash, all[j].1.ahash) <= max_hamming
                && hamming(all[i].1.dhash, all[j].1.dhash) <= max_hamming
            {
                members.push((all[j].0, all[j].1.image_id));
                grouped[j] = true;
            }
        }

        if members.len() > 1 {
            groups.push(members);
        }
    }

    groups
}
