use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use drive_client::DriveClient;
use scrapeninja_client::ScrapeNinjaClient;
use soledex_common::{CollectorConfig, Config};
use soledex_store::{migrate, CatalogClient, CatalogWriter};

use soledex_collector::adapters::{
    BingImageSearchAdapter, GoatAdapter, SneakerDbAdapter, StockxAdapter,
};
use soledex_collector::collector::Collector;
use soledex_collector::traits::{
    CatalogStore, DriveStore, HttpImageFetcher, ImageSource, ObjectStore, SourceAdapter,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("soledex=info".parse()?))
        .init();

    info!("Soledex collector starting...");

    let config = Config::from_env();
    let collector_config = CollectorConfig::default().with_env_overrides();

    let client = CatalogClient::connect(&config.database_url).await?;
    migrate(&client).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(CatalogWriter::new(client));

    // Sources. Each one is optional; the run proceeds with whatever is
    // configured.
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    let mut image_source: Option<Arc<dyn ImageSource>> = None;

    if config.sneakerdb_api_key.is_empty() {
        warn!("SNEAKERDB_API_KEY not set, skipping SneakerDB");
    } else {
        adapters.push(Arc::new(SneakerDbAdapter::new(
            config.sneakerdb_api_key.clone(),
        )));
    }

    if config.scrapeninja_api_key.is_empty() {
        warn!("SCRAPENINJA_API_KEY not set, skipping marketplace scraping and image search");
    } else {
        let proxy = Arc::new(ScrapeNinjaClient::new(config.scrapeninja_api_key.clone()));
        adapters.push(Arc::new(StockxAdapter::new(proxy.clone())));
        adapters.push(Arc::new(GoatAdapter::new(proxy.clone())));
        image_source = Some(Arc::new(BingImageSearchAdapter::new(proxy)));
    }

    if adapters.is_empty() {
        anyhow::bail!("No sources configured; set SNEAKERDB_API_KEY and/or SCRAPENINJA_API_KEY");
    }

    let sink: Option<Arc<dyn ObjectStore>> =
        if config.drive_token.is_empty() || config.drive_folder_id.is_empty() {
            warn!("Drive sink disabled (DRIVE_TOKEN / DRIVE_FOLDER_ID not set)");
            None
        } else {
            info!("Drive sink enabled");
            Some(Arc::new(DriveStore::new(
                DriveClient::new(config.drive_token.clone()),
                config.drive_folder_id.clone(),
            )))
        };

    let collector = Collector::new(
        adapters,
        image_source,
        store,
        Arc::new(HttpImageFetcher::new()),
        sink,
        collector_config.clone(),
    );

    // Interrupt → cooperative cancellation; in-flight items finish their
    // persist step and the report is still written.
    let cancel = collector.cancellation_token();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, cancelling run");
        cancel.cancel();
    })?;

    let report = collector.run().await;
    report.write_to(Path::new(&collector_config.report_path))?;
    info!(
        outcome = %report.outcome,
        path = collector_config.report_path.as_str(),
        "Run report written"
    );

    Ok(())
}
