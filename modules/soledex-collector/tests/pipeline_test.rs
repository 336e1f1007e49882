//! End-to-end coordinator scenarios against the in-memory fakes: no
//! network, no database, deterministic.

use std::sync::Arc;
use std::time::Duration;

use soledex_collector::collector::Collector;
use soledex_collector::stats::RunOutcome;
use soledex_collector::terms;
use soledex_collector::testing::{
    png_bytes, split_image, FailingAdapter, FakeImageFetcher, FakeImageSource, MemoryCatalog,
    MemoryObjectStore, StaticAdapter,
};
use soledex_collector::traits::{CatalogStore, ImageSource, ObjectStore, SourceAdapter};
use soledex_common::{
    CollectorConfig, RawImageRef, RawItem, RetryConfig, SourceError, SourceLimits,
};

fn test_config() -> CollectorConfig {
    let mut config = CollectorConfig::default();
    config.workers = 2;
    config.deadline = Duration::from_secs(60);
    config.default_limits = SourceLimits {
        max_requests: 10_000,
        min_interval: Duration::ZERO,
    };
    config.retry = RetryConfig {
        max_attempts: 1,
        base_backoff: Duration::ZERO,
    };
    // Small fixtures: relax the photo-sized thresholds, keep the rest.
    config.quality.min_bytes = 64;
    config.quality.min_width = 32;
    config.quality.min_height = 32;
    config
}

fn raw_item(name: &str, brand: &str, refs: Vec<RawImageRef>) -> RawItem {
    RawItem {
        name: name.to_string(),
        brand: Some(brand.to_string()),
        marketplace: "static".to_string(),
        image_refs: refs,
        ..Default::default()
    }
}

fn image_ref(url: &str) -> RawImageRef {
    RawImageRef {
        url: url.to_string(),
        alt_text: None,
    }
}

struct Harness {
    store: Arc<MemoryCatalog>,
    fetcher: Arc<FakeImageFetcher>,
    sink: Arc<MemoryObjectStore>,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryCatalog::new()),
            fetcher: Arc::new(FakeImageFetcher::new()),
            sink: Arc::new(MemoryObjectStore::new()),
        }
    }

    fn collector(
        &self,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        image_source: Option<Arc<dyn ImageSource>>,
        config: CollectorConfig,
    ) -> Collector {
        let store: Arc<dyn CatalogStore> = self.store.clone();
        let sink: Arc<dyn ObjectStore> = self.sink.clone();
        Collector::new(
            adapters,
            image_source,
            store,
            self.fetcher.clone(),
            Some(sink),
            config,
        )
    }
}

#[tokio::test]
async fn running_the_same_source_twice_creates_no_duplicate_entities() {
    let harness = Harness::new();
    let items = vec![
        raw_item("Air Jordan 1 Chicago", "Nike", vec![]),
        raw_item("Dunk Low Panda", "Nike", vec![]),
    ];

    let first = harness.collector(
        vec![Arc::new(StaticAdapter::new("static", items.clone()))],
        None,
        test_config(),
    );
    let report = first.run().await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(harness.store.item_count().await.unwrap(), 2);
    assert_eq!(report.stats.items_accepted, 2);

    let second = harness.collector(
        vec![Arc::new(StaticAdapter::new("static", items))],
        None,
        test_config(),
    );
    let report = second.run().await;
    assert_eq!(harness.store.item_count().await.unwrap(), 2);
    assert_eq!(report.stats.items_accepted, 0);
    assert!(report.stats.items_enriched > 0);
}

#[tokio::test]
async fn source_ceiling_bounds_adapter_calls() {
    let harness = Harness::new();
    let adapter = Arc::new(StaticAdapter::new(
        "static",
        vec![raw_item("Air Max 90 Infrared", "Nike", vec![])],
    ));

    let mut config = test_config();
    config.source_limits.insert(
        "static".to_string(),
        SourceLimits {
            max_requests: 5,
            min_interval: Duration::ZERO,
        },
    );

    let collector = harness.collector(vec![adapter.clone()], None, config);
    let report = collector.run().await;

    let total_queries = terms::search_terms().len() as u32;
    assert_eq!(adapter.calls(), 5);
    assert_eq!(report.stats.budget_skipped, total_queries - 5);
    // Skipped queries are counted, not errored.
    assert_eq!(report.stats.errors, 0);
    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn fatal_source_error_exhausts_the_source() {
    let harness = Harness::new();
    let adapter = Arc::new(FailingAdapter::new("broken", || {
        SourceError::Auth("bad key".to_string())
    }));

    let mut config = test_config();
    config.workers = 1;

    let collector = harness.collector(vec![adapter.clone()], None, config);
    let report = collector.run().await;

    assert_eq!(adapter.calls(), 1);
    assert_eq!(report.stats.errors, 1);
    assert_eq!(
        report.stats.budget_skipped,
        terms::search_terms().len() as u32 - 1
    );
    // Partial source failure still completes the run with a report.
    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn images_flow_through_dedup_gate_and_sink() {
    let harness = Harness::new();

    let photo = png_bytes(&split_image(64, 64, 0.5));
    harness.fetcher.insert("https://cdn.example.com/aj1-a.png", photo.clone());
    // Same bytes under a different URL: must be rejected as a duplicate.
    harness.fetcher.insert("https://cdn.example.com/aj1-b.png", photo);
    // A perceptually distinct second shot: accepted.
    harness.fetcher.insert(
        "https://cdn.example.com/aj1-c.png",
        png_bytes(&split_image(64, 64, 0.2)),
    );

    let items = vec![raw_item(
        "Air Jordan 1 Chicago",
        "Nike",
        vec![
            image_ref("https://cdn.example.com/aj1-a.png"),
            image_ref("https://cdn.example.com/aj1-b.png"),
            image_ref("https://cdn.example.com/aj1-c.png"),
        ],
    )];

    let mut config = test_config();
    config.source_limits.insert(
        "static".to_string(),
        SourceLimits {
            max_requests: 1,
            min_interval: Duration::ZERO,
        },
    );

    let collector = harness.collector(
        vec![Arc::new(StaticAdapter::new("static", items))],
        None,
        config,
    );
    let report = collector.run().await;

    assert_eq!(report.stats.images_considered, 3);
    assert_eq!(report.stats.images_accepted, 2);
    assert_eq!(report.stats.duplicates_rejected, 1);

    let images = harness.store.images();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].role.as_str(), "primary");
    assert_eq!(images[1].role.as_str(), "detail");
    assert!(images.iter().all(|img| img.storage_ref.is_some()));
    assert_eq!(harness.sink.len(), 2);
}

#[tokio::test]
async fn sink_failure_persists_metadata_without_storage_ref() {
    let harness = Harness::new();
    harness.sink.fail_next(100);
    harness.fetcher.insert(
        "https://cdn.example.com/zebra.png",
        png_bytes(&split_image(64, 64, 0.5)),
    );

    let items = vec![raw_item(
        "Yeezy 350 Zebra",
        "Adidas",
        vec![image_ref("https://cdn.example.com/zebra.png")],
    )];

    let mut config = test_config();
    config.storage_retries = 1;
    config.source_limits.insert(
        "static".to_string(),
        SourceLimits {
            max_requests: 1,
            min_interval: Duration::ZERO,
        },
    );

    let collector = harness.collector(
        vec![Arc::new(StaticAdapter::new("static", items))],
        None,
        config,
    );
    let report = collector.run().await;

    assert_eq!(report.stats.images_accepted, 1);
    assert_eq!(report.stats.storage_failures, 1);
    // storage_retries=1 means one retry after the initial attempt.
    assert_eq!(harness.sink.store_calls(), 2);

    let images = harness.store.images();
    assert_eq!(images.len(), 1);
    assert!(images[0].storage_ref.is_none());
}

#[tokio::test]
async fn backfill_phase_fills_items_without_images() {
    let harness = Harness::new();
    harness.fetcher.insert(
        "https://cdn.example.com/found-1.png",
        png_bytes(&split_image(64, 64, 0.3)),
    );
    harness.fetcher.insert(
        "https://cdn.example.com/found-2.png",
        png_bytes(&split_image(64, 64, 0.7)),
    );

    let items = vec![raw_item("New Balance 550 White Green", "New Balance", vec![])];
    let image_source = Arc::new(FakeImageSource::new(
        "fake-images",
        vec![
            image_ref("https://cdn.example.com/found-1.png"),
            image_ref("https://cdn.example.com/found-2.png"),
        ],
    ));

    let mut config = test_config();
    config.source_limits.insert(
        "static".to_string(),
        SourceLimits {
            max_requests: 1,
            min_interval: Duration::ZERO,
        },
    );

    let collector = harness.collector(
        vec![Arc::new(StaticAdapter::new("static", items))],
        Some(image_source.clone()),
        config,
    );
    let report = collector.run().await;

    assert_eq!(image_source.calls(), 1);
    assert_eq!(report.stats.images_accepted, 2);
    assert_eq!(harness.store.image_count().await.unwrap(), 2);
}

#[tokio::test]
async fn item_target_stops_dispatch_early() {
    let harness = Harness::new();
    let adapter = Arc::new(StaticAdapter::new(
        "static",
        vec![raw_item("Gazelle Bold Pink", "Adidas", vec![])],
    ));

    let mut config = test_config();
    config.workers = 1;
    config.item_target = 1;

    let collector = harness.collector(vec![adapter.clone()], None, config);
    let report = collector.run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(adapter.calls(), 1);
    assert_eq!(report.stats.items_accepted, 1);
}

#[tokio::test]
async fn cancelled_run_reports_exactly_what_was_committed() {
    let harness = Harness::new();
    let adapter = Arc::new(StaticAdapter::new(
        "static",
        vec![raw_item("Superstar Cloud White", "Adidas", vec![])],
    ));

    let collector = harness.collector(vec![adapter.clone()], None, test_config());
    collector.cancellation_token().cancel();
    let report = collector.run().await;

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(adapter.calls(), 0);
    // The report matches the catalog exactly: nothing dispatched,
    // nothing committed.
    assert_eq!(
        report.stats.items_accepted as u64,
        harness.store.item_count().await.unwrap()
    );
}

#[tokio::test]
async fn accepted_count_always_matches_the_catalog() {
    let harness = Harness::new();
    let items = vec![
        raw_item("Air Force 1 Triple White", "Nike", vec![]),
        raw_item("Old Skool Black", "Vans", vec![]),
        raw_item("Suede Classic Red", "Puma", vec![]),
    ];

    let collector = harness.collector(
        vec![Arc::new(StaticAdapter::new("static", items))],
        None,
        test_config(),
    );
    let report = collector.run().await;

    assert_eq!(
        report.stats.items_accepted as u64,
        harness.store.item_count().await.unwrap()
    );
    assert_eq!(
        report.stats.images_accepted as u64,
        harness.store.image_count().await.unwrap()
    );
}
