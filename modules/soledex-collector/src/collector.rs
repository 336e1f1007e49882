//! The ingestion coordinator. Pulls (source, query) work items through a
//! bounded worker pool; each worker runs one full adapter fetch →
//! resolve → per-image dedup/gate → persist sequence, then the fold loop
//! merges its outcome into the run stats. Deadline and stop signal share
//! one cancellation token checked between work items, never mid-item.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use soledex_common::normalize::sanitize_url;
use soledex_common::{
    AcceptedImage, CanonicalItem, CollectorConfig, ErrorClass, ImageRole, PriceObservation,
    RawImageRef, RawItem,
};
use soledex_store::StoredImageHash;

use crate::budget::{Acquire, BudgetTracker};
use crate::dedup::{self, DedupVerdict, GlobalHashWindow};
use crate::quality::{QualityGate, Rejection};
use crate::resolver::{EntityResolver, Resolution};
use crate::retry::RetryPolicy;
use crate::stats::{BudgetLine, RunOutcome, RunReport, RunStats};
use crate::terms;
use crate::traits::{CatalogStore, ImageFetcher, ImageSource, ObjectStore, SourceAdapter};

/// Items taken from one adapter per query.
const ITEMS_PER_QUERY: usize = 10;
/// Image-search results requested per backfilled item.
const IMAGE_SEARCH_LIMIT: usize = 5;
/// Upper bound on items pulled into the backfill phase per run.
const BACKFILL_BATCH: u32 = 500;

pub struct Collector {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    image_source: Option<Arc<dyn ImageSource>>,
    store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn ImageFetcher>,
    sink: Option<Arc<dyn ObjectStore>>,
    resolver: EntityResolver,
    budget: BudgetTracker,
    retry: RetryPolicy,
    gate: QualityGate,
    window: GlobalHashWindow,
    config: CollectorConfig,
    cancel: CancellationToken,
}

impl Collector {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        image_source: Option<Arc<dyn ImageSource>>,
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn ImageFetcher>,
        sink: Option<Arc<dyn ObjectStore>>,
        config: CollectorConfig,
    ) -> Self {
        let budget = BudgetTracker::new(config.default_limits);
        for adapter in &adapters {
            budget.register(adapter.id(), config.limits_for(adapter.id()));
        }
        if let Some(source) = &image_source {
            budget.register(source.id(), config.limits_for(source.id()));
        }

        Self {
            resolver: EntityResolver::new(store.clone()),
            budget,
            retry: RetryPolicy::new(config.retry),
            gate: QualityGate::new(config.quality.clone()),
            window: GlobalHashWindow::new(config.dedup.global_window),
            adapters,
            image_source,
            store,
            fetcher,
            sink,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token shared by the deadline watchdog and external stop signals
    /// (process interrupt). Cancelling it stops dispatch of new work;
    /// in-flight items finish their persist step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one full collection cycle. Never raises past this boundary:
    /// every failure is folded into the report.
    pub async fn run(&self) -> RunReport {
        let started_at = Utc::now();
        let mut stats = RunStats::default();
        let mut targets_reached = false;
        let mut failed = false;

        info!(
            adapters = self.adapters.len(),
            item_target = self.config.item_target,
            image_target = self.config.image_target,
            deadline_secs = self.config.deadline.as_secs(),
            "Collection run starting"
        );

        let watchdog = {
            let cancel = self.cancel.clone();
            let deadline = self.config.deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!("Run deadline elapsed, cancelling");
                cancel.cancel();
            })
        };

        // Phase 1: metadata + inline images, one work item per
        // (adapter, search term) pair.
        info!("Phase 1: metadata collection");
        let worklist: Vec<(Arc<dyn SourceAdapter>, String)> = terms::search_terms()
            .into_iter()
            .flat_map(|term| {
                self.adapters
                    .iter()
                    .map(move |a| (a.clone(), term.to_string()))
            })
            .collect();

        let mut results = stream::iter(
            worklist
                .into_iter()
                .filter(|_| !self.cancel.is_cancelled())
                .map(|(adapter, query)| self.process_work_item(adapter, query)),
        )
        .buffer_unordered(self.config.workers.max(1));

        while let Some(delta) = results.next().await {
            stats.merge(delta);
            if !targets_reached && self.targets_reached(&stats) {
                info!(
                    items = stats.items_accepted,
                    images = stats.images_accepted,
                    "Collection targets reached"
                );
                targets_reached = true;
                self.cancel.cancel();
            }
        }

        // Phase 2: image backfill for items still under the per-item cap.
        if self.image_source.is_some() && !self.cancel.is_cancelled() {
            info!("Phase 2: image backfill");
            match self
                .store
                .items_missing_images(self.config.images_per_item, BACKFILL_BATCH)
                .await
            {
                Ok(items) => {
                    let mut results = stream::iter(
                        items
                            .into_iter()
                            .filter(|_| !self.cancel.is_cancelled())
                            .map(|item| self.process_backfill_item(item)),
                    )
                    .buffer_unordered(self.config.workers.max(1));

                    while let Some(delta) = results.next().await {
                        stats.merge(delta);
                        if !targets_reached && self.targets_reached(&stats) {
                            targets_reached = true;
                            self.cancel.cancel();
                        }
                    }
                }
                Err(e) => {
                    stats.record_error(format!("backfill query failed: {e}"));
                    failed = true;
                }
            }
        }

        watchdog.abort();

        let outcome = if failed {
            RunOutcome::Failed
        } else if self.cancel.is_cancelled() && !targets_reached {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };

        let budget = self
            .budget
            .snapshot()
            .into_iter()
            .map(|(source, used, limit)| BudgetLine {
                source,
                used,
                limit,
            })
            .collect();

        info!(outcome = %outcome, "{stats}");
        RunReport::new(outcome, started_at, stats, budget)
    }

    fn targets_reached(&self, stats: &RunStats) -> bool {
        stats.items_accepted >= self.config.item_target
            || stats.images_accepted >= self.config.image_target
    }

    /// One (source, query) work item: budget, adapter fetch with bounded
    /// retries, then the per-item pipeline for each returned sighting.
    async fn process_work_item(
        &self,
        adapter: Arc<dyn SourceAdapter>,
        query: String,
    ) -> RunStats {
        let mut delta = RunStats::default();
        let source = adapter.id().to_string();

        if !self.acquire_budget(&source, &mut delta).await {
            return delta;
        }

        let op = format!("{source}:{query}");
        let items = match self
            .retry
            .run(&op, || adapter.fetch(&query, ITEMS_PER_QUERY))
            .await
        {
            Ok(items) => items,
            Err(err) => {
                if err.class() == ErrorClass::Fatal {
                    self.budget.mark_exhausted(&source);
                }
                warn!(source = source.as_str(), query = query.as_str(), error = %err, "Adapter fetch failed");
                delta.record_error(format!("{op}: {err}"));
                return delta;
            }
        };

        info!(
            source = source.as_str(),
            query = query.as_str(),
            count = items.len(),
            "Adapter fetch complete"
        );

        for raw in items {
            delta.items_seen += 1;
            if let Err(e) = self.process_item(&raw, &mut delta).await {
                warn!(name = raw.name.as_str(), error = %e, "Item processing failed");
                delta.record_error(format!("item '{}': {e}", raw.name));
            }
        }
        delta
    }

    /// Block on interval pacing; report exhaustion. True means a slot
    /// was consumed.
    async fn acquire_budget(&self, source: &str, delta: &mut RunStats) -> bool {
        loop {
            match self.budget.acquire(source) {
                Acquire::Allow => return true,
                Acquire::Deny { retry_after } => tokio::time::sleep(retry_after).await,
                Acquire::Exhausted => {
                    delta.budget_skipped += 1;
                    return false;
                }
            }
        }
    }

    /// Resolve one sighting, record its price, then run its images
    /// through dedup and the quality gate in adapter order.
    async fn process_item(&self, raw: &RawItem, delta: &mut RunStats) -> anyhow::Result<()> {
        let resolution = self.resolver.resolve(raw).await?;
        let item_id = resolution.item_id();
        match resolution {
            Resolution::Created(_) => {
                delta.items_accepted += 1;
                *delta.by_source.entry(raw.marketplace.clone()).or_insert(0) += 1;
            }
            Resolution::Matched(_) => delta.items_enriched += 1,
        }

        if let Some(price) = raw.retail_price {
            self.store
                .record_price(&PriceObservation {
                    item_id,
                    marketplace: raw.marketplace.clone(),
                    price,
                    currency: "USD".to_string(),
                    observed_at: Utc::now(),
                })
                .await?;
        }

        let folder = raw.brand.clone().unwrap_or_default();
        self.process_images(item_id, &raw.image_refs, &folder, delta)
            .await;
        Ok(())
    }

    /// One backfill work item: ask the image source for candidates, then
    /// run them through the same per-image pipeline.
    async fn process_backfill_item(&self, item: CanonicalItem) -> RunStats {
        let mut delta = RunStats::default();
        let Some(image_source) = &self.image_source else {
            return delta;
        };
        let source = image_source.id().to_string();

        if !self.acquire_budget(&source, &mut delta).await {
            return delta;
        }

        let op = format!("{source}:{}", item.name);
        let refs = match self
            .retry
            .run(&op, || image_source.search_images(&item, IMAGE_SEARCH_LIMIT))
            .await
        {
            Ok(refs) => refs,
            Err(err) => {
                if err.class() == ErrorClass::Fatal {
                    self.budget.mark_exhausted(&source);
                }
                warn!(item = item.name.as_str(), error = %err, "Image search failed");
                delta.record_error(format!("{op}: {err}"));
                return delta;
            }
        };

        self.process_images(item.id, &refs, &item.brand, &mut delta)
            .await;
        delta
    }

    /// Images of one item, sequentially in adapter order. The accepted
    /// set grows as candidates pass, so later candidates dedup against
    /// earlier ones from the same batch.
    async fn process_images(
        &self,
        item_id: Uuid,
        refs: &[RawImageRef],
        folder: &str,
        delta: &mut RunStats,
    ) {
        if refs.is_empty() {
            return;
        }

        let mut existing = match self.store.image_hashes_for_item(item_id).await {
            Ok(existing) => existing,
            Err(e) => {
                delta.record_error(format!("hash load for {item_id}: {e}"));
                return;
            }
        };

        for image_ref in refs {
            if existing.len() as u32 >= self.config.images_per_item {
                break;
            }
            delta.images_considered += 1;

            match self
                .process_one_image(item_id, image_ref, &existing, folder)
                .await
            {
                ImageOutcome::Accepted {
                    stored,
                    storage_failed,
                } => {
                    delta.images_accepted += 1;
                    if storage_failed {
                        delta.storage_failures += 1;
                    }
                    existing.push(stored);
                }
                ImageOutcome::Duplicate => delta.duplicates_rejected += 1,
                ImageOutcome::Rejected(reason) => {
                    info!(url = image_ref.url.as_str(), reason = %reason, "Image rejected");
                    delta.quality_rejected += 1;
                }
                ImageOutcome::Failed(message) => delta.record_error(message),
            }
        }
    }

    /// The full candidate lifecycle: keyword screen, fetch, exact-hash
    /// dedup, decode, perceptual dedup, quality inspection, sink upload,
    /// persist. Bytes are transient and dropped on any rejection.
    async fn process_one_image(
        &self,
        item_id: Uuid,
        image_ref: &RawImageRef,
        existing: &[StoredImageHash],
        folder: &str,
    ) -> ImageOutcome {
        let url = sanitize_url(&image_ref.url);

        if let Err(reason) = self.gate.screen(&url, image_ref.alt_text.as_deref()) {
            return ImageOutcome::Rejected(reason);
        }

        match self.store.image_url_known(&url).await {
            Ok(true) => return ImageOutcome::Duplicate,
            Ok(false) => {}
            Err(e) => return ImageOutcome::Failed(format!("url check {url}: {e}")),
        }

        let bytes = match self
            .retry
            .run(&format!("image:{url}"), || self.fetcher.fetch_bytes(&url))
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => return ImageOutcome::Failed(format!("download {url}: {e}")),
        };

        if let Err(reason) = self.gate.check_size(bytes.len() as u64) {
            return ImageOutcome::Rejected(reason);
        }

        // Cheap exact-content path before any decode.
        let byte_hash = dedup::byte_hash(&bytes);
        if existing.iter().any(|s| s.byte_hash == byte_hash) {
            return ImageOutcome::Duplicate;
        }

        let decoded = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(_) => return ImageOutcome::Rejected(Rejection::Undecodable),
        };

        let hashes = dedup::perceptual_hashes(&decoded);
        if let DedupVerdict::DuplicateOf(existing_id) =
            dedup::check_against(&byte_hash, &hashes, existing, self.config.dedup.max_hamming)
        {
            info!(url = url.as_str(), %existing_id, "Near-duplicate image rejected");
            return ImageOutcome::Duplicate;
        }
        if let Some(existing_id) = self.window.find_match(&hashes, self.config.dedup.max_hamming) {
            info!(url = url.as_str(), %existing_id, "Cross-item duplicate rejected");
            return ImageOutcome::Duplicate;
        }

        let meta = match self.gate.inspect(&decoded) {
            Ok(meta) => meta,
            Err(reason) => return ImageOutcome::Rejected(reason),
        };

        let image_id = Uuid::new_v4();
        let name = format!("{}-{}.jpg", item_id, &byte_hash[..16]);
        let (storage_ref, storage_failed) = match &self.sink {
            Some(sink) => match self.upload(sink.as_ref(), &bytes, &name, folder).await {
                Some(external_id) => (Some(external_id), false),
                None => (None, true),
            },
            None => (None, false),
        };

        let accepted = AcceptedImage {
            id: image_id,
            item_id,
            source_url: url.clone(),
            byte_hash: byte_hash.clone(),
            ahash: hashes.ahash,
            dhash: hashes.dhash,
            width: meta.width,
            height: meta.height,
            byte_size: bytes.len() as u64,
            storage_ref,
            role: if existing.is_empty() {
                ImageRole::Primary
            } else {
                ImageRole::Detail
            },
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.insert_image(&accepted).await {
            return ImageOutcome::Failed(format!("persist {url}: {e}"));
        }
        self.window.push(image_id, hashes);

        info!(
            url = url.as_str(),
            %item_id,
            width = meta.width,
            height = meta.height,
            "Image accepted"
        );

        // On a failed upload the metadata row keeps a null storage ref so
        // a later repair pass can retry.
        ImageOutcome::Accepted {
            stored: StoredImageHash {
                image_id,
                byte_hash,
                ahash: hashes.ahash,
                dhash: hashes.dhash,
            },
            storage_failed,
        }
    }

    /// Idempotent-by-name upload with bounded retries.
    async fn upload(
        &self,
        sink: &dyn ObjectStore,
        bytes: &bytes::Bytes,
        name: &str,
        folder: &str,
    ) -> Option<String> {
        match sink.find(name, folder).await {
            Ok(Some(existing_id)) => return Some(existing_id),
            Ok(None) => {}
            Err(e) => warn!(name, error = %e, "Sink lookup failed, attempting upload"),
        }

        for attempt in 0..=self.config.storage_retries {
            match sink.store(bytes.clone(), name, folder).await {
                Ok(external_id) => return Some(external_id),
                Err(e) => {
                    warn!(name, attempt = attempt + 1, error = %e, "Sink upload failed");
                }
            }
        }
        None
    }
}

enum ImageOutcome {
    /// Persisted; carries the hashes for same-batch dedup. A failed sink
    /// upload still accepts the image, with a null storage ref.
    Accepted {
        stored: StoredImageHash,
        storage_failed: bool,
    },
    Duplicate,
    Rejected(Rejection),
    Failed(String),
}
