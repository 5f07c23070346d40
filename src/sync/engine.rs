use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;

use crate::clients::CatalogSource;
use crate::models::*;
use crate::storage::*;
use crate::sync::products::{import_products, ProductImporter, ProductUpserter};
use crate::sync::reconciler::{CategoryBatch, CategoryReconciler};

/// Runs one batch pass per store:
/// categories, attribute metadata, configurable products, simple products,
/// then the watermark.
pub struct SyncEngine {
    source: Arc<dyn CatalogSource>,
    stores: Arc<dyn StoreRepository>,
    reconciler: CategoryReconciler,
    products: Arc<dyn ProductImporter>,
    watermark_key: String,
    active_syncs: Arc<Mutex<HashSet<String>>>,
}

struct ActiveSyncGuard {
    set: Arc<Mutex<HashSet<String>>>,
    store_id: String,
}

impl Drop for ActiveSyncGuard {
    fn drop(&mut self) {
        if let Ok(mut s) = self.set.lock() { s.remove(&self.store_id); }
    }
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        categories: Arc<dyn CategoryStore>,
        products: Arc<dyn ProductImporter>,
        stores: Arc<dyn StoreRepository>,
        watermark_key: impl Into<String>,
    ) -> Self {
        Self {
            source,
            stores,
            reconciler: CategoryReconciler::new(categories),
            products,
            watermark_key: watermark_key.into(),
            active_syncs: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Wires every destination concern to one backend.
    pub fn with_catalog<C>(source: Arc<dyn CatalogSource>, catalog: C, watermark_key: impl Into<String>) -> Self
    where
        C: CategoryStore + ProductStore + StoreRepository + Clone + 'static,
    {
        Self::new(
            source,
            Arc::new(catalog.clone()),
            Arc::new(ProductUpserter::new(Arc::new(catalog.clone()))),
            Arc::new(catalog),
            watermark_key,
        )
    }

    fn acquire(&self, store_id: &str) -> Result<ActiveSyncGuard> {
        let mut active = self
            .active_syncs
            .lock()
            .map_err(|_| SyncError::Job("Active sync registry poisoned".to_string()))?;
        if !active.insert(store_id.to_string()) {
            return Err(SyncError::SyncInProgress(store_id.to_string()));
        }
        Ok(ActiveSyncGuard { set: self.active_syncs.clone(), store_id: store_id.to_string() })
    }

    /// One full pass for `store_id`. A missing store is skipped, not an error.
    /// Per-item failures are counted in the report; anything else aborts the
    /// pass before the watermark is written, so the next run re-fetches the
    /// same window.
    pub async fn run_sync(&self, store_id: &str) -> Result<SyncReport> {
        let _guard = self.acquire(store_id)?;
        let start_time = Instant::now();

        let store = match self.stores.find_store(store_id).await? {
            Some(store) => store,
            None => {
                tracing::info!(store_id = %store_id, "Store not found; skipping catalog sync");
                return Ok(SyncReport::skipped(store_id));
            }
        };

        let previous = store.watermark(&self.watermark_key);
        tracing::info!(
            store_id = %store_id,
            watermark = previous.as_ref().map(Watermark::as_str).unwrap_or("none"),
            full_sync = previous.is_none(),
            "Starting catalog sync"
        );

        let mut report = SyncReport {
            store_id: store_id.to_string(),
            previous_watermark: previous.as_ref().map(|w| w.to_string()),
            ..Default::default()
        };

        // STAGE 1: categories
        let categories = self.source.list_categories(previous.as_ref()).await?;
        tracing::info!(store_id = %store_id, count = categories.len(), "Fetched categories");
        let batch = CategoryBatch::new(categories);
        report.categories = self.reconciler.reconcile_batch(&batch).await;

        // STAGE 2: attribute metadata
        let mut attributes = AttributeCatalog::default();
        for field in self.source.custom_field_names() {
            let meta = self.source.attribute_metadata(&field).await?;
            attributes.insert(field, meta);
        }
        report.attributes_fetched = attributes.len() as i64;
        tracing::info!(store_id = %store_id, count = attributes.len(), "Fetched attribute metadata");

        // STAGE 3: products, configurable before simple
        let configurable = self.source.list_products(ProductKind::Configurable, previous.as_ref()).await?;
        report.configurable_products = import_products(self.products.as_ref(), &configurable, ProductKind::Configurable, &attributes).await;

        let simple = self.source.list_products(ProductKind::Simple, previous.as_ref()).await?;
        report.simple_products = import_products(self.products.as_ref(), &simple, ProductKind::Simple, &attributes).await;

        // STAGE 4: watermark
        let next = Watermark::advance(previous.as_ref(), Utc::now());
        let metadata = BTreeMap::from([(self.watermark_key.clone(), Value::String(next.to_string()))]);
        self.stores.update_store_metadata(store_id, metadata).await?;
        report.watermark = Some(next.to_string());
        report.duration_ms = start_time.elapsed().as_millis() as i64;

        tracing::info!(
            store_id = %store_id,
            categories = report.categories.seen,
            configurable_products = report.configurable_products.seen,
            simple_products = report.simple_products.seen,
            failed_categories = report.categories.failed,
            failed_category_links = report.categories.link_failed,
            failed_products = report.configurable_products.failed + report.simple_products.failed,
            watermark = %next,
            duration_ms = report.duration_ms,
            "Catalog sync completed"
        );
        Ok(report)
    }
}
