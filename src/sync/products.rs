use std::sync::Arc;

use async_trait::async_trait;

use crate::mapping::FieldMapper;
use crate::models::*;
use crate::storage::ProductStore;

/// Per-item product import hook used by the sync pipeline.
#[async_trait]
pub trait ProductImporter: Send + Sync {
    async fn import_product(&self, product: &SourceProduct, kind: ProductKind, attributes: &AttributeCatalog) -> Result<UpsertOutcome>;
}

/// Upserts products by handle. Simple products that only exist as variants
/// of a configurable product are skipped.
pub struct ProductUpserter {
    store: Arc<dyn ProductStore>,
    mapper: FieldMapper,
}

impl ProductUpserter {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store, mapper: FieldMapper::new() }
    }
}

#[async_trait]
impl ProductImporter for ProductUpserter {
    async fn import_product(&self, product: &SourceProduct, kind: ProductKind, attributes: &AttributeCatalog) -> Result<UpsertOutcome> {
        if kind == ProductKind::Simple && product.is_variant_child() {
            tracing::debug!(sku = %product.sku, "Skipping variant child product");
            return Ok(UpsertOutcome::Skipped);
        }
        let fields = self.mapper.normalize_product(product, kind, attributes);
        let handle = fields.handle.clone();
        let outcome = self.store.upsert_product(fields).await?;
        tracing::debug!(sku = %product.sku, handle = %handle, outcome = ?outcome, "Upserted product");
        Ok(outcome)
    }
}

/// Imports `products` one after another; failures are logged and counted.
pub async fn import_products(
    importer: &dyn ProductImporter,
    products: &[SourceProduct],
    kind: ProductKind,
    attributes: &AttributeCatalog,
) -> ProductReport {
    let mut report = ProductReport { seen: products.len() as i64, ..Default::default() };
    for product in products {
        match importer.import_product(product, kind, attributes).await {
            Ok(UpsertOutcome::Created) => report.created += 1,
            Ok(UpsertOutcome::Updated) => report.updated += 1,
            Ok(UpsertOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                tracing::error!(magento_id = product.id, sku = %product.sku, kind = %kind, error = %e, "Failed to import product");
                report.failed += 1;
            }
        }
    }
    tracing::info!(
        kind = %kind,
        seen = report.seen,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        "Product import finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryCatalog;

    fn product(id: i64, sku: &str, visibility: i64) -> SourceProduct {
        serde_json::from_value(json!({
            "id": id, "sku": sku, "name": sku, "visibility": visibility, "status": 1
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn upserts_by_handle_and_skips_variant_children() {
        let catalog = MemoryCatalog::new();
        let upserter = ProductUpserter::new(Arc::new(catalog.clone()));
        let attributes = AttributeCatalog::default();

        let products = vec![product(1, "TEE", 4), product(2, "TEE-S", 1)];
        let report = import_products(&upserter, &products, ProductKind::Simple, &attributes).await;
        assert_eq!((report.created, report.skipped), (1, 1));

        let again = import_products(&upserter, &products[..1], ProductKind::Simple, &attributes).await;
        assert_eq!(again.updated, 1);
        assert_eq!(catalog.products().len(), 1);
        assert_eq!(catalog.products()[0].handle, Handle::new("tee"));
    }

    #[tokio::test]
    async fn configurable_products_are_never_skipped() {
        let catalog = MemoryCatalog::new();
        let upserter = ProductUpserter::new(Arc::new(catalog.clone()));
        let outcome = upserter
            .import_product(&product(3, "JACKET", 1), ProductKind::Configurable, &AttributeCatalog::default())
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
    }
}
