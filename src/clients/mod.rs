pub mod magento;

pub use magento::*;

use async_trait::async_trait;

use crate::models::*;

/// External catalog the sync reads from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Categories updated after `updated_since`, or every category when `None`.
    async fn list_categories(&self, updated_since: Option<&Watermark>) -> Result<Vec<SourceCategory>>;

    async fn list_products(&self, kind: ProductKind, updated_since: Option<&Watermark>) -> Result<Vec<SourceProduct>>;

    /// Attribute codes whose metadata the product import needs.
    fn custom_field_names(&self) -> Vec<String>;

    async fn attribute_metadata(&self, field: &str) -> Result<AttributeMeta>;
}
