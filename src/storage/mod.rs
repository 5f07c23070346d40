use std::collections::BTreeMap;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use serde_json::Value;

use crate::models::*;

pub mod memory;
pub mod mongo;

pub use memory::MemoryCatalog;
pub use mongo::MongoCatalog;

/// Destination category store. All reads and writes for one source category
/// go through a single [`CategoryTx`].
#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CategoryTx>>;

    async fn list_categories(&self, limit: i64) -> Result<Vec<DestinationCategory>>;
}

/// Unit of work over the category store. Dropping it without `commit` leaves
/// nothing behind for transactional backends.
#[async_trait]
pub trait CategoryTx: Send {
    /// `Ok(None)` is the NotFound case.
    async fn find_by_handle(&mut self, handle: &Handle) -> Result<Option<DestinationCategory>>;

    async fn find_by_id(&mut self, id: &str) -> Result<Option<DestinationCategory>>;

    async fn create(&mut self, category: NewCategory) -> Result<DestinationCategory>;

    async fn update(&mut self, id: &str, update: &CategoryUpdate) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn abort(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Creates the product or overwrites the synced fields of the one with the same handle.
    async fn upsert_product(&self, product: ProductFields) -> Result<UpsertOutcome>;
}

#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn find_store(&self, store_id: &str) -> Result<Option<Store>>;

    /// Merges `metadata` into the store's metadata, key by key.
    async fn update_store_metadata(&self, store_id: &str, metadata: BTreeMap<String, Value>) -> Result<()>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_job(&self, job: &ImportJob) -> Result<ObjectId>;

    async fn get_job(&self, id: ObjectId) -> Result<ImportJob>;

    async fn update_job(&self, job: &ImportJob) -> Result<()>;

    async fn list_jobs(&self, store_id: Option<&str>, limit: i64) -> Result<Vec<ImportJob>>;
}
