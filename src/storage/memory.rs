use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde_json::Value;

use crate::models::*;
use crate::storage::{CategoryStore, CategoryTx, JobRepository, ProductStore, StoreRepository};

#[derive(Debug, Default)]
struct CatalogState {
    categories: BTreeMap<String, DestinationCategory>,
    products: BTreeMap<String, DestinationProduct>,
    stores: BTreeMap<String, Store>,
    jobs: Vec<ImportJob>,
    writes: u64,
    failing_handles: HashSet<Handle>,
    fail_store_updates: bool,
}

/// In-process catalog backend used by the one-shot tooling and the tests.
/// Category units of work operate on a snapshot that replaces the committed
/// state on `commit`, so an aborted unit leaves nothing behind.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_store(&self, store: Store) {
        self.lock().stores.insert(store.id.clone(), store);
    }

    pub fn insert_category(&self, category: DestinationCategory) {
        self.lock().categories.insert(category.id.clone(), category);
    }

    pub fn store(&self, store_id: &str) -> Option<Store> {
        self.lock().stores.get(store_id).cloned()
    }

    pub fn categories(&self) -> Vec<DestinationCategory> {
        self.lock().categories.values().cloned().collect()
    }

    pub fn category_by_handle(&self, handle: &str) -> Option<DestinationCategory> {
        self.lock().categories.values().find(|c| c.handle.as_str() == handle).cloned()
    }

    pub fn products(&self) -> Vec<DestinationProduct> {
        self.lock().products.values().cloned().collect()
    }

    /// Number of committed category writes and product upserts.
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    /// Makes every category or product write for `handle` fail.
    pub fn fail_writes_for(&self, handle: &str) {
        self.lock().failing_handles.insert(Handle::new(handle));
    }

    pub fn fail_store_updates(&self, fail: bool) {
        self.lock().fail_store_updates = fail;
    }
}

pub struct MemoryCategoryTx {
    state: Arc<Mutex<CatalogState>>,
    working: BTreeMap<String, DestinationCategory>,
    failing_handles: HashSet<Handle>,
    writes: u64,
}

impl MemoryCategoryTx {
    fn check_writable(&self, handle: &Handle) -> Result<()> {
        if self.failing_handles.contains(handle) {
            return Err(SyncError::Job(format!("simulated write failure for '{}'", handle)));
        }
        Ok(())
    }

    fn handle_taken(&self, handle: &Handle, except_id: Option<&str>) -> bool {
        !handle.is_empty()
            && self
                .working
                .values()
                .any(|c| &c.handle == handle && Some(c.id.as_str()) != except_id)
    }
}

#[async_trait]
impl CategoryStore for MemoryCatalog {
    async fn begin(&self) -> Result<Box<dyn CategoryTx>> {
        let state = self.lock();
        Ok(Box::new(MemoryCategoryTx {
            state: self.state.clone(),
            working: state.categories.clone(),
            failing_handles: state.failing_handles.clone(),
            writes: 0,
        }))
    }

    async fn list_categories(&self, limit: i64) -> Result<Vec<DestinationCategory>> {
        let mut categories = self.categories();
        categories.sort_by(|a, b| a.handle.cmp(&b.handle));
        categories.truncate(limit.max(0) as usize);
        Ok(categories)
    }
}

#[async_trait]
impl CategoryTx for MemoryCategoryTx {
    async fn find_by_handle(&mut self, handle: &Handle) -> Result<Option<DestinationCategory>> {
        if handle.is_empty() {
            return Ok(None);
        }
        Ok(self.working.values().find(|c| &c.handle == handle).cloned())
    }

    async fn find_by_id(&mut self, id: &str) -> Result<Option<DestinationCategory>> {
        Ok(self.working.get(id).cloned())
    }

    async fn create(&mut self, category: NewCategory) -> Result<DestinationCategory> {
        self.check_writable(&category.fields.handle)?;
        if self.handle_taken(&category.fields.handle, None) {
            return Err(SyncError::DuplicateHandle(category.fields.handle.to_string()));
        }
        let category = DestinationCategory::from_new(category);
        self.working.insert(category.id.clone(), category.clone());
        self.writes += 1;
        Ok(category)
    }

    async fn update(&mut self, id: &str, update: &CategoryUpdate) -> Result<()> {
        let current_handle = match self.working.get(id) {
            Some(existing) => existing.handle.clone(),
            None => return Err(SyncError::NotFound(format!("category {}", id))),
        };
        self.check_writable(&current_handle)?;
        if let Some(handle) = &update.handle {
            if self.handle_taken(handle, Some(id)) {
                return Err(SyncError::DuplicateHandle(handle.to_string()));
            }
        }
        if let Some(existing) = self.working.get_mut(id) {
            update.apply_to(existing);
        }
        self.writes += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryCategoryTx { state, working, writes, .. } = *self;
        let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.categories = working;
        state.writes += writes;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryCatalog {
    async fn upsert_product(&self, product: ProductFields) -> Result<UpsertOutcome> {
        let mut state = self.lock();
        if state.failing_handles.contains(&product.handle) {
            return Err(SyncError::Job(format!("simulated write failure for '{}'", product.handle)));
        }
        let now = BsonDateTime::now();
        let existing = state
            .products
            .values_mut()
            .find(|p| !product.handle.is_empty() && p.handle == product.handle);

        let outcome = match existing {
            Some(current) => {
                current.title = product.title;
                current.external_id = product.external_id;
                current.product_type = product.product_type;
                current.status = product.status;
                current.price = product.price;
                current.attributes = product.attributes;
                current.metadata.extend(product.metadata);
                current.updated_at = now;
                UpsertOutcome::Updated
            }
            None => {
                let created = DestinationProduct {
                    id: generate_id("prod"),
                    title: product.title,
                    handle: product.handle,
                    external_id: product.external_id,
                    product_type: product.product_type,
                    status: product.status,
                    price: product.price,
                    attributes: product.attributes,
                    metadata: product.metadata,
                    created_at: now,
                    updated_at: now,
                };
                state.products.insert(created.id.clone(), created);
                UpsertOutcome::Created
            }
        };
        state.writes += 1;
        Ok(outcome)
    }
}

#[async_trait]
impl StoreRepository for MemoryCatalog {
    async fn find_store(&self, store_id: &str) -> Result<Option<Store>> {
        Ok(self.store(store_id))
    }

    async fn update_store_metadata(&self, store_id: &str, metadata: BTreeMap<String, Value>) -> Result<()> {
        let mut state = self.lock();
        if state.fail_store_updates {
            return Err(SyncError::Job(format!("simulated metadata write failure for store {}", store_id)));
        }
        let store = state
            .stores
            .get_mut(store_id)
            .ok_or_else(|| SyncError::NotFound(format!("store {}", store_id)))?;
        store.metadata.extend(metadata);
        Ok(())
    }
}

#[async_trait]
impl JobRepository for MemoryCatalog {
    async fn create_job(&self, job: &ImportJob) -> Result<ObjectId> {
        let id = ObjectId::new();
        let mut stored = job.clone();
        stored.id = Some(id);
        self.lock().jobs.push(stored);
        Ok(id)
    }

    async fn get_job(&self, id: ObjectId) -> Result<ImportJob> {
        self.lock()
            .jobs
            .iter()
            .find(|j| j.id == Some(id))
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("import job {}", id)))
    }

    async fn update_job(&self, job: &ImportJob) -> Result<()> {
        let id = job.id.ok_or_else(|| SyncError::Job("Cannot update a job without id".to_string()))?;
        let mut state = self.lock();
        let slot = state
            .jobs
            .iter_mut()
            .find(|j| j.id == Some(id))
            .ok_or_else(|| SyncError::NotFound(format!("import job {}", id)))?;
        *slot = job.clone();
        Ok(())
    }

    async fn list_jobs(&self, store_id: Option<&str>, limit: i64) -> Result<Vec<ImportJob>> {
        let state = self.lock();
        let mut jobs: Vec<ImportJob> = state
            .jobs
            .iter()
            .filter(|j| store_id.map_or(true, |s| j.store_id == s))
            .cloned()
            .collect();
        jobs.reverse();
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_category(handle: &str) -> NewCategory {
        NewCategory {
            fields: CategoryFields {
                name: handle.to_uppercase(),
                handle: Handle::new(handle),
                is_active: true,
                metadata: BTreeMap::new(),
            },
            parent_category_id: None,
            rank: None,
        }
    }

    #[tokio::test]
    async fn abort_discards_writes() {
        let catalog = MemoryCatalog::new();
        let mut tx = catalog.begin().await.unwrap();
        tx.create(new_category("shoes")).await.unwrap();
        tx.abort().await.unwrap();
        assert!(catalog.categories().is_empty());
        assert_eq!(catalog.write_count(), 0);

        let mut tx = catalog.begin().await.unwrap();
        tx.create(new_category("shoes")).await.unwrap();
        tx.commit().await.unwrap();
        assert!(catalog.category_by_handle("shoes").is_some());
        assert_eq!(catalog.write_count(), 1);
    }

    #[tokio::test]
    async fn non_empty_handles_are_unique() {
        let catalog = MemoryCatalog::new();
        let mut tx = catalog.begin().await.unwrap();
        tx.create(new_category("shoes")).await.unwrap();
        let err = tx.create(new_category("shoes")).await.unwrap_err();
        assert!(matches!(err, SyncError::DuplicateHandle(h) if h == "shoes"));

        tx.create(new_category("")).await.unwrap();
        tx.create(new_category("")).await.unwrap();
        assert!(tx.find_by_handle(&Handle::default()).await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert_eq!(catalog.categories().len(), 3);
    }

    #[tokio::test]
    async fn jobs_list_newest_first() {
        let catalog = MemoryCatalog::new();
        let first = catalog.create_job(&ImportJob::new("s1".into(), "import-magento")).await.unwrap();
        let second = catalog.create_job(&ImportJob::new("s1".into(), "import-magento")).await.unwrap();
        catalog.create_job(&ImportJob::new("s2".into(), "import-magento")).await.unwrap();

        let jobs = catalog.list_jobs(Some("s1"), 10).await.unwrap();
        let ids: Vec<_> = jobs.iter().filter_map(|j| j.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(matches!(catalog.get_job(ObjectId::new()).await, Err(SyncError::NotFound(_))));
    }
}
