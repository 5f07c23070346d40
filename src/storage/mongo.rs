use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions, UpdateOptions};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde_json::Value;

use crate::models::*;
use crate::storage::{CategoryStore, CategoryTx, JobRepository, ProductStore, StoreRepository};

const CATEGORIES: &str = "product_categories";
const PRODUCTS: &str = "products";
const STORES: &str = "stores";
const IMPORT_JOBS: &str = "import_jobs";

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed destination catalog.
#[derive(Clone)]
pub struct MongoCatalog {
    client: Client,
    db: Database,
    transactions: bool,
}

impl MongoCatalog {
    pub fn new(client: Client, db: Database, transactions: bool) -> Self {
        Self { client, db, transactions }
    }

    fn categories(&self) -> Collection<DestinationCategory> {
        self.db.collection(CATEGORIES)
    }

    fn products(&self) -> Collection<DestinationProduct> {
        self.db.collection(PRODUCTS)
    }

    fn stores(&self) -> Collection<Store> {
        self.db.collection(STORES)
    }

    fn jobs(&self) -> Collection<ImportJob> {
        self.db.collection(IMPORT_JOBS)
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        // Handles are unique, but records without a url_key carry an empty handle and may repeat
        let unique_handle = IndexOptions::builder()
            .unique(true)
            .partial_filter_expression(doc! { "handle": { "$gt": "" } })
            .build();

        let categories = self.db.collection::<Document>(CATEGORIES);
        categories
            .create_index(IndexModel::builder().keys(doc! { "handle": 1 }).options(unique_handle.clone()).build(), None)
            .await?;
        categories
            .create_index(IndexModel::builder().keys(doc! { "parent_category_id": 1 }).build(), None)
            .await?;

        let products = self.db.collection::<Document>(PRODUCTS);
        products
            .create_index(IndexModel::builder().keys(doc! { "handle": 1 }).options(unique_handle).build(), None)
            .await?;
        products
            .create_index(IndexModel::builder().keys(doc! { "external_id": 1 }).build(), None)
            .await?;

        let jobs = self.db.collection::<Document>(IMPORT_JOBS);
        jobs.create_index(IndexModel::builder().keys(doc! { "store_id": 1, "created_at": -1 }).build(), None)
            .await?;

        tracing::info!("Catalog indexes created");
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

fn metadata_paths(set: &mut Document, metadata: &BTreeMap<String, Value>) -> Result<()> {
    for (key, value) in metadata {
        set.insert(format!("metadata.{}", key), bson::to_bson(value)?);
    }
    Ok(())
}

fn category_update_document(update: &CategoryUpdate) -> Result<Document> {
    let mut set = Document::new();
    if let Some(name) = &update.name { set.insert("name", name.as_str()); }
    if let Some(handle) = &update.handle { set.insert("handle", handle.as_str()); }
    if let Some(is_active) = update.is_active { set.insert("is_active", is_active); }
    if let Some(parent) = &update.parent_category_id { set.insert("parent_category_id", parent.as_str()); }
    if let Some(rank) = update.rank { set.insert("rank", rank); }
    metadata_paths(&mut set, &update.metadata)?;
    set.insert("updated_at", BsonDateTime::now());
    Ok(doc! { "$set": set })
}

/// Category unit of work. Runs inside a session transaction when the
/// deployment supports it, otherwise writes go straight to the collection.
pub struct MongoCategoryTx {
    categories: Collection<DestinationCategory>,
    session: Option<ClientSession>,
}

#[async_trait]
impl CategoryStore for MongoCatalog {
    async fn begin(&self) -> Result<Box<dyn CategoryTx>> {
        let categories = self.categories();
        if !self.transactions {
            return Ok(Box::new(MongoCategoryTx { categories, session: None }));
        }

        let session = match self.client.start_session(None).await {
            Ok(mut session) => match session.start_transaction(None).await {
                Ok(()) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "Transactions not supported; falling back to non-transactional writes");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Sessions not supported; writing without session");
                None
            }
        };
        Ok(Box::new(MongoCategoryTx { categories, session }))
    }

    async fn list_categories(&self, limit: i64) -> Result<Vec<DestinationCategory>> {
        let options = FindOptions::builder().sort(doc! { "handle": 1 }).limit(limit).build();
        let cursor = self.categories().find(doc! {}, options).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl CategoryTx for MongoCategoryTx {
    async fn find_by_handle(&mut self, handle: &Handle) -> Result<Option<DestinationCategory>> {
        let filter = doc! { "handle": handle.as_str() };
        let found = match self.session.as_mut() {
            Some(session) => self.categories.find_one_with_session(filter, None, session).await?,
            None => self.categories.find_one(filter, None).await?,
        };
        Ok(found)
    }

    async fn find_by_id(&mut self, id: &str) -> Result<Option<DestinationCategory>> {
        let filter = doc! { "_id": id };
        let found = match self.session.as_mut() {
            Some(session) => self.categories.find_one_with_session(filter, None, session).await?,
            None => self.categories.find_one(filter, None).await?,
        };
        Ok(found)
    }

    async fn create(&mut self, category: NewCategory) -> Result<DestinationCategory> {
        let category = DestinationCategory::from_new(category);
        let inserted = match self.session.as_mut() {
            Some(session) => self.categories.insert_one_with_session(&category, None, session).await,
            None => self.categories.insert_one(&category, None).await,
        };
        match inserted {
            Ok(_) => Ok(category),
            Err(e) if is_duplicate_key(&e) => Err(SyncError::DuplicateHandle(category.handle.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&mut self, id: &str, update: &CategoryUpdate) -> Result<()> {
        let filter = doc! { "_id": id };
        let modifications = category_update_document(update)?;
        let result = match self.session.as_mut() {
            Some(session) => self.categories.update_one_with_session(filter, modifications, None, session).await?,
            None => self.categories.update_one(filter, modifications, None).await?,
        };
        if result.matched_count == 0 {
            return Err(SyncError::NotFound(format!("category {}", id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if let Some(mut session) = self.session {
            session.commit_transaction().await?;
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        if let Some(mut session) = self.session {
            session.abort_transaction().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MongoCatalog {
    async fn upsert_product(&self, product: ProductFields) -> Result<UpsertOutcome> {
        let now = BsonDateTime::now();
        let mut set = doc! {
            "title": product.title.as_str(),
            "external_id": product.external_id.as_str(),
            "product_type": product.product_type.as_str(),
            "status": bson::to_bson(&product.status)?,
            "price": bson::to_bson(&product.price)?,
            "attributes": bson::to_bson(&product.attributes)?,
            "updated_at": now,
        };
        metadata_paths(&mut set, &product.metadata)?;

        // `handle` comes from the equality filter on insert
        let update = doc! {
            "$set": set,
            "$setOnInsert": { "_id": generate_id("prod"), "created_at": now },
        };
        let options = UpdateOptions::builder().upsert(true).build();
        let result = self
            .products()
            .update_one(doc! { "handle": product.handle.as_str() }, update, options)
            .await?;

        Ok(if result.upserted_id.is_some() { UpsertOutcome::Created } else { UpsertOutcome::Updated })
    }
}

#[async_trait]
impl StoreRepository for MongoCatalog {
    async fn find_store(&self, store_id: &str) -> Result<Option<Store>> {
        Ok(self.stores().find_one(doc! { "_id": store_id }, None).await?)
    }

    async fn update_store_metadata(&self, store_id: &str, metadata: BTreeMap<String, Value>) -> Result<()> {
        let mut set = Document::new();
        metadata_paths(&mut set, &metadata)?;
        if set.is_empty() {
            return Ok(());
        }
        let result = self
            .stores()
            .update_one(doc! { "_id": store_id }, doc! { "$set": set }, None)
            .await?;
        if result.matched_count == 0 {
            return Err(SyncError::NotFound(format!("store {}", store_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for MongoCatalog {
    async fn create_job(&self, job: &ImportJob) -> Result<ObjectId> {
        let result = self.jobs().insert_one(job, None).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| SyncError::Job("Inserted job id is not an ObjectId".to_string()))
    }

    async fn get_job(&self, id: ObjectId) -> Result<ImportJob> {
        self.jobs()
            .find_one(doc! { "_id": id }, None)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("import job {}", id)))
    }

    async fn update_job(&self, job: &ImportJob) -> Result<()> {
        let id = job.id.ok_or_else(|| SyncError::Job("Cannot update a job without id".to_string()))?;
        self.jobs().replace_one(doc! { "_id": id }, job, None).await?;
        Ok(())
    }

    async fn list_jobs(&self, store_id: Option<&str>, limit: i64) -> Result<Vec<ImportJob>> {
        let filter = match store_id {
            Some(store_id) => doc! { "store_id": store_id },
            None => doc! {},
        };
        let options = FindOptions::builder().sort(doc! { "created_at": -1 }).limit(limit).build();
        let cursor = self.jobs().find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }
}
