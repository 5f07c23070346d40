use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, Json, Object, Result as GraphQLResult, Schema, ID};
use mongodb::bson::oid::ObjectId;

use crate::models::*;
use crate::storage::{CategoryStore, StoreRepository};
use crate::sync::ImportStrategy;

pub type CatalogSyncSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

const DEFAULT_LIST_LIMIT: i32 = 50;

/// Shared services resolvers read from the schema data.
#[derive(Clone)]
pub struct ServiceContext {
    pub strategy: Arc<ImportStrategy>,
    pub stores: Arc<dyn StoreRepository>,
    pub categories: Arc<dyn CategoryStore>,
}

pub fn build_schema(services: ServiceContext) -> CatalogSyncSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(services)
        .finish()
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Recent import jobs, newest first, optionally for one store
    async fn import_jobs(
        &self,
        ctx: &Context<'_>,
        store_id: Option<String>,
        limit: Option<i32>,
    ) -> GraphQLResult<Vec<ImportJob>> {
        let services = ctx.data::<ServiceContext>()?;
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1) as i64;
        let jobs = services.strategy.jobs().list_jobs(store_id.as_deref(), limit).await?;
        Ok(jobs)
    }

    async fn import_job(&self, ctx: &Context<'_>, id: ID) -> GraphQLResult<Option<ImportJob>> {
        let services = ctx.data::<ServiceContext>()?;
        let object_id = ObjectId::parse_str(&id)?;

        match services.strategy.jobs().get_job(object_id).await {
            Ok(job) => Ok(Some(job)),
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, ctx: &Context<'_>, id: ID) -> GraphQLResult<Option<Store>> {
        let services = ctx.data::<ServiceContext>()?;
        Ok(services.stores.find_store(&id).await?)
    }

    /// Destination categories ordered by handle
    async fn categories(&self, ctx: &Context<'_>, limit: Option<i32>) -> GraphQLResult<Vec<DestinationCategory>> {
        let services = ctx.data::<ServiceContext>()?;
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1) as i64;
        Ok(services.categories.list_categories(limit).await?)
    }

    async fn health(&self) -> GraphQLResult<String> {
        Ok("OK".to_string())
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Run an import for a store now and return the finished job
    async fn trigger_import(&self, ctx: &Context<'_>, store_id: ID) -> GraphQLResult<ImportJob> {
        let services = ctx.data::<ServiceContext>()?;
        let job = services.strategy.run(&store_id).await?;
        Ok(job)
    }
}

#[Object]
impl ImportJob {
    async fn id(&self) -> Option<ID> {
        self.id.map(|id| ID::from(id.to_string()))
    }

    async fn store_id(&self) -> &str {
        &self.store_id
    }

    async fn batch_type(&self) -> &str {
        &self.batch_type
    }

    async fn status(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(self.status).unwrap_or(serde_json::Value::Null))
    }

    async fn progress(&self) -> i64 {
        self.progress
    }

    async fn result(&self) -> Option<Json<serde_json::Value>> {
        self.result.as_ref().and_then(|r| serde_json::to_value(r).ok()).map(Json)
    }

    async fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    async fn retryable(&self) -> bool {
        self.retryable
    }

    async fn created_at(&self) -> String {
        self.created_at.to_chrono().to_rfc3339()
    }

    async fn started_at(&self) -> Option<String> {
        self.started_at.map(|dt| dt.to_chrono().to_rfc3339())
    }

    async fn completed_at(&self) -> Option<String> {
        self.completed_at.map(|dt| dt.to_chrono().to_rfc3339())
    }
}

#[Object]
impl Store {
    async fn id(&self) -> ID {
        ID::from(self.id.as_str())
    }

    async fn name(&self) -> &str {
        &self.name
    }

    async fn metadata(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(&self.metadata).unwrap_or(serde_json::Value::Null))
    }
}

#[Object]
impl DestinationCategory {
    async fn id(&self) -> ID {
        ID::from(self.id.as_str())
    }

    async fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self) -> &str {
        self.handle.as_str()
    }

    async fn is_active(&self) -> bool {
        self.is_active
    }

    async fn parent_category_id(&self) -> Option<ID> {
        self.parent_category_id.as_deref().map(ID::from)
    }

    async fn rank(&self) -> Option<i64> {
        self.rank
    }

    async fn metadata(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(&self.metadata).unwrap_or(serde_json::Value::Null))
    }

    async fn created_at(&self) -> String {
        self.created_at.to_chrono().to_rfc3339()
    }

    async fn updated_at(&self) -> String {
        self.updated_at.to_chrono().to_rfc3339()
    }
}
