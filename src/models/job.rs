use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Created,
    PreProcessed,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub store_id: String,
    pub batch_type: String,
    pub status: JobStatus,
    pub progress: i64,
    pub result: Option<SyncReport>,
    pub error: Option<String>,
    pub retryable: bool,
    pub created_at: BsonDateTime,
    pub started_at: Option<BsonDateTime>,
    pub completed_at: Option<BsonDateTime>,
}

impl ImportJob {
    pub fn new(store_id: String, batch_type: &str) -> Self {
        Self {
            id: None,
            store_id,
            batch_type: batch_type.to_string(),
            status: JobStatus::Created,
            progress: 0,
            result: None,
            error: None,
            retryable: false,
            created_at: BsonDateTime::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(BsonDateTime::now());
        self.error = None;
    }

    pub fn complete(&mut self, report: SyncReport) {
        self.status = JobStatus::Completed;
        self.progress = report.items_processed();
        self.result = Some(report);
        self.completed_at = Some(BsonDateTime::now());
    }

    pub fn fail(&mut self, message: String, retryable: bool) {
        self.status = JobStatus::Failed;
        self.error = Some(message);
        self.retryable = retryable;
        self.completed_at = Some(BsonDateTime::now());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub seen: i64,
    pub created: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub linked: i64,
    /// Parent not resolvable in this pass (missing from the batch or from the destination).
    pub unresolved: i64,
    pub failed: i64,
    /// Parent links refused in the linking pass. These items are already
    /// counted as created, updated or unchanged.
    #[serde(default)]
    pub link_failed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductReport {
    pub seen: i64,
    pub created: i64,
    pub updated: i64,
    pub skipped: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub store_id: String,
    /// True when the pass was skipped because the store does not exist.
    pub skipped: bool,
    pub previous_watermark: Option<String>,
    pub watermark: Option<String>,
    pub categories: CategoryReport,
    pub attributes_fetched: i64,
    pub configurable_products: ProductReport,
    pub simple_products: ProductReport,
    pub duration_ms: i64,
}

impl SyncReport {
    pub fn skipped(store_id: &str) -> Self {
        Self { store_id: store_id.to_string(), skipped: true, ..Default::default() }
    }

    pub fn products_seen(&self) -> i64 {
        self.configurable_products.seen + self.simple_products.seen
    }

    pub fn items_processed(&self) -> i64 {
        self.categories.seen + self.products_seen()
    }
}
