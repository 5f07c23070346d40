use std::sync::Arc;

use mongodb::bson::oid::ObjectId;

use crate::models::*;
use crate::storage::JobRepository;
use crate::sync::engine::SyncEngine;

/// Batch job lifecycle around [`SyncEngine::run_sync`].
pub struct ImportStrategy {
    engine: Arc<SyncEngine>,
    jobs: Arc<dyn JobRepository>,
}

impl ImportStrategy {
    pub const IDENTIFIER: &'static str = "import-magento-strategy";
    pub const BATCH_TYPE: &'static str = "import-magento";

    pub fn new(engine: Arc<SyncEngine>, jobs: Arc<dyn JobRepository>) -> Self {
        Self { engine, jobs }
    }

    pub async fn create_job(&self, store_id: &str) -> Result<ImportJob> {
        let mut job = ImportJob::new(store_id.to_string(), Self::BATCH_TYPE);
        let id = self.jobs.create_job(&job).await?;
        job.id = Some(id);
        tracing::info!(job_id = %id, store_id = %store_id, strategy = Self::IDENTIFIER, "Created import job");
        Ok(job)
    }

    pub async fn pre_process(&self, job_id: ObjectId) -> Result<ImportJob> {
        let mut job = self.jobs.get_job(job_id).await?;
        job.progress = 0;
        job.status = JobStatus::PreProcessed;
        job.result = None;
        job.error = None;
        self.jobs.update_job(&job).await?;
        Ok(job)
    }

    /// Runs the pass for the job's store and records the outcome on the job.
    /// The error is returned after it has been recorded.
    pub async fn process(&self, job_id: ObjectId) -> Result<ImportJob> {
        let mut job = self.jobs.get_job(job_id).await?;
        job.start();
        self.jobs.update_job(&job).await?;

        match self.engine.run_sync(&job.store_id).await {
            Ok(report) => {
                job.complete(report);
                self.jobs.update_job(&job).await?;
                tracing::info!(job_id = %job_id, store_id = %job.store_id, progress = job.progress, "Import job completed");
                Ok(job)
            }
            Err(e) => {
                let retryable = self.should_retry_on_processing_error(&job, &e);
                job.fail(e.to_string(), retryable);
                if let Err(update_err) = self.jobs.update_job(&job).await {
                    tracing::error!(job_id = %job_id, error = %update_err, "Failed to record import job failure");
                }
                tracing::error!(job_id = %job_id, store_id = %job.store_id, error = %e, retryable = retryable, "Import job failed");
                Err(e)
            }
        }
    }

    /// Every processing failure is retryable: a rerun starts from the same
    /// watermark and reconciliation is idempotent.
    pub fn should_retry_on_processing_error(&self, _job: &ImportJob, _err: &SyncError) -> bool {
        true
    }

    /// Create, pre-process and process a job for `store_id`. Returns the
    /// stored job, failed or not; only bookkeeping errors surface as `Err`.
    pub async fn run(&self, store_id: &str) -> Result<ImportJob> {
        let job = self.create_job(store_id).await?;
        let job_id = job.id.ok_or_else(|| SyncError::Job("Created job has no id".to_string()))?;
        self.pre_process(job_id).await?;
        match self.process(job_id).await {
            Ok(job) => Ok(job),
            Err(_) => self.jobs.get_job(job_id).await,
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobRepository> {
        &self.jobs
    }
}
