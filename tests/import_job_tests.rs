mod common;

use std::sync::Arc;

use catalog_sync_service::models::*;
use catalog_sync_service::storage::{JobRepository, MemoryCatalog};
use catalog_sync_service::sync::{ImportStrategy, SyncEngine};

use common::{category, FakeSource};

fn strategy(source: FakeSource) -> (Arc<FakeSource>, MemoryCatalog, ImportStrategy) {
    let source = Arc::new(source);
    let catalog = MemoryCatalog::new();
    catalog.insert_store(Store::new("store_main", "Main store"));
    let engine = Arc::new(SyncEngine::with_catalog(source.clone(), catalog.clone(), DEFAULT_WATERMARK_KEY));
    (source, catalog.clone(), ImportStrategy::new(engine, Arc::new(catalog)))
}

#[tokio::test]
async fn test_pre_process_resets_progress() {
    let (_source, catalog, strategy) = strategy(FakeSource::default());
    let job = strategy.create_job("store_main").await.unwrap();
    assert_eq!(job.batch_type, ImportStrategy::BATCH_TYPE);

    let mut stale = job.clone();
    stale.progress = 42;
    stale.error = Some("previous attempt".to_string());
    catalog.update_job(&stale).await.unwrap();

    let job = strategy.pre_process(job.id.unwrap()).await.unwrap();
    assert_eq!(job.progress, 0);
    assert_eq!(job.status, JobStatus::PreProcessed);
    assert_eq!(job.error, None);
}

#[tokio::test]
async fn test_process_records_report() {
    let (_source, catalog, strategy) = strategy(FakeSource::with_categories(vec![
        category(1, None, "Women", "women"),
        category(2, Some(1), "Tops", "tops"),
    ]));

    let job = strategy.run("store_main").await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 2);
    let report = job.result.clone().unwrap();
    assert_eq!(report.categories.created, 2);

    let stored = catalog.get_job(job.id.unwrap()).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_failures_are_always_retryable() {
    let (source, catalog, strategy) = strategy(FakeSource::default());
    source.fail_categories(true);

    let job = strategy.create_job("store_main").await.unwrap();
    let job_id = job.id.unwrap();
    strategy.pre_process(job_id).await.unwrap();
    let err = strategy.process(job_id).await.unwrap_err();
    assert!(matches!(err, SyncError::Source { .. }));

    let stored = catalog.get_job(job_id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.retryable);
    assert!(stored.error.unwrap().contains("503"));
    assert!(strategy.should_retry_on_processing_error(&job, &SyncError::NotFound("anything".into())));
}

#[tokio::test]
async fn test_run_returns_failed_job() {
    let (source, _catalog, strategy) = strategy(FakeSource::default());
    source.fail_categories(true);

    let job = strategy.run("store_main").await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.retryable);

    let jobs = strategy.jobs().list_jobs(Some("store_main"), 10).await.unwrap();
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let (_source, _catalog, strategy) = strategy(FakeSource::default());
    let err = strategy.pre_process(mongodb::bson::oid::ObjectId::new()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}
