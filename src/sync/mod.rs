pub mod engine;
pub mod job;
pub mod products;
pub mod reconciler;

pub use engine::SyncEngine;
pub use job::ImportStrategy;
pub use products::{import_products, ProductImporter, ProductUpserter};
pub use reconciler::{CategoryBatch, CategoryReconciler, ReconcileOutcome};
