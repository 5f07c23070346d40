pub mod cli;
pub mod clients;
pub mod config;
pub mod mapping;
pub mod models;
pub mod schema;
pub mod storage;
pub mod sync;

// Convenient re-exports for tests and external callers
pub use clients::*;
pub use config::*;
pub use mapping::*;
pub use models::*;
pub use storage::*;
pub use sync::{CategoryBatch, CategoryReconciler, ImportStrategy, ProductImporter, ProductUpserter, SyncEngine};
