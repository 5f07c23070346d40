pub mod category;
pub mod product;
pub mod store;
pub mod job;

pub use category::*;
pub use product::*;
pub use store::*;
pub use job::*;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("BSON encoding error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Catalog source request failed with status {status}: {body}")]
    Source { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A category with handle '{0}' already exists")]
    DuplicateHandle(String),

    #[error("Refusing to link category '{handle}' under '{parent_handle}': it would become its own ancestor")]
    CategoryCycle { handle: String, parent_handle: String },

    #[error("Sync already in progress for store {0}")]
    SyncInProgress(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Job error: {0}")]
    Job(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// A Magento `custom_attributes` entry. Values are usually strings but some
/// attributes (e.g. `category_ids`) come back as arrays.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CustomAttribute {
    pub attribute_code: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Returns the first string value stored under `code`.
pub fn find_attribute<'a>(attributes: &'a [CustomAttribute], code: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.attribute_code == code)
        .and_then(|a| a.value.as_str())
}

/// Prefixed opaque id in the style of the destination platform (`pcat_...`, `prod_...`).
pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
