use serde::{Deserialize, Serialize};

use crate::models::{Result, SyncError, DEFAULT_WATERMARK_KEY};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_database_name")]
    pub database_name: String,
    // Run each category unit of work in a MongoDB transaction (needs a replica set)
    #[serde(default)]
    pub mongodb_transactions: bool,
    #[serde(default = "default_magento_url")]
    pub magento_url: String,
    #[serde(default = "default_magento_store_code")]
    pub magento_store_code: String,
    #[serde(default)]
    pub magento_access_token: Option<String>,
    #[serde(default = "default_magento_page_size")]
    pub magento_page_size: u32,
    // Attribute codes whose metadata is fetched before products are imported
    #[serde(default = "default_custom_fields")]
    pub magento_custom_fields: Vec<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_http_user_agent")]
    pub http_user_agent: String,
    #[serde(default = "default_true")]
    pub enable_scheduler: bool,
    // Six-field cron expression (with seconds), as used by tokio-cron-scheduler
    #[serde(default = "default_sync_cron")]
    pub sync_cron: String,
    #[serde(default)]
    pub sync_store_ids: Vec<String>,
    #[serde(default = "default_watermark_key")]
    pub watermark_key: String,
}

fn default_port() -> u16 { 8091 }
fn default_mongodb_uri() -> String { "mongodb://localhost:27017".to_string() }
fn default_database_name() -> String { "catalog".to_string() }
fn default_magento_url() -> String { "http://localhost:8080".to_string() }
fn default_magento_store_code() -> String { "default".to_string() }
fn default_magento_page_size() -> u32 { 100 }
fn default_custom_fields() -> Vec<String> { vec!["color".to_string(), "size".to_string()] }
fn default_http_timeout_ms() -> u64 { 60000 }
fn default_http_user_agent() -> String { "catalog-sync-service/1.0".to_string() }
fn default_true() -> bool { true }
fn default_sync_cron() -> String { "0 0 * * * *".to_string() }
fn default_watermark_key() -> String { DEFAULT_WATERMARK_KEY.to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            mongodb_uri: default_mongodb_uri(),
            database_name: default_database_name(),
            mongodb_transactions: false,
            magento_url: default_magento_url(),
            magento_store_code: default_magento_store_code(),
            magento_access_token: None,
            magento_page_size: default_magento_page_size(),
            magento_custom_fields: default_custom_fields(),
            http_timeout_ms: default_http_timeout_ms(),
            http_user_agent: default_http_user_agent(),
            enable_scheduler: true,
            sync_cron: default_sync_cron(),
            sync_store_ids: Vec::new(),
            watermark_key: default_watermark_key(),
        }
    }
}

impl Config {
    /// Reads configuration from the process environment (`PORT`, `MONGODB_URI`,
    /// `MAGENTO_URL`, ...). List values are comma separated.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("magento_custom_fields")
                    .with_list_parse_key("sync_store_ids"),
            )
            .build()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        let cfg: Config = settings
            .try_deserialize()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.magento_page_size == 0 {
            return Err(SyncError::Configuration("MAGENTO_PAGE_SIZE must be greater than zero".to_string()));
        }
        if self.watermark_key.trim().is_empty() {
            return Err(SyncError::Configuration("WATERMARK_KEY must not be empty".to_string()));
        }
        url::Url::parse(&self.magento_url)
            .map_err(|e| SyncError::Configuration(format!("Invalid MAGENTO_URL '{}': {}", self.magento_url, e)))?;
        Ok(())
    }
}
