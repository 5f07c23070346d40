#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use catalog_sync_service::clients::CatalogSource;
use catalog_sync_service::models::*;

/// Scripted catalog source. Records the watermark of every category fetch.
#[derive(Default)]
pub struct FakeSource {
    pub categories: Mutex<Vec<SourceCategory>>,
    pub configurable: Mutex<Vec<SourceProduct>>,
    pub simple: Mutex<Vec<SourceProduct>>,
    pub fields: Vec<String>,
    pub fail_categories: Mutex<bool>,
    pub fail_attributes: bool,
    pub category_watermarks: Mutex<Vec<Option<String>>>,
    /// When set, category fetches wait for a notification.
    pub gate: Option<Arc<Notify>>,
}

impl FakeSource {
    pub fn with_categories(categories: Vec<SourceCategory>) -> Self {
        Self { categories: Mutex::new(categories), ..Default::default() }
    }

    pub fn set_categories(&self, categories: Vec<SourceCategory>) {
        *self.categories.lock().unwrap() = categories;
    }

    pub fn fail_categories(&self, fail: bool) {
        *self.fail_categories.lock().unwrap() = fail;
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    async fn list_categories(&self, updated_since: Option<&Watermark>) -> Result<Vec<SourceCategory>> {
        self.category_watermarks.lock().unwrap().push(updated_since.map(|w| w.to_string()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if *self.fail_categories.lock().unwrap() {
            return Err(SyncError::Source { status: 503, body: "maintenance".to_string() });
        }
        Ok(self.categories.lock().unwrap().clone())
    }

    async fn list_products(&self, kind: ProductKind, _updated_since: Option<&Watermark>) -> Result<Vec<SourceProduct>> {
        Ok(match kind {
            ProductKind::Configurable => self.configurable.lock().unwrap().clone(),
            ProductKind::Simple => self.simple.lock().unwrap().clone(),
        })
    }

    fn custom_field_names(&self) -> Vec<String> {
        self.fields.clone()
    }

    async fn attribute_metadata(&self, field: &str) -> Result<AttributeMeta> {
        if self.fail_attributes {
            return Err(SyncError::Source { status: 500, body: "attribute lookup failed".to_string() });
        }
        Ok(AttributeMeta {
            attribute_code: field.to_string(),
            frontend_input: Some("select".to_string()),
            default_frontend_label: None,
            options: vec![AttributeOption { label: "Red".to_string(), value: "58".to_string() }],
        })
    }
}

pub fn category(id: i64, parent_id: Option<i64>, name: &str, url_key: &str) -> SourceCategory {
    serde_json::from_value(json!({
        "id": id,
        "parent_id": parent_id,
        "name": name,
        "is_active": true,
        "position": id,
        "custom_attributes": [{"attribute_code": "url_key", "value": url_key}]
    }))
    .unwrap()
}

pub fn product(id: i64, sku: &str, type_id: &str, visibility: i64) -> SourceProduct {
    serde_json::from_value(json!({
        "id": id,
        "sku": sku,
        "name": sku,
        "type_id": type_id,
        "status": 1,
        "visibility": visibility,
        "custom_attributes": [{"attribute_code": "color", "value": "58"}]
    }))
    .unwrap()
}
