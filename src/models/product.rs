use std::collections::{BTreeMap, HashMap};
use std::fmt;

use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{find_attribute, CustomAttribute, Handle, URL_KEY_ATTRIBUTE};

/// Magento `type_id` partitions the import walks, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Configurable,
    Simple,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Configurable => "configurable",
            ProductKind::Simple => "simple",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Magento visibility `1`: not visible individually (child of a configurable).
pub const VISIBILITY_NOT_VISIBLE_INDIVIDUALLY: i64 = 1;
/// Magento status `1`: enabled.
pub const STATUS_ENABLED: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProduct {
    pub id: i64,
    pub sku: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub type_id: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub visibility: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl SourceProduct {
    /// `url_key` when present, otherwise the lower-cased sku.
    pub fn handle(&self) -> Handle {
        match find_attribute(&self.custom_attributes, URL_KEY_ATTRIBUTE) {
            Some(key) if !key.is_empty() => Handle::new(key),
            _ => Handle::new(self.sku.to_lowercase()),
        }
    }

    pub fn is_variant_child(&self) -> bool {
        self.visibility == Some(VISIBILITY_NOT_VISIBLE_INDIVIDUALLY)
    }

    pub fn is_enabled(&self) -> bool {
        self.status.unwrap_or(STATUS_ENABLED) == STATUS_ENABLED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub label: String,
    #[serde(default)]
    pub value: String,
}

/// Response of `V1/products/attributes/{code}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMeta {
    pub attribute_code: String,
    #[serde(default)]
    pub frontend_input: Option<String>,
    #[serde(default)]
    pub default_frontend_label: Option<String>,
    #[serde(default)]
    pub options: Vec<AttributeOption>,
}

impl AttributeMeta {
    pub fn label_for(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }
}

/// Attribute metadata fetched once per pass, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct AttributeCatalog {
    attributes: HashMap<String, AttributeMeta>,
}

impl AttributeCatalog {
    pub fn insert(&mut self, field: impl Into<String>, meta: AttributeMeta) {
        self.attributes.insert(field.into(), meta);
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Resolves every known custom attribute on `product` to a display label.
    /// Select options map through the option list; anything else keeps its raw value.
    pub fn resolve(&self, product: &SourceProduct) -> BTreeMap<String, String> {
        let mut resolved = BTreeMap::new();
        for (field, meta) in &self.attributes {
            let raw = match find_attribute(&product.custom_attributes, field) {
                Some(v) => v,
                None => continue,
            };
            let label = meta.label_for(raw).unwrap_or(raw);
            resolved.insert(field.clone(), label.to_string());
        }
        resolved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Published,
    Draft,
}

/// Normalized product payload; the store upserts it by handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFields {
    pub title: String,
    pub handle: Handle,
    pub external_id: String,
    pub product_type: ProductKind,
    pub status: ProductStatus,
    pub price: Option<f64>,
    pub attributes: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationProduct {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub handle: Handle,
    pub external_id: String,
    pub product_type: ProductKind,
    pub status: ProductStatus,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Skipped,
}
