use std::collections::BTreeMap;
use std::fmt;

use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{find_attribute, generate_id, CustomAttribute};

pub const URL_KEY_ATTRIBUTE: &str = "url_key";
pub const MAGENTO_ID_METADATA_KEY: &str = "magento_id";

/// Cross-system join key. An empty handle carries no identity and is never
/// used for lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category record as returned by `V1/categories/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCategory {
    pub id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl SourceCategory {
    pub fn handle(&self) -> Handle {
        Handle::new(find_attribute(&self.custom_attributes, URL_KEY_ATTRIBUTE).unwrap_or_default())
    }

    /// Source id of the parent; `0` and absent both mean root.
    pub fn parent_source_id(&self) -> Option<i64> {
        self.parent_id.filter(|id| *id != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationCategory {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub handle: Handle,
    pub is_active: bool,
    #[serde(default)]
    pub parent_category_id: Option<String>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// Normalized destination payload derived from one source category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFields {
    pub name: String,
    pub handle: Handle,
    pub is_active: bool,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub fields: CategoryFields,
    pub parent_category_id: Option<String>,
    pub rank: Option<i64>,
}

impl DestinationCategory {
    pub fn from_new(new: NewCategory) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: generate_id("pcat"),
            name: new.fields.name,
            handle: new.fields.handle,
            is_active: new.fields.is_active,
            parent_category_id: new.parent_category_id,
            rank: new.rank,
            metadata: new.fields.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `None` fields are left untouched; metadata entries are
/// merged key by key so keys owned by the destination survive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub handle: Option<Handle>,
    pub is_active: Option<bool>,
    pub parent_category_id: Option<String>,
    pub rank: Option<i64>,
    pub metadata: BTreeMap<String, Value>,
}

impl CategoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.handle.is_none()
            && self.is_active.is_none()
            && self.parent_category_id.is_none()
            && self.rank.is_none()
            && self.metadata.is_empty()
    }

    pub fn changed_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.name.is_some() { fields.push("name".to_string()); }
        if self.handle.is_some() { fields.push("handle".to_string()); }
        if self.is_active.is_some() { fields.push("is_active".to_string()); }
        if self.parent_category_id.is_some() { fields.push("parent_category_id".to_string()); }
        if self.rank.is_some() { fields.push("rank".to_string()); }
        for key in self.metadata.keys() {
            fields.push(format!("metadata.{}", key));
        }
        fields
    }

    pub fn apply_to(&self, category: &mut DestinationCategory) {
        if let Some(name) = &self.name { category.name = name.clone(); }
        if let Some(handle) = &self.handle { category.handle = handle.clone(); }
        if let Some(is_active) = self.is_active { category.is_active = is_active; }
        if let Some(parent) = &self.parent_category_id { category.parent_category_id = Some(parent.clone()); }
        if let Some(rank) = self.rank { category.rank = Some(rank); }
        for (key, value) in &self.metadata {
            category.metadata.insert(key.clone(), value.clone());
        }
        category.updated_at = BsonDateTime::now();
    }
}
