use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::models::*;

/// Maps Magento records onto the destination model and computes the
/// field-level change set against what the destination already holds.
#[derive(Debug, Clone, Default)]
pub struct FieldMapper;

impl FieldMapper {
    pub fn new() -> Self {
        Self
    }

    /// Categories without an `is_active` flag are treated as active.
    pub fn normalize_category(&self, source: &SourceCategory) -> CategoryFields {
        CategoryFields {
            name: source.name.clone(),
            handle: source.handle(),
            is_active: source.is_active.unwrap_or(true),
            metadata: self.source_metadata(source.id),
        }
    }

    /// Only fields whose normalized value differs from `existing` end up in
    /// the update. Metadata keys not produced by the mapping are never touched.
    pub fn diff_category(&self, existing: &DestinationCategory, fields: &CategoryFields) -> CategoryUpdate {
        let mut update = CategoryUpdate::default();
        if existing.name != fields.name {
            update.name = Some(fields.name.clone());
        }
        if !fields.handle.is_empty() && existing.handle != fields.handle {
            update.handle = Some(fields.handle.clone());
        }
        if existing.is_active != fields.is_active {
            update.is_active = Some(fields.is_active);
        }
        update.metadata = self.diff_metadata(&existing.metadata, &fields.metadata);
        update
    }

    pub fn normalize_product(&self, source: &SourceProduct, kind: ProductKind, attributes: &AttributeCatalog) -> ProductFields {
        let title = if source.name.trim().is_empty() { source.sku.clone() } else { source.name.clone() };
        let status = if source.is_enabled() { ProductStatus::Published } else { ProductStatus::Draft };

        ProductFields {
            title,
            handle: source.handle(),
            external_id: source.sku.clone(),
            product_type: kind,
            status,
            price: source.price,
            attributes: attributes.resolve(source),
            metadata: self.source_metadata(source.id),
        }
    }

    fn source_metadata(&self, source_id: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([(MAGENTO_ID_METADATA_KEY.to_string(), json!(source_id))])
    }

    fn diff_metadata(&self, existing: &BTreeMap<String, Value>, incoming: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        incoming
            .iter()
            .filter(|(key, value)| existing.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: i64, name: &str, url_key: Option<&str>, is_active: Option<bool>) -> SourceCategory {
        SourceCategory {
            id,
            parent_id: Some(2),
            name: name.to_string(),
            is_active,
            position: 3,
            level: Some(2),
            updated_at: None,
            custom_attributes: url_key
                .map(|k| vec![CustomAttribute { attribute_code: URL_KEY_ATTRIBUTE.into(), value: json!(k) }])
                .unwrap_or_default(),
        }
    }

    #[test]
    fn normalizes_category_with_active_default() {
        let mapper = FieldMapper::new();
        let fields = mapper.normalize_category(&source(7, "Shoes ", Some("shoes"), None));
        assert_eq!(fields.name, "Shoes ");
        assert_eq!(fields.handle, Handle::new("shoes"));
        assert!(fields.is_active);
        assert_eq!(fields.metadata.get(MAGENTO_ID_METADATA_KEY), Some(&json!(7)));
    }

    #[test]
    fn diff_is_empty_when_nothing_changed() {
        let mapper = FieldMapper::new();
        let fields = mapper.normalize_category(&source(7, "Shoes", Some("shoes"), Some(true)));
        let mut existing = DestinationCategory::from_new(NewCategory {
            fields: fields.clone(),
            parent_category_id: None,
            rank: None,
        });
        existing.metadata.insert("curated".into(), json!(true));
        assert!(mapper.diff_category(&existing, &fields).is_empty());
    }

    #[test]
    fn diff_contains_only_changed_fields() {
        let mapper = FieldMapper::new();
        let original = mapper.normalize_category(&source(7, "Shoes", Some("shoes"), Some(true)));
        let existing = DestinationCategory::from_new(NewCategory { fields: original, parent_category_id: None, rank: None });

        let changed = mapper.normalize_category(&source(8, "Shoes", Some("shoes"), Some(false)));
        let update = mapper.diff_category(&existing, &changed);
        assert_eq!(update.name, None);
        assert_eq!(update.handle, None);
        assert_eq!(update.is_active, Some(false));
        assert_eq!(update.metadata, BTreeMap::from([(MAGENTO_ID_METADATA_KEY.to_string(), json!(8))]));
    }

    #[test]
    fn product_status_follows_source_status() {
        let mapper = FieldMapper::new();
        let product: SourceProduct = serde_json::from_value(json!({
            "id": 5, "sku": "TEE-1", "name": "", "status": 2, "price": 19.5,
            "custom_attributes": [{"attribute_code": "url_key", "value": "tee"}]
        }))
        .unwrap();
        let fields = mapper.normalize_product(&product, ProductKind::Simple, &AttributeCatalog::default());
        assert_eq!(fields.title, "TEE-1");
        assert_eq!(fields.handle, Handle::new("tee"));
        assert_eq!(fields.status, ProductStatus::Draft);
        assert_eq!(fields.price, Some(19.5));
        assert_eq!(fields.product_type, ProductKind::Simple);
    }
}
