use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::clients::CatalogSource;
use crate::config::Config;
use crate::models::*;

/// Magento 2 REST client. Authenticates with an integration access token.
#[derive(Clone)]
pub struct MagentoClient {
    client: Client,
    base_url: Url,
    store_code: String,
    access_token: Option<String>,
    page_size: u32,
    custom_fields: Vec<String>,
}

/// One `searchCriteria` filter. Each filter gets its own filter group, so
/// filters are AND-ed together.
#[derive(Debug, Clone)]
struct SearchFilter {
    field: &'static str,
    value: String,
    condition: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResults<T> {
    items: Option<Vec<T>>,
    total_count: Option<u64>,
}

impl MagentoClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.magento_url)
            .map_err(|e| SyncError::Configuration(format!("Invalid MAGENTO_URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Configuration(format!("MAGENTO_URL '{}' cannot be used as a base URL", cfg.magento_url)));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.http_timeout_ms))
            .connect_timeout(Duration::from_millis(cfg.http_timeout_ms.min(10_000)))
            .user_agent(cfg.http_user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url,
            store_code: cfg.magento_store_code.clone(),
            access_token: cfg.magento_access_token.clone().filter(|t| !t.is_empty()),
            page_size: cfg.magento_page_size.max(1),
            custom_fields: cfg.magento_custom_fields.iter().filter(|f| !f.is_empty()).cloned().collect(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(["rest", self.store_code.as_str(), "V1"]);
            path.extend(segments);
        }
        url
    }

    fn search_url(&self, segments: &[&str], filters: &[SearchFilter], page: u32) -> Url {
        let mut url = self.endpoint(segments);
        {
            let mut query = url.query_pairs_mut();
            for (group, filter) in filters.iter().enumerate() {
                let prefix = format!("searchCriteria[filterGroups][{}][filters][0]", group);
                query.append_pair(&format!("{}[field]", prefix), filter.field);
                query.append_pair(&format!("{}[value]", prefix), &filter.value);
                query.append_pair(&format!("{}[conditionType]", prefix), filter.condition);
            }
            query.append_pair("searchCriteria[pageSize]", &self.page_size.to_string());
            query.append_pair("searchCriteria[currentPage]", &page.to_string());
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!(url = %url, "Sending Magento request");
        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Source { status: status.as_u16(), body });
        }
        Ok(response.json::<T>().await?)
    }

    /// Walks `currentPage` until `total_count` items are collected. Magento
    /// answers out-of-range pages with the last page again, so an empty or
    /// short page also stops the walk.
    async fn search_all<T: DeserializeOwned>(&self, segments: &[&str], filters: &[SearchFilter]) -> Result<Vec<T>> {
        let mut collected: Vec<T> = Vec::new();
        let mut page: u32 = 1;
        loop {
            let url = self.search_url(segments, filters, page);
            let results: SearchResults<T> = self.get_json(url).await?;
            let items = results.items.unwrap_or_default();
            let fetched = items.len();
            collected.extend(items);

            let total = results.total_count.unwrap_or(collected.len() as u64);
            tracing::debug!(
                endpoint = %segments.join("/"),
                page = page,
                fetched = fetched,
                collected = collected.len(),
                total = total,
                "Fetched Magento page"
            );

            if fetched == 0 || fetched < self.page_size as usize || collected.len() as u64 >= total {
                break;
            }
            page += 1;
        }
        Ok(collected)
    }

    fn updated_since_filter(updated_since: Option<&Watermark>) -> Option<SearchFilter> {
        updated_since.map(|wm| SearchFilter {
            field: "updated_at",
            value: wm.as_source_filter(),
            condition: "gt",
        })
    }
}

#[async_trait]
impl CatalogSource for MagentoClient {
    async fn list_categories(&self, updated_since: Option<&Watermark>) -> Result<Vec<SourceCategory>> {
        let filters: Vec<SearchFilter> = Self::updated_since_filter(updated_since).into_iter().collect();
        self.search_all(&["categories", "list"], &filters).await
    }

    async fn list_products(&self, kind: ProductKind, updated_since: Option<&Watermark>) -> Result<Vec<SourceProduct>> {
        let mut filters = vec![SearchFilter {
            field: "type_id",
            value: kind.as_str().to_string(),
            condition: "eq",
        }];
        filters.extend(Self::updated_since_filter(updated_since));
        self.search_all(&["products"], &filters).await
    }

    fn custom_field_names(&self) -> Vec<String> {
        self.custom_fields.clone()
    }

    async fn attribute_metadata(&self, field: &str) -> Result<AttributeMeta> {
        let url = self.endpoint(&["products", "attributes", field]);
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> MagentoClient {
        let cfg = Config { magento_url: base.to_string(), magento_page_size: 50, ..Config::default() };
        MagentoClient::new(&cfg).unwrap()
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let c = client("http://shop.test/magento/");
        assert_eq!(c.endpoint(&["categories", "list"]).as_str(), "http://shop.test/magento/rest/default/V1/categories/list");
        let c = client("http://shop.test");
        assert_eq!(c.endpoint(&["products", "attributes", "color"]).as_str(), "http://shop.test/rest/default/V1/products/attributes/color");
    }

    #[test]
    fn search_url_encodes_filter_groups() {
        let c = client("http://shop.test");
        let filters = vec![
            SearchFilter { field: "type_id", value: "simple".into(), condition: "eq" },
            SearchFilter { field: "updated_at", value: "2024-01-02 03:04:05".into(), condition: "gt" },
        ];
        let url = c.search_url(&["products"], &filters, 2);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("searchCriteria[filterGroups][0][filters][0][field]".into(), "type_id".into())));
        assert!(pairs.contains(&("searchCriteria[filterGroups][1][filters][0][value]".into(), "2024-01-02 03:04:05".into())));
        assert!(pairs.contains(&("searchCriteria[filterGroups][1][filters][0][conditionType]".into(), "gt".into())));
        assert!(pairs.contains(&("searchCriteria[pageSize]".into(), "50".into())));
        assert!(pairs.contains(&("searchCriteria[currentPage]".into(), "2".into())));
    }
}
