//! HTTP implementation of [`DatasetClient`].

use crate::{ClientError, DatasetClient};
use async_trait::async_trait;
use dimension_importer_model::{Dimension, InstanceMetadata};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BATCH_SIZE: usize = 200;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as a bearer token when present
    pub service_auth_token: Option<String>,
    /// Dimension options requested per page
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            service_auth_token: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: 30,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.service_auth_token = Some(token.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct InstanceResponse {
    id: String,
    #[serde(default)]
    headers: Vec<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DimensionsPage {
    #[serde(default)]
    items: Vec<DimensionItem>,
    #[serde(default)]
    total_count: usize,
}

#[derive(Debug, Deserialize)]
struct DimensionItem {
    dimension: String,
    option: String,
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    links: DimensionLinks,
}

#[derive(Debug, Default, Deserialize)]
struct DimensionLinks {
    #[serde(default)]
    code_list: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    id: String,
}

impl From<DimensionItem> for Dimension {
    fn from(item: DimensionItem) -> Self {
        Dimension {
            dimension_id: item.dimension,
            option: item.option,
            node_id: item.node_id,
            code_list_id: item.links.code_list.map(|l| l.id).unwrap_or_default(),
            order: item.order,
        }
    }
}

/// JSON Patch operations setting the node id and (if known) the order.
fn dimension_option_patch(node_id: &str, order: Option<i64>) -> serde_json::Value {
    let mut ops = vec![serde_json::json!({
        "op": "add",
        "path": "/node_id",
        "value": node_id,
    })];
    if let Some(order) = order {
        ops.push(serde_json::json!({
            "op": "add",
            "path": "/order",
            "value": order,
        }));
    }
    serde_json::Value::Array(ops)
}

// ============================================================================
// Client
// ============================================================================

pub struct HttpDatasetClient {
    client: Client,
    base_url: Url,
    config: ClientConfig,
}

impl HttpDatasetClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.base_url)?;
        if config.batch_size == 0 {
            return Err(ClientError::Api("batch size must be positive".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path: Vec<String> = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}", base, path.join("/"))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.service_auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response, resource: impl FnOnce() -> String) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                resource: resource(),
            });
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::UnexpectedStatus {
            status: status.as_u16(),
            url,
            body,
        })
    }

    async fn get_dimensions_page(
        &self,
        instance_id: &str,
        offset: usize,
    ) -> Result<DimensionsPage, ClientError> {
        let url = self.url(&["instances", instance_id, "dimensions"]);
        let request = self
            .client
            .get(&url)
            .query(&[("offset", offset), ("limit", self.config.batch_size)]);
        let response = self.authorize(request).send().await?;
        let response = Self::check(response, || format!("dimensions of instance {instance_id}")).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DatasetClient for HttpDatasetClient {
    async fn get_instance(&self, instance_id: &str) -> Result<InstanceMetadata, ClientError> {
        let url = self.url(&["instances", instance_id]);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = Self::check(response, || format!("instance {instance_id}")).await?;
        let instance: InstanceResponse = response.json().await?;

        Ok(InstanceMetadata {
            instance_id: instance.id,
            csv_header: instance.headers,
            state: instance.state,
        })
    }

    async fn get_dimensions(&self, instance_id: &str) -> Result<Vec<Dimension>, ClientError> {
        let mut dimensions = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.get_dimensions_page(instance_id, offset).await?;
            let fetched = page.items.len();
            dimensions.extend(page.items.into_iter().map(Dimension::from));
            offset += fetched;

            tracing::debug!(
                instance_id,
                fetched,
                total = page.total_count,
                "fetched dimension batch"
            );
            if fetched == 0 || offset >= page.total_count {
                break;
            }
        }

        Ok(dimensions)
    }

    async fn patch_dimension_option(
        &self,
        instance_id: &str,
        dimension_id: &str,
        option: &str,
        node_id: &str,
        order: Option<i64>,
    ) -> Result<(), ClientError> {
        let url = self.url(&[
            "instances",
            instance_id,
            "dimensions",
            dimension_id,
            "options",
            option,
        ]);
        let request = self
            .client
            .patch(&url)
            .json(&dimension_option_patch(node_id, order));
        let response = self.authorize(request).send().await?;
        Self::check(response, || {
            format!("option {option} of dimension {dimension_id} on instance {instance_id}")
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_omits_order_when_unknown() {
        assert_eq!(
            dimension_option_patch("42", None),
            serde_json::json!([{"op": "add", "path": "/node_id", "value": "42"}])
        );
        assert_eq!(
            dimension_option_patch("42", Some(3))[1],
            serde_json::json!({"op": "add", "path": "/order", "value": 3})
        );
    }

    #[test]
    fn dimension_item_takes_code_list_from_links() {
        let item: DimensionItem = serde_json::from_value(serde_json::json!({
            "dimension": "geography",
            "option": "K02000001",
            "links": {"code_list": {"id": "geo-cl", "href": "http://codes/geo-cl"}}
        }))
        .unwrap();
        let dimension = Dimension::from(item);
        assert_eq!(dimension.code_list_id, "geo-cl");
        assert_eq!(dimension.order, None);
        assert!(dimension.node_id.is_empty());
    }

    #[test]
    fn url_segments_are_encoded() {
        let client = HttpDatasetClient::new(ClientConfig::new("http://localhost:22000/")).unwrap();
        assert_eq!(
            client.url(&["instances", "1", "dimensions", "age", "options", "30 to 34"]),
            "http://localhost:22000/instances/1/dimensions/age/options/30%20to%2034"
        );
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = ClientConfig::new("http://localhost").with_batch_size(0);
        assert!(matches!(HttpDatasetClient::new(config), Err(ClientError::Api(_))));
    }
}
