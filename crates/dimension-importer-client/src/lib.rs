//! Dataset API access for the dimension importer
//!
//! The importer reads instance metadata and dimension options from the
//! dataset API and writes back the graph node id and code-list order of each
//! option once it has been inserted into the graph.

pub mod http;

pub use http::{ClientConfig, HttpDatasetClient, DEFAULT_BATCH_SIZE};

use async_trait::async_trait;
use dimension_importer_model::{Dimension, InstanceMetadata};

/// Dataset API operations the import pipeline depends on.
#[async_trait]
pub trait DatasetClient: Send + Sync {
    /// Instance metadata, including the V4 CSV header.
    async fn get_instance(&self, instance_id: &str) -> Result<InstanceMetadata, ClientError>;

    /// Every dimension option of the instance.
    async fn get_dimensions(&self, instance_id: &str) -> Result<Vec<Dimension>, ClientError>;

    /// Record the graph node id and code-list order of a dimension option.
    async fn patch_dimension_option(
        &self,
        instance_id: &str,
        dimension_id: &str,
        option: &str,
        node_id: &str,
        order: Option<i64>,
    ) -> Result<(), ClientError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },
    #[error("invalid dataset API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("dataset API error: {0}")]
    Api(String),
}
