//! Graph persistence for imported instances
//!
//! ```text
//! ┌──────────────────────┐  HAS_DIMENSION  ┌────────────────────────┐
//! │ _{instance}_Instance │────────────────►│ _{instance}_{dimension}│
//! │  header, dimensions  │                 │  value                 │
//! └──────────────────────┘                 └───────────┬────────────┘
//!                                                      │ isValueOf
//!                                                      ▼
//! ┌──────────────────────┐     usedBy      ┌────────────────────────┐
//! │ _code_list           │◄────────────────│ _code                  │
//! │ _code_list_{id}      │   order, label  │  value                 │
//! └──────────────────────┘                 └────────────────────────┘
//! ```
//!
//! The importer talks to the graph only through [`Storer`]. [`GraphStore`]
//! is the in-process implementation: a labelled property graph with unique
//! constraints, optionally snapshotted to a JSON file.

pub mod cache;
pub mod graph;
pub mod store;

pub use cache::ConstraintCache;
pub use graph::{Node, NodeId, PropValue, PropertyGraph, Relationship, UniqueConstraint};
pub use store::{Code, CodeList, GraphStore};

use async_trait::async_trait;
use dimension_importer_model::{Dimension, ModelError};
use std::collections::HashMap;

// ============================================================================
// Store Interface
// ============================================================================

/// Graph operations the import pipeline depends on.
#[async_trait]
pub trait Storer: Send + Sync {
    /// Whether the instance root node has already been created.
    async fn instance_exists(&self, instance_id: &str) -> Result<bool, StoreError>;

    /// Create the instance root node holding the CSV header.
    async fn create_instance(&self, instance_id: &str, csv_header: &[String])
        -> Result<(), StoreError>;

    /// Merge a dimension option node and link it to its instance.
    ///
    /// The unique constraint for the dimension type is created the first
    /// time the type is seen, guarded by `cache`. Returns the dimension with
    /// `node_id` set.
    async fn insert_dimension(
        &self,
        cache: &ConstraintCache,
        instance_id: &str,
        dimension: Dimension,
    ) -> Result<Dimension, StoreError>;

    /// Order of each requested code within the code list. Codes that are not
    /// in the list are absent from the result; codes without an order map to
    /// `None`.
    async fn get_codes_order(
        &self,
        code_list_id: &str,
        codes: &[String],
    ) -> Result<HashMap<String, Option<i64>>, StoreError>;

    /// Link the instance's dimension option to its code-list entry.
    async fn create_code_relationship(
        &self,
        instance_id: &str,
        code_list_id: &str,
        code: &str,
    ) -> Result<(), StoreError>;

    /// Record the distinct dimension types on the instance node.
    async fn add_dimensions(
        &self,
        instance_id: &str,
        dimension_labels: &[String],
    ) -> Result<(), StoreError>;

    /// Unique constraint over the instance's observation rows.
    async fn create_instance_constraint(&self, instance_id: &str) -> Result<(), StoreError>;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("instance not found: {0}")]
    InstanceNotFound(String),
    #[error("instance already exists: {0}")]
    InstanceAlreadyExists(String),
    #[error("unique constraint on :{label}({property}) violated by value {value:?}")]
    ConstraintViolation {
        label: String,
        property: String,
        value: String,
    },
    #[error("invalid dimension: {0}")]
    InvalidDimension(#[from] ModelError),
    #[error("code list not found: {0}")]
    CodeListNotFound(String),
    #[error("code {code:?} not found in code list {code_list_id}")]
    CodeNotFound { code_list_id: String, code: String },
    #[error("no dimension option {option:?} found for instance {instance_id}")]
    DimensionNotFound { instance_id: String, option: String },
    #[error("snapshot IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("graph backend error: {0}")]
    Backend(String),
}
