//! In-process [`Storer`] backed by a [`PropertyGraph`].

use crate::graph::{PropValue, PropertyGraph};
use crate::{ConstraintCache, Storer, StoreError};
use async_trait::async_trait;
use dimension_importer_model::Dimension;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CODE_LIST_LABEL: &str = "_code_list";
pub const CODE_LABEL: &str = "_code";
pub const HAS_DIMENSION: &str = "HAS_DIMENSION";
pub const USED_BY: &str = "usedBy";
pub const IS_VALUE_OF: &str = "isValueOf";
pub const VALUE_PROPERTY: &str = "value";
pub const CODE_LIST_PROPERTY: &str = "code_list_id";
pub const ROW_INDEX_PROPERTY: &str = "rowIndex";

pub fn instance_label(instance_id: &str) -> String {
    format!("_{instance_id}_Instance")
}

pub fn dimension_label(instance_id: &str, dimension_id: &str) -> String {
    format!("_{instance_id}_{dimension_id}")
}

pub fn code_list_label(code_list_id: &str) -> String {
    format!("{CODE_LIST_LABEL}_{code_list_id}")
}

pub fn observation_label(instance_id: &str) -> String {
    format!("_{instance_id}_observation")
}

// ============================================================================
// Code Lists
// ============================================================================

/// A code list as loaded into the graph ahead of any import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeList {
    pub id: String,
    pub codes: Vec<Code>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub code: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub order: Option<i64>,
}

// ============================================================================
// Graph Store
// ============================================================================

pub struct GraphStore {
    graph: Arc<RwLock<PropertyGraph>>,
    snapshot_path: Option<PathBuf>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    /// Purely in-memory store.
    pub fn new() -> Self {
        Self {
            graph: Arc::new(RwLock::new(PropertyGraph::new())),
            snapshot_path: None,
        }
    }

    /// Store backed by a JSON snapshot, loaded if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let graph = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let mut graph: PropertyGraph = serde_json::from_str(&contents)?;
            graph.reindex();
            graph
        } else {
            PropertyGraph::new()
        };

        Ok(Self {
            graph: Arc::new(RwLock::new(graph)),
            snapshot_path: Some(path),
        })
    }

    /// Write the snapshot. Returns `false` for an in-memory store.
    pub fn save(&self) -> Result<bool, StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(false);
        };
        let json = serde_json::to_string_pretty(&*self.graph.read())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "graph snapshot saved");
        Ok(true)
    }

    pub fn graph(&self) -> Arc<RwLock<PropertyGraph>> {
        Arc::clone(&self.graph)
    }

    /// Load a code list and its codes. Re-importing the same list merges.
    pub fn import_code_list(&self, code_list: &CodeList) -> Result<usize, StoreError> {
        let mut graph = self.graph.write();
        let list_node = graph.merge_node(
            &code_list_label(&code_list.id),
            "id",
            code_list.id.as_str().into(),
            &[CODE_LIST_LABEL],
        )?;

        let mut created = 0;
        for code in &code_list.codes {
            let existing = graph
                .incoming(list_node, USED_BY)
                .map(|r| r.from)
                .find(|id| {
                    graph
                        .node(*id)
                        .and_then(|n| n.prop(VALUE_PROPERTY))
                        .and_then(PropValue::as_str)
                        == Some(code.code.as_str())
                });
            if existing.is_some() {
                continue;
            }

            let code_node = graph.create_node(
                [CODE_LABEL.to_string()],
                BTreeMap::from([(VALUE_PROPERTY.to_string(), code.code.as_str().into())]),
            )?;
            let mut rel_props = BTreeMap::from([("label".to_string(), code.label.as_str().into())]);
            if let Some(order) = code.order {
                rel_props.insert("order".to_string(), PropValue::Int(order));
            }
            graph.merge_relationship(code_node, list_node, USED_BY, rel_props);
            created += 1;
        }

        tracing::info!(code_list_id = %code_list.id, codes = created, "code list imported");
        Ok(created)
    }

    /// Dimension types recorded on the instance node by `add_dimensions`.
    pub fn instance_dimensions(&self, instance_id: &str) -> Option<Vec<String>> {
        let graph = self.graph.read();
        let id = graph.first_with_label(&instance_label(instance_id))?;
        graph
            .node(id)?
            .prop("dimensions")
            .and_then(PropValue::as_list)
            .map(<[String]>::to_vec)
    }
}

#[async_trait]
impl Storer for GraphStore {
    async fn instance_exists(&self, instance_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .graph
            .read()
            .first_with_label(&instance_label(instance_id))
            .is_some())
    }

    async fn create_instance(
        &self,
        instance_id: &str,
        csv_header: &[String],
    ) -> Result<(), StoreError> {
        let label = instance_label(instance_id);
        let mut graph = self.graph.write();
        if graph.first_with_label(&label).is_some() {
            return Err(StoreError::InstanceAlreadyExists(instance_id.to_string()));
        }
        let props = BTreeMap::from([
            ("id".to_string(), instance_id.into()),
            ("header".to_string(), PropValue::List(csv_header.to_vec())),
        ]);
        graph.create_node([label], props)?;
        Ok(())
    }

    async fn insert_dimension(
        &self,
        cache: &ConstraintCache,
        instance_id: &str,
        dimension: Dimension,
    ) -> Result<Dimension, StoreError> {
        dimension.validate()?;
        let label = dimension_label(instance_id, &dimension.dimension_id);

        let created = cache
            .ensure(&label, || {
                let result = self
                    .graph
                    .write()
                    .create_unique_constraint(&label, VALUE_PROPERTY)
                    .map(|_| ());
                std::future::ready(result)
            })
            .await?;
        if created {
            tracing::debug!(%label, "dimension constraint created");
        }

        let mut graph = self.graph.write();
        let instance_node = graph
            .first_with_label(&instance_label(instance_id))
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;
        let node_id = graph.merge_node(
            &label,
            VALUE_PROPERTY,
            dimension.option.as_str().into(),
            &[],
        )?;
        graph.set_prop(
            node_id,
            CODE_LIST_PROPERTY,
            dimension.code_list_id.as_str().into(),
        );
        graph.merge_relationship(instance_node, node_id, HAS_DIMENSION, BTreeMap::new());

        Ok(dimension.with_node_id(node_id.to_string()))
    }

    async fn get_codes_order(
        &self,
        code_list_id: &str,
        codes: &[String],
    ) -> Result<HashMap<String, Option<i64>>, StoreError> {
        let graph = self.graph.read();
        let list_node = graph
            .first_with_label(&code_list_label(code_list_id))
            .ok_or_else(|| StoreError::CodeListNotFound(code_list_id.to_string()))?;

        let mut orders = HashMap::new();
        for rel in graph.incoming(list_node, USED_BY) {
            let Some(value) = graph
                .node(rel.from)
                .and_then(|n| n.prop(VALUE_PROPERTY))
                .and_then(PropValue::as_str)
            else {
                continue;
            };
            if codes.iter().any(|c| c == value) {
                let order = rel.props.get("order").and_then(PropValue::as_int);
                orders.insert(value.to_string(), order);
            }
        }
        Ok(orders)
    }

    async fn create_code_relationship(
        &self,
        instance_id: &str,
        code_list_id: &str,
        code: &str,
    ) -> Result<(), StoreError> {
        let mut graph = self.graph.write();
        let instance_node = graph
            .first_with_label(&instance_label(instance_id))
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;
        let list_node = graph
            .first_with_label(&code_list_label(code_list_id))
            .ok_or_else(|| StoreError::CodeListNotFound(code_list_id.to_string()))?;

        let has_value = |id: u64| {
            graph
                .node(id)
                .and_then(|n| n.prop(VALUE_PROPERTY))
                .and_then(PropValue::as_str)
                == Some(code)
        };

        let code_node = graph
            .incoming(list_node, USED_BY)
            .map(|r| r.from)
            .find(|id| has_value(*id))
            .ok_or_else(|| StoreError::CodeNotFound {
                code_list_id: code_list_id.to_string(),
                code: code.to_string(),
            })?;
        // options of other dimension types can share the code's value
        let in_code_list = |id: u64| {
            graph
                .node(id)
                .and_then(|n| n.prop(CODE_LIST_PROPERTY))
                .and_then(PropValue::as_str)
                == Some(code_list_id)
        };
        let dimension_nodes: Vec<u64> = graph
            .outgoing(instance_node, HAS_DIMENSION)
            .map(|r| r.to)
            .filter(|id| has_value(*id) && in_code_list(*id))
            .collect();
        if dimension_nodes.is_empty() {
            return Err(StoreError::DimensionNotFound {
                instance_id: instance_id.to_string(),
                option: code.to_string(),
            });
        }

        for node in dimension_nodes {
            graph.merge_relationship(node, code_node, IS_VALUE_OF, BTreeMap::new());
        }
        Ok(())
    }

    async fn add_dimensions(
        &self,
        instance_id: &str,
        dimension_labels: &[String],
    ) -> Result<(), StoreError> {
        let mut graph = self.graph.write();
        let instance_node = graph
            .first_with_label(&instance_label(instance_id))
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;
        graph.set_prop(
            instance_node,
            "dimensions",
            PropValue::List(dimension_labels.to_vec()),
        );
        Ok(())
    }

    async fn create_instance_constraint(&self, instance_id: &str) -> Result<(), StoreError> {
        self.graph
            .write()
            .create_unique_constraint(&observation_label(instance_id), ROW_INDEX_PROPERTY)?;
        Ok(())
    }
}
