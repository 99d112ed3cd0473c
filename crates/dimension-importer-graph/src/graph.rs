//! Labelled property graph with unique constraints.
//!
//! Nodes carry a set of labels and string-keyed properties; relationships are
//! typed and directed. A unique constraint on `(label, property)` is checked
//! whenever a node with that label is created.
//!
//! Lookups by label, by `(label, property, value)` and by `(node, type)` go
//! through indexes that are not serialized; call [`PropertyGraph::reindex`]
//! after loading a snapshot.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type NodeId = u64;

/// (label, property, value text)
type PropKey = (String, String, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PropValue::List(items) => Some(items),
            _ => None,
        }
    }

    fn key_text(&self) -> String {
        match self {
            PropValue::Int(i) => i.to_string(),
            PropValue::Str(s) => s.clone(),
            PropValue::List(items) => items.join(","),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<Vec<String>> for PropValue {
    fn from(value: Vec<String>) -> Self {
        PropValue::List(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub labels: BTreeSet<String>,
    pub props: BTreeMap<String, PropValue>,
}

impl Node {
    pub fn prop(&self, key: &str) -> Option<&PropValue> {
        self.props.get(key)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: NodeId,
    pub to: NodeId,
    pub rel_type: String,
    #[serde(default)]
    pub props: BTreeMap<String, PropValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub label: String,
    pub property: String,
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PropertyGraph {
    next_id: NodeId,
    nodes: BTreeMap<NodeId, Node>,
    relationships: Vec<Relationship>,
    constraints: BTreeSet<UniqueConstraint>,
    /// label -> node ids; rebuilt after loading a snapshot
    #[serde(skip)]
    label_index: HashMap<String, BTreeSet<NodeId>>,
    #[serde(skip)]
    prop_index: HashMap<PropKey, BTreeSet<NodeId>>,
    /// (from, type) -> positions in `relationships`
    #[serde(skip)]
    out_index: HashMap<(NodeId, String), Vec<usize>>,
    /// (to, type) -> positions in `relationships`
    #[serde(skip)]
    in_index: HashMap<(NodeId, String), Vec<usize>>,
}

fn prop_key(label: &str, property: &str, value: &PropValue) -> PropKey {
    (label.to_string(), property.to_string(), value.key_text())
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild derived indexes after deserialization.
    pub fn reindex(&mut self) {
        self.label_index.clear();
        self.prop_index.clear();
        self.out_index.clear();
        self.in_index.clear();

        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            self.index_node(id);
        }
        for position in 0..self.relationships.len() {
            self.index_relationship(position);
        }
    }

    fn index_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for label in &node.labels {
            self.label_index.entry(label.clone()).or_default().insert(id);
            for (property, value) in &node.props {
                self.prop_index
                    .entry(prop_key(label, property, value))
                    .or_default()
                    .insert(id);
            }
        }
    }

    fn index_relationship(&mut self, position: usize) {
        let Some(rel) = self.relationships.get(position) else {
            return;
        };
        self.out_index
            .entry((rel.from, rel.rel_type.clone()))
            .or_default()
            .push(position);
        self.in_index
            .entry((rel.to, rel.rel_type.clone()))
            .or_default()
            .push(position);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes_with_label<'a>(&'a self, label: &str) -> impl Iterator<Item = &'a Node> + 'a {
        self.label_index
            .get(label)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(move |id| self.nodes.get(id))
    }

    pub fn first_with_label(&self, label: &str) -> Option<NodeId> {
        self.label_index
            .get(label)
            .and_then(|ids| ids.iter().next().copied())
    }

    pub fn find_node(&self, label: &str, property: &str, value: &PropValue) -> Option<NodeId> {
        // value text is not unique across variants, so compare the value itself
        self.prop_index
            .get(&prop_key(label, property, value))?
            .iter()
            .copied()
            .find(|id| self.nodes.get(id).and_then(|node| node.prop(property)) == Some(value))
    }

    pub fn create_node(
        &mut self,
        labels: impl IntoIterator<Item = String>,
        props: BTreeMap<String, PropValue>,
    ) -> Result<NodeId, StoreError> {
        let labels: BTreeSet<String> = labels.into_iter().collect();

        for constraint in &self.constraints {
            if !labels.contains(&constraint.label) {
                continue;
            }
            if let Some(value) = props.get(&constraint.property) {
                if self
                    .find_node(&constraint.label, &constraint.property, value)
                    .is_some()
                {
                    return Err(StoreError::ConstraintViolation {
                        label: constraint.label.clone(),
                        property: constraint.property.clone(),
                        value: value.key_text(),
                    });
                }
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, Node { id, labels, props });
        self.index_node(id);
        Ok(id)
    }

    /// Find the node with `label` whose `property` equals `value`, creating
    /// it (with `extra_labels`) if there is none.
    pub fn merge_node(
        &mut self,
        label: &str,
        property: &str,
        value: PropValue,
        extra_labels: &[&str],
    ) -> Result<NodeId, StoreError> {
        if let Some(id) = self.find_node(label, property, &value) {
            return Ok(id);
        }
        let labels = std::iter::once(label)
            .chain(extra_labels.iter().copied())
            .map(str::to_string);
        let props = BTreeMap::from([(property.to_string(), value)]);
        self.create_node(labels, props)
    }

    pub fn set_prop(
        &mut self,
        id: NodeId,
        key: &str,
        value: PropValue,
    ) -> Option<PropValue> {
        let node = self.nodes.get_mut(&id)?;
        let previous = node.props.insert(key.to_string(), value.clone());
        for label in &node.labels {
            if let Some(old) = &previous {
                if let Some(ids) = self.prop_index.get_mut(&prop_key(label, key, old)) {
                    ids.remove(&id);
                }
            }
            self.prop_index
                .entry(prop_key(label, key, &value))
                .or_default()
                .insert(id);
        }
        previous
    }

    /// Create the relationship unless an identical one exists. Returns
    /// `true` if it was created.
    pub fn merge_relationship(
        &mut self,
        from: NodeId,
        to: NodeId,
        rel_type: &str,
        props: BTreeMap<String, PropValue>,
    ) -> bool {
        if self.outgoing(from, rel_type).any(|r| r.to == to) {
            return false;
        }
        self.relationships.push(Relationship {
            from,
            to,
            rel_type: rel_type.to_string(),
            props,
        });
        self.index_relationship(self.relationships.len() - 1);
        true
    }

    pub fn outgoing<'a>(
        &'a self,
        from: NodeId,
        rel_type: &'a str,
    ) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.related(&self.out_index, from, rel_type)
    }

    pub fn incoming<'a>(
        &'a self,
        to: NodeId,
        rel_type: &'a str,
    ) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.related(&self.in_index, to, rel_type)
    }

    fn related<'a>(
        &'a self,
        index: &'a HashMap<(NodeId, String), Vec<usize>>,
        node: NodeId,
        rel_type: &str,
    ) -> impl Iterator<Item = &'a Relationship> + 'a {
        index
            .get(&(node, rel_type.to_string()))
            .into_iter()
            .flat_map(|positions| positions.iter())
            .filter_map(move |position| self.relationships.get(*position))
    }

    /// Add a unique constraint. Existing duplicates make this fail, as they
    /// would in a real graph database. Returns `false` if it already existed.
    pub fn create_unique_constraint(
        &mut self,
        label: &str,
        property: &str,
    ) -> Result<bool, StoreError> {
        let constraint = UniqueConstraint {
            label: label.to_string(),
            property: property.to_string(),
        };
        if self.constraints.contains(&constraint) {
            return Ok(false);
        }

        let mut seen = BTreeSet::new();
        for node in self.nodes_with_label(label) {
            if let Some(value) = node.prop(property) {
                let key = value.key_text();
                if !seen.insert(key.clone()) {
                    return Err(StoreError::ConstraintViolation {
                        label: constraint.label,
                        property: constraint.property,
                        value: key,
                    });
                }
            }
        }

        self.constraints.insert(constraint);
        Ok(true)
    }

    pub fn has_constraint(&self, label: &str, property: &str) -> bool {
        self.constraints.iter().any(|c| c.label == label && c.property == property)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &UniqueConstraint> {
        self.constraints.iter()
    }
}
