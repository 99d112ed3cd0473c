use crate::Dimension;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Instance metadata as held by the dataset API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub instance_id: String,
    /// Column names of the instance's V4 CSV, in file order.
    #[serde(default)]
    pub csv_header: Vec<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// An instance being imported.
///
/// Owned by a single import, but shared between that import's dimension
/// workers, which record the dimension types they insert concurrently.
#[derive(Debug)]
pub struct Instance {
    instance_id: String,
    csv_header: Vec<String>,
    dimension_labels: Mutex<BTreeSet<String>>,
}

impl Instance {
    pub fn new(instance_id: impl Into<String>, csv_header: Vec<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            csv_header,
            dimension_labels: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn csv_header(&self) -> &[String] {
        &self.csv_header
    }

    /// Record the dimension's type. Returns `false` if it was already known.
    pub fn add_dimension(&self, dimension: &Dimension) -> bool {
        self.dimension_labels
            .lock()
            .insert(dimension.dimension_id.clone())
    }

    /// Distinct dimension types recorded so far, sorted.
    pub fn dimension_labels(&self) -> Vec<String> {
        self.dimension_labels.lock().iter().cloned().collect()
    }
}
