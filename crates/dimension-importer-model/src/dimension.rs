use crate::ModelError;
use serde::{Deserialize, Serialize};

/// Dimension whose code list is structured differently and therefore never
/// gets a relationship to its code.
pub const TIME_DIMENSION_ID: &str = "time";

/// One option of one dimension of an instance (e.g. `geography = England`).
///
/// `dimension_id` + `option` is the natural key within an instance. `node_id`
/// is assigned by the graph store and `order` comes from the code list; both
/// are written once while the dimension is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub dimension_id: String,
    pub option: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub code_list_id: String,
    #[serde(default)]
    pub order: Option<i64>,
}

impl Dimension {
    pub fn new(
        dimension_id: impl Into<String>,
        option: impl Into<String>,
        code_list_id: impl Into<String>,
    ) -> Self {
        Self {
            dimension_id: dimension_id.into(),
            option: option.into(),
            node_id: String::new(),
            code_list_id: code_list_id.into(),
            order: None,
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn is_time(&self) -> bool {
        self.dimension_id == TIME_DIMENSION_ID
    }

    /// Checks the natural key is present.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.dimension_id.is_empty() {
            return Err(ModelError::MissingField {
                entity: "dimension",
                field: "dimension_id",
            });
        }
        if self.option.is_empty() {
            return Err(ModelError::MissingField {
                entity: "dimension",
                field: "option",
            });
        }
        Ok(())
    }
}
