//! Dimension importer data model
//!
//! Value types shared by every layer of the importer:
//!
//! - `events`: the inbound `NewInstanceEvent`, the outbound
//!   `InstanceCompletedEvent` and the `ReportEvent` emitted for failures
//! - `dimension`: a single dimension option of an instance
//! - `instance`: the instance aggregate whose dimension labels are
//!   accumulated by concurrent dimension workers

pub mod dimension;
pub mod events;
pub mod instance;

pub use dimension::{Dimension, TIME_DIMENSION_ID};
pub use events::{InstanceCompletedEvent, NewInstanceEvent, ReportEvent, ERROR_EVENT_TYPE};
pub use instance::{Instance, InstanceMetadata};

use thiserror::Error;

/// Errors raised when a value does not satisfy the model's invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{entity} is missing required field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },
}
