//! Error taxonomy of the import pipeline.
//!
//! Every collaborator failure is wrapped with the [`ImportStage`] that
//! produced it, so callers can tell which step failed without parsing
//! messages.

use crate::producer::ProducerError;
use dimension_importer_client::ClientError;
use dimension_importer_graph::StoreError;
use std::fmt;

/// A missing dependency or input, detected before any side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("dataset API client is required")]
    MissingDatasetClient,
    #[error("graph store is required")]
    MissingStore,
    #[error("completion producer is required")]
    MissingProducer,
    #[error("dimension worker pool size must be at least 1")]
    NoWorkers,
    #[error("instance id is required")]
    MissingInstanceId,
}

/// The pipeline step that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportStage {
    InstanceExists,
    GetInstance,
    CreateInstance,
    GetDimensions,
    InsertDimension,
    GetCodesOrder,
    PatchDimensionOption,
    CreateCodeRelationship,
    AddDimensions,
    CreateInstanceConstraint,
    Completed,
}

impl ImportStage {
    pub fn description(self) -> &'static str {
        match self {
            ImportStage::InstanceExists => "instance exists check returned an error",
            ImportStage::GetInstance => "dataset api get instance returned an error",
            ImportStage::CreateInstance => "create instance returned an error",
            ImportStage::GetDimensions => "dataset api get dimensions returned an error",
            ImportStage::InsertDimension => "error while attempting to insert dimension",
            ImportStage::GetCodesOrder => "error while attempting to get dimension order using codes",
            ImportStage::PatchDimensionOption => {
                "dataset api patch dimension option returned an error"
            }
            ImportStage::CreateCodeRelationship => "error attempting to create relationship to code",
            ImportStage::AddDimensions => "add instance dimensions returned an error",
            ImportStage::CreateInstanceConstraint => "create instance constraint returned an error",
            ImportStage::Completed => "completed producer returned an error",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Failure of one of the importer's collaborators.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Dataset(#[from] ClientError),
    #[error(transparent)]
    Producer(#[from] ProducerError),
    #[error("code list {code_list_id} has no order entry for option {option:?}")]
    MissingCodeOrder {
        code_list_id: String,
        option: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("{stage}: {source}")]
    Stage {
        stage: ImportStage,
        source: CollaboratorError,
    },
    #[error("dimension worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ImportError {
    pub fn at(stage: ImportStage, source: impl Into<CollaboratorError>) -> Self {
        ImportError::Stage {
            stage,
            source: source.into(),
        }
    }

    /// The failing stage, for collaborator errors.
    pub fn stage(&self) -> Option<ImportStage> {
        match self {
            ImportError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ImportError::Validation(_))
    }
}

/// Wrap a collaborator result with the stage it belongs to.
pub trait StageContext<T> {
    fn at_stage(self, stage: ImportStage) -> Result<T, ImportError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<CollaboratorError>,
{
    fn at_stage(self, stage: ImportStage) -> Result<T, ImportError> {
        self.map_err(|err| ImportError::at(stage, err))
    }
}
