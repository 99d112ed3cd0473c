//! The instance event handler: sequences one import from event to completion.
//!
//! ```text
//! validate ─► exists? ──yes──► done (redelivery is a no-op)
//!                │ no
//!                ▼
//!         create instance ─► process dimensions ─► add dimensions
//!                                                        │
//!                    emit completion ◄─ instance constraint
//! ```
//!
//! Concurrent deliveries of one event can both pass the existence check; the
//! one whose create finds the instance already present also reports
//! `AlreadyImported`.
//!
//! There is no retry here. Any error is returned wrapped with its stage and
//! the transport decides whether to redeliver.

use crate::dimensions::DimensionProcessor;
use crate::error::{ImportError, ImportStage, StageContext, ValidationError};
use crate::producer::CompletionProducer;
use dimension_importer_client::DatasetClient;
use dimension_importer_graph::{StoreError, Storer};
use dimension_importer_model::{Instance, InstanceCompletedEvent, NewInstanceEvent};
use std::sync::Arc;

pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Result of a successful `handle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The instance was already in the graph; nothing was written.
    AlreadyImported,
    Completed {
        dimensions: usize,
        dimension_types: usize,
    },
}

pub struct InstanceEventHandler {
    dataset: Arc<dyn DatasetClient>,
    store: Arc<dyn Storer>,
    producer: Arc<dyn CompletionProducer>,
    max_workers: usize,
}

impl InstanceEventHandler {
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::default()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Import the instance named by `event`.
    pub async fn handle(&self, event: &NewInstanceEvent) -> Result<ImportOutcome, ImportError> {
        if event.instance_id.is_empty() {
            return Err(ValidationError::MissingInstanceId.into());
        }
        let instance_id = event.instance_id.as_str();

        let exists = self
            .store
            .instance_exists(instance_id)
            .await
            .at_stage(ImportStage::InstanceExists)?;
        if exists {
            tracing::info!(instance_id, "instance already exists in graph, skipping");
            return Ok(ImportOutcome::AlreadyImported);
        }

        let Some(instance) = self.create_instance(instance_id).await? else {
            tracing::info!(
                instance_id,
                "instance created by a concurrent delivery, skipping"
            );
            return Ok(ImportOutcome::AlreadyImported);
        };

        let dimensions = self
            .dataset
            .get_dimensions(instance_id)
            .await
            .at_stage(ImportStage::GetDimensions)?;
        tracing::info!(
            instance_id,
            dimensions = dimensions.len(),
            max_workers = self.max_workers,
            "processing dimensions"
        );

        let processor = DimensionProcessor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.dataset),
            self.max_workers,
        );
        let processed = processor.process(Arc::clone(&instance), dimensions).await?;

        let dimension_types = self.finalize(&instance).await?;

        self.producer
            .completed(InstanceCompletedEvent::from(event))
            .await
            .at_stage(ImportStage::Completed)?;
        tracing::info!(instance_id, processed, dimension_types, "instance import completed");

        Ok(ImportOutcome::Completed {
            dimensions: processed,
            dimension_types,
        })
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// `None` when another delivery of the same event created the instance
    /// between the existence check and this call.
    async fn create_instance(&self, instance_id: &str) -> Result<Option<Arc<Instance>>, ImportError> {
        let metadata = self
            .dataset
            .get_instance(instance_id)
            .await
            .at_stage(ImportStage::GetInstance)?;

        match self
            .store
            .create_instance(instance_id, &metadata.csv_header)
            .await
        {
            Ok(()) => {}
            Err(StoreError::InstanceAlreadyExists(_)) => return Ok(None),
            Err(err) => return Err(ImportError::at(ImportStage::CreateInstance, err)),
        }
        tracing::info!(
            instance_id,
            columns = metadata.csv_header.len(),
            "instance created in graph"
        );

        Ok(Some(Arc::new(Instance::new(instance_id, metadata.csv_header))))
    }

    async fn finalize(&self, instance: &Instance) -> Result<usize, ImportError> {
        let instance_id = instance.instance_id();
        let labels = instance.dimension_labels();

        self.store
            .add_dimensions(instance_id, &labels)
            .await
            .at_stage(ImportStage::AddDimensions)?;
        self.store
            .create_instance_constraint(instance_id)
            .await
            .at_stage(ImportStage::CreateInstanceConstraint)?;

        Ok(labels.len())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a handler from its collaborators; each one is required.
pub struct HandlerBuilder {
    dataset: Option<Arc<dyn DatasetClient>>,
    store: Option<Arc<dyn Storer>>,
    producer: Option<Arc<dyn CompletionProducer>>,
    max_workers: usize,
}

impl Default for HandlerBuilder {
    fn default() -> Self {
        Self {
            dataset: None,
            store: None,
            producer: None,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl HandlerBuilder {
    pub fn dataset_client(mut self, dataset: Arc<dyn DatasetClient>) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn store(mut self, store: Arc<dyn Storer>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn producer(mut self, producer: Arc<dyn CompletionProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn build(self) -> Result<InstanceEventHandler, ValidationError> {
        let dataset = self.dataset.ok_or(ValidationError::MissingDatasetClient)?;
        let store = self.store.ok_or(ValidationError::MissingStore)?;
        let producer = self.producer.ok_or(ValidationError::MissingProducer)?;
        if self.max_workers == 0 {
            return Err(ValidationError::NoWorkers);
        }

        Ok(InstanceEventHandler {
            dataset,
            store,
            producer,
            max_workers: self.max_workers,
        })
    }
}
