//! Dimension processing: the fan-out/fan-in core of an import.
//!
//! ```text
//!                 ┌──────────── shared queue ────────────┐
//!                 │  d1  d2  d3  d4  d5  ...  dn         │
//!                 └───┬──────────┬──────────────┬────────┘
//!                     ▼          ▼              ▼
//!                 worker 0   worker 1  ...  worker k-1      k = min(max_workers, n)
//!                     │
//!   insert (cache) ─► order lookup ─► patch dataset API ─► code relationship ─► label
//! ```
//!
//! Steps for one dimension run strictly in sequence; dimensions on different
//! workers are unordered. The first error is kept and stops dispatch, but
//! workers already processing a dimension are allowed to finish it. Inserts
//! are merges, so the partial writes left behind are safe to redo when the
//! event is redelivered.

use crate::error::{CollaboratorError, ImportError, ImportStage, StageContext};
use dimension_importer_client::DatasetClient;
use dimension_importer_graph::{ConstraintCache, Storer};
use dimension_importer_model::{Dimension, Instance};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

pub struct DimensionProcessor {
    store: Arc<dyn Storer>,
    dataset: Arc<dyn DatasetClient>,
    max_workers: usize,
}

impl DimensionProcessor {
    pub fn new(store: Arc<dyn Storer>, dataset: Arc<dyn DatasetClient>, max_workers: usize) -> Self {
        Self {
            store,
            dataset,
            max_workers: max_workers.max(1),
        }
    }

    /// Process every dimension of `instance`, returning how many were
    /// processed. A fresh constraint cache is used for each call.
    pub async fn process(
        &self,
        instance: Arc<Instance>,
        dimensions: Vec<Dimension>,
    ) -> Result<usize, ImportError> {
        let total = dimensions.len();
        if total == 0 {
            return Ok(0);
        }

        let shared = Arc::new(Shared {
            store: Arc::clone(&self.store),
            dataset: Arc::clone(&self.dataset),
            instance,
            cache: ConstraintCache::new(),
            queue: Mutex::new(VecDeque::from(dimensions)),
            first_error: Mutex::new(None),
            failed: AtomicBool::new(false),
        });

        let mut workers = JoinSet::new();
        for worker in 0..self.max_workers.min(total) {
            workers.spawn(Arc::clone(&shared).run(worker));
        }

        let mut panicked = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                shared.failed.store(true, Ordering::SeqCst);
                panicked.get_or_insert(err);
            }
        }

        if let Some(err) = shared.first_error.lock().take() {
            return Err(err);
        }
        if let Some(err) = panicked {
            return Err(ImportError::Worker(err));
        }
        Ok(total)
    }
}

// ============================================================================
// Workers
// ============================================================================

/// State shared by the workers of one `process` call.
struct Shared {
    store: Arc<dyn Storer>,
    dataset: Arc<dyn DatasetClient>,
    instance: Arc<Instance>,
    cache: ConstraintCache,
    queue: Mutex<VecDeque<Dimension>>,
    /// first error wins; later ones are dropped
    first_error: Mutex<Option<ImportError>>,
    failed: AtomicBool,
}

impl Shared {
    async fn run(self: Arc<Self>, worker: usize) {
        loop {
            if self.failed.load(Ordering::SeqCst) {
                break;
            }
            let next = self.queue.lock().pop_front();
            let Some(dimension) = next else {
                break;
            };

            if let Err(err) = self.process_dimension(dimension).await {
                self.record_error(worker, err);
            }
        }
    }

    fn record_error(&self, worker: usize, err: ImportError) {
        self.failed.store(true, Ordering::SeqCst);
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            tracing::warn!(
                instance_id = self.instance.instance_id(),
                worker,
                error = %err,
                "dimension failed, stopping dispatch"
            );
            *slot = Some(err);
        } else {
            tracing::debug!(worker, error = %err, "dropping subsequent dimension error");
        }
    }

    async fn process_dimension(&self, dimension: Dimension) -> Result<(), ImportError> {
        let instance_id = self.instance.instance_id();

        let dimension = self
            .store
            .insert_dimension(&self.cache, instance_id, dimension)
            .await
            .at_stage(ImportStage::InsertDimension)?;

        let orders = self
            .store
            .get_codes_order(&dimension.code_list_id, std::slice::from_ref(&dimension.option))
            .await
            .at_stage(ImportStage::GetCodesOrder)?;
        let order = *orders.get(&dimension.option).ok_or_else(|| {
            ImportError::at(
                ImportStage::GetCodesOrder,
                CollaboratorError::MissingCodeOrder {
                    code_list_id: dimension.code_list_id.clone(),
                    option: dimension.option.clone(),
                },
            )
        })?;
        let dimension = Dimension { order, ..dimension };

        self.dataset
            .patch_dimension_option(
                instance_id,
                &dimension.dimension_id,
                &dimension.option,
                &dimension.node_id,
                dimension.order,
            )
            .await
            .at_stage(ImportStage::PatchDimensionOption)?;

        if !dimension.is_time() {
            self.store
                .create_code_relationship(instance_id, &dimension.code_list_id, &dimension.option)
                .await
                .at_stage(ImportStage::CreateCodeRelationship)?;
        }

        self.instance.add_dimension(&dimension);
        tracing::debug!(
            instance_id,
            dimension_id = %dimension.dimension_id,
            option = %dimension.option,
            node_id = %dimension.node_id,
            order = ?dimension.order,
            "dimension imported"
        );
        Ok(())
    }
}
