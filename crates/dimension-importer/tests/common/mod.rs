//! Recording fakes for the importer's collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use dimension_importer::client::{ClientError, DatasetClient};
use dimension_importer::graph::{ConstraintCache, StoreError, Storer};
use dimension_importer::model::{Dimension, InstanceCompletedEvent, InstanceMetadata, ReportEvent};
use dimension_importer::{
    CompletionProducer, ErrorReporter, InstanceEventHandler, ProducerError,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    InstanceExists(String),
    CreateInstance(String, Vec<String>),
    InsertDimension(String, String),
    CreateConstraint(String),
    GetCodesOrder(String, Vec<String>),
    CreateCodeRelationship(String, String, String),
    AddDimensions(String, BTreeSet<String>),
    CreateInstanceConstraint(String),
}

impl StoreCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, StoreCall::InstanceExists(_) | StoreCall::GetCodesOrder(..))
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub calls: Mutex<Vec<StoreCall>>,
    pub existing: HashSet<String>,
    /// (code list, code) -> order
    pub orders: HashMap<(String, String), Option<i64>>,
    pub fail_exists: bool,
    pub fail_create_instance: bool,
    /// create reports the instance as already present
    pub create_conflict: bool,
    /// options whose insert fails
    pub fail_insert: HashSet<String>,
    pub fail_add_dimensions: bool,
    /// options whose insert takes this long
    pub slow_insert: HashMap<String, Duration>,
    next_node: AtomicU64,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(mut self, instance_id: &str) -> Self {
        self.existing.insert(instance_id.to_string());
        self
    }

    pub fn with_order(mut self, code_list: &str, code: &str, order: Option<i64>) -> Self {
        self.orders
            .insert((code_list.to_string(), code.to_string()), order);
        self
    }

    pub fn failing_insert(mut self, option: &str) -> Self {
        self.fail_insert.insert(option.to_string());
        self
    }

    pub fn slow_insert(mut self, option: &str, delay: Duration) -> Self {
        self.slow_insert.insert(option.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&StoreCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Storer for FakeStore {
    async fn instance_exists(&self, instance_id: &str) -> Result<bool, StoreError> {
        self.record(StoreCall::InstanceExists(instance_id.to_string()));
        if self.fail_exists {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        Ok(self.existing.contains(instance_id))
    }

    async fn create_instance(
        &self,
        instance_id: &str,
        csv_header: &[String],
    ) -> Result<(), StoreError> {
        self.record(StoreCall::CreateInstance(
            instance_id.to_string(),
            csv_header.to_vec(),
        ));
        if self.fail_create_instance {
            return Err(StoreError::Backend("create failed".to_string()));
        }
        if self.create_conflict {
            return Err(StoreError::InstanceAlreadyExists(instance_id.to_string()));
        }
        Ok(())
    }

    async fn insert_dimension(
        &self,
        cache: &ConstraintCache,
        instance_id: &str,
        dimension: Dimension,
    ) -> Result<Dimension, StoreError> {
        self.record(StoreCall::InsertDimension(
            dimension.dimension_id.clone(),
            dimension.option.clone(),
        ));
        tokio::task::yield_now().await;

        let label = format!("_{}_{}", instance_id, dimension.dimension_id);
        cache
            .ensure(&label, || {
                self.record(StoreCall::CreateConstraint(label.clone()));
                std::future::ready(Ok::<_, StoreError>(()))
            })
            .await?;

        if let Some(delay) = self.slow_insert.get(&dimension.option) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_insert.contains(&dimension.option) {
            return Err(StoreError::Backend(format!("insert of {} failed", dimension.option)));
        }
        let node = self.next_node.fetch_add(1, Ordering::SeqCst);
        Ok(dimension.with_node_id(format!("node-{node}")))
    }

    async fn get_codes_order(
        &self,
        code_list_id: &str,
        codes: &[String],
    ) -> Result<HashMap<String, Option<i64>>, StoreError> {
        self.record(StoreCall::GetCodesOrder(
            code_list_id.to_string(),
            codes.to_vec(),
        ));
        Ok(codes
            .iter()
            .filter_map(|code| {
                self.orders
                    .get(&(code_list_id.to_string(), code.clone()))
                    .map(|order| (code.clone(), *order))
            })
            .collect())
    }

    async fn create_code_relationship(
        &self,
        instance_id: &str,
        code_list_id: &str,
        code: &str,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::CreateCodeRelationship(
            instance_id.to_string(),
            code_list_id.to_string(),
            code.to_string(),
        ));
        Ok(())
    }

    async fn add_dimensions(
        &self,
        instance_id: &str,
        dimension_labels: &[String],
    ) -> Result<(), StoreError> {
        self.record(StoreCall::AddDimensions(
            instance_id.to_string(),
            dimension_labels.iter().cloned().collect(),
        ));
        if self.fail_add_dimensions {
            return Err(StoreError::Backend("add dimensions failed".to_string()));
        }
        Ok(())
    }

    async fn create_instance_constraint(&self, instance_id: &str) -> Result<(), StoreError> {
        self.record(StoreCall::CreateInstanceConstraint(instance_id.to_string()));
        Ok(())
    }
}

// ============================================================================
// Dataset API
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub instance_id: String,
    pub dimension_id: String,
    pub option: String,
    pub node_id: String,
    pub order: Option<i64>,
}

#[derive(Default)]
pub struct FakeDataset {
    pub headers: Vec<String>,
    pub dimensions: Vec<Dimension>,
    pub patches: Mutex<Vec<Patch>>,
    pub calls: Mutex<usize>,
    pub fail_patch: bool,
    /// how long get_instance takes
    pub instance_delay: Option<Duration>,
    pub missing_instances: HashSet<String>,
}

impl FakeDataset {
    pub fn new(dimensions: Vec<Dimension>) -> Self {
        Self {
            headers: vec!["V4_0".to_string(), "Geo".to_string()],
            dimensions,
            ..Default::default()
        }
    }

    pub fn patches(&self) -> Vec<Patch> {
        self.patches.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }

    fn touch(&self) {
        *self.calls.lock() += 1;
    }
}

#[async_trait]
impl DatasetClient for FakeDataset {
    async fn get_instance(&self, instance_id: &str) -> Result<InstanceMetadata, ClientError> {
        self.touch();
        if let Some(delay) = self.instance_delay {
            tokio::time::sleep(delay).await;
        }
        if self.missing_instances.contains(instance_id) {
            return Err(ClientError::NotFound {
                resource: format!("instance {instance_id}"),
            });
        }
        Ok(InstanceMetadata {
            instance_id: instance_id.to_string(),
            csv_header: self.headers.clone(),
            state: Some("submitted".to_string()),
        })
    }

    async fn get_dimensions(&self, _instance_id: &str) -> Result<Vec<Dimension>, ClientError> {
        self.touch();
        Ok(self.dimensions.clone())
    }

    async fn patch_dimension_option(
        &self,
        instance_id: &str,
        dimension_id: &str,
        option: &str,
        node_id: &str,
        order: Option<i64>,
    ) -> Result<(), ClientError> {
        self.touch();
        if self.fail_patch {
            return Err(ClientError::Api("patch rejected".to_string()));
        }
        self.patches.lock().push(Patch {
            instance_id: instance_id.to_string(),
            dimension_id: dimension_id.to_string(),
            option: option.to_string(),
            node_id: node_id.to_string(),
            order,
        });
        Ok(())
    }
}

// ============================================================================
// Producer / Reporter
// ============================================================================

#[derive(Default)]
pub struct FakeProducer {
    pub completed: Mutex<Vec<InstanceCompletedEvent>>,
    pub reports: Mutex<Vec<ReportEvent>>,
    pub fail: bool,
}

impl FakeProducer {
    pub fn completions(&self) -> Vec<InstanceCompletedEvent> {
        self.completed.lock().clone()
    }

    pub fn reports(&self) -> Vec<ReportEvent> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl CompletionProducer for FakeProducer {
    async fn completed(&self, event: InstanceCompletedEvent) -> Result<(), ProducerError> {
        if self.fail {
            return Err(ProducerError::Closed);
        }
        self.completed.lock().push(event);
        Ok(())
    }
}

#[async_trait]
impl ErrorReporter for FakeProducer {
    async fn report(&self, event: ReportEvent) -> Result<(), ProducerError> {
        self.reports.lock().push(event);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn geo_dimensions() -> Vec<Dimension> {
    vec![
        Dimension::new("Geo", "England", "myCodeList"),
        Dimension::new("Geo", "Wales", "myCodeList"),
    ]
}

pub fn geo_store() -> FakeStore {
    FakeStore::new()
        .with_order("myCodeList", "England", Some(0))
        .with_order("myCodeList", "Wales", Some(1))
}

pub fn handler(
    store: &Arc<FakeStore>,
    dataset: &Arc<FakeDataset>,
    producer: &Arc<FakeProducer>,
    max_workers: usize,
) -> InstanceEventHandler {
    InstanceEventHandler::builder()
        .store(Arc::clone(store) as Arc<dyn Storer>)
        .dataset_client(Arc::clone(dataset) as Arc<dyn DatasetClient>)
        .producer(Arc::clone(producer) as Arc<dyn CompletionProducer>)
        .max_workers(max_workers)
        .build()
        .unwrap()
}
