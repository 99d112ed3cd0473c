//! Dimension Importer: instance events → graph store
//!
//! ```text
//! ┌──────────────┐   NewInstanceEvent   ┌───────────────────────┐
//! │ event source │─────────────────────►│ InstanceEventHandler  │
//! └──────────────┘                      │                       │
//!                                       │  exists? ─► instance  │──► Storer (graph)
//!       ┌──────────────┐  node id/order │  ─► dimensions (pool) │
//!       │ dataset API  │◄──────────────►│  ─► finalize          │
//!       └──────────────┘  metadata      └──────────┬────────────┘
//!                                                  │ InstanceCompletedEvent
//!                                                  ▼
//!                                       ┌───────────────────────┐
//!                                       │ CompletionProducer    │
//!                                       └───────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! Events arrive at least once. An instance already present in the graph is
//! skipped, which makes redelivery of a completed import a no-op. Failed
//! imports return the error of the first failing stage; retries belong to
//! the event transport.

pub mod config;
pub mod consumer;
pub mod dimensions;
pub mod error;
pub mod handler;
pub mod producer;

pub use config::{Config, ConfigError};
pub use consumer::{read_events, ConsumeSummary, EventConsumer};
pub use dimensions::DimensionProcessor;
pub use error::{CollaboratorError, ImportError, ImportStage, StageContext, ValidationError};
pub use handler::{HandlerBuilder, ImportOutcome, InstanceEventHandler, DEFAULT_MAX_WORKERS};
pub use producer::{CompletionProducer, ErrorReporter, JsonLinesWriter, ProducerError};

// Re-export collaborator crates for convenience
pub use dimension_importer_client as client;
pub use dimension_importer_graph as graph;
pub use dimension_importer_model as model;
