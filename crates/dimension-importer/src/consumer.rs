//! Drives a stream of inbound events through the handler.
//!
//! Each event gets its own task, at most `max_in_flight` at a time. Failures
//! are logged and reported; the event source decides about redelivery.

use crate::error::ImportError;
use crate::handler::{ImportOutcome, InstanceEventHandler};
use crate::producer::ErrorReporter;
use dimension_importer_model::{NewInstanceEvent, ReportEvent};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Counts of what happened to the consumed events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ConsumeSummary {
    fn record(&mut self, outcome: Result<Result<ImportOutcome, ImportError>, tokio::task::JoinError>) {
        match outcome {
            Ok(Ok(ImportOutcome::Completed { .. })) => self.completed += 1,
            Ok(Ok(ImportOutcome::AlreadyImported)) => self.skipped += 1,
            Ok(Err(_)) => self.failed += 1,
            Err(err) => {
                tracing::error!(error = %err, "import task panicked");
                self.failed += 1;
            }
        }
    }
}

pub struct EventConsumer {
    handler: Arc<InstanceEventHandler>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    service_name: String,
    max_in_flight: usize,
}

impl EventConsumer {
    pub fn new(handler: Arc<InstanceEventHandler>, service_name: impl Into<String>) -> Self {
        Self {
            handler,
            reporter: None,
            service_name: service_name.into(),
            max_in_flight: 1,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Consume until the channel closes, then wait for in-flight imports.
    pub async fn run(&self, mut events: mpsc::Receiver<NewInstanceEvent>) -> ConsumeSummary {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut summary = ConsumeSummary::default();

        while let Some(event) = events.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let handler = Arc::clone(&self.handler);
            let reporter = self.reporter.clone();
            let service_name = self.service_name.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let result = handler.handle(&event).await;
                if let Err(err) = &result {
                    report_failure(reporter.as_deref(), &event, err, &service_name).await;
                }
                result
            });

            while let Some(done) = tasks.try_join_next() {
                summary.record(done);
            }
        }

        while let Some(done) = tasks.join_next().await {
            summary.record(done);
        }
        tracing::info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            "event stream drained"
        );
        summary
    }
}

async fn report_failure(
    reporter: Option<&dyn ErrorReporter>,
    event: &NewInstanceEvent,
    err: &ImportError,
    service_name: &str,
) {
    tracing::error!(
        instance_id = %event.instance_id,
        stage = ?err.stage(),
        error = %err,
        "failed to import instance"
    );

    if event.instance_id.is_empty() {
        return;
    }
    let Some(reporter) = reporter else {
        return;
    };
    let report = ReportEvent::error(&event.instance_id, err.to_string(), service_name);
    if let Err(report_err) = reporter.report(report).await {
        tracing::warn!(
            instance_id = %event.instance_id,
            error = %report_err,
            "failed to report import error"
        );
    }
}

/// Decode newline-delimited JSON events from `reader` into `events`.
///
/// Blank lines are ignored and malformed lines are logged and skipped.
/// Returns the number of events sent.
pub async fn read_events<R>(reader: R, events: mpsc::Sender<NewInstanceEvent>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<NewInstanceEvent>(line) {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    break;
                }
                sent += 1;
            }
            Err(err) => tracing::warn!(error = %err, line, "skipping malformed event"),
        }
    }

    Ok(sent)
}
