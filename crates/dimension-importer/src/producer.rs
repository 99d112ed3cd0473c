//! Outbound events: completion notifications and failure reports.

use async_trait::async_trait;
use dimension_importer_model::{InstanceCompletedEvent, ReportEvent};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Publishes the "instance completed" event.
#[async_trait]
pub trait CompletionProducer: Send + Sync {
    async fn completed(&self, event: InstanceCompletedEvent) -> Result<(), ProducerError>;
}

/// Publishes failure reports for instances that could not be imported.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, event: ReportEvent) -> Result<(), ProducerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),
    #[error("producer closed")]
    Closed,
}

// ============================================================================
// JSON Lines Writer
// ============================================================================

/// Writes each event as one JSON document per line.
///
/// Writers are shared between concurrent imports, so every line is written
/// and flushed under a lock.
pub struct JsonLinesWriter<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_line<T: Serialize + Sync>(&self, value: &T) -> Result<(), ProducerError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W> CompletionProducer for JsonLinesWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn completed(&self, event: InstanceCompletedEvent) -> Result<(), ProducerError> {
        self.write_line(&event).await
    }
}

#[async_trait]
impl<W> ErrorReporter for JsonLinesWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn report(&self, event: ReportEvent) -> Result<(), ProducerError> {
        self.write_line(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_events_are_written_one_per_line() {
        let writer = JsonLinesWriter::new(Vec::new());
        writer
            .completed(InstanceCompletedEvent {
                instance_id: "1".to_string(),
                file_url: "a.csv".to_string(),
            })
            .await
            .unwrap();
        writer
            .report(ReportEvent::error("2", "boom", "importer"))
            .await
            .unwrap();

        let output = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"instance_id":"1","file_url":"a.csv"}"#);
        assert!(lines[1].contains(r#""event_type":"error""#));
    }
}
