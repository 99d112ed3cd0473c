//! Message shapes exchanged with the event transport.
//!
//! Field names are part of the wire contract and must not be renamed.

use serde::{Deserialize, Serialize};

/// `event_type` carried by report events describing a failed import.
pub const ERROR_EVENT_TYPE: &str = "error";

/// Inbound request to import an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInstanceEvent {
    pub instance_id: String,
    pub file_url: String,
}

impl NewInstanceEvent {
    pub fn new(instance_id: impl Into<String>, file_url: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            file_url: file_url.into(),
        }
    }
}

/// Outbound notification that an instance and its dimensions are in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCompletedEvent {
    pub instance_id: String,
    pub file_url: String,
}

impl From<&NewInstanceEvent> for InstanceCompletedEvent {
    fn from(event: &NewInstanceEvent) -> Self {
        Self {
            instance_id: event.instance_id.clone(),
            file_url: event.file_url.clone(),
        }
    }
}

/// Failure report for an instance, consumed by whatever tracks import state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEvent {
    pub instance_id: String,
    pub event_type: String,
    pub event_msg: String,
    pub service_name: String,
}

impl ReportEvent {
    pub fn error(
        instance_id: impl Into<String>,
        event_msg: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            event_type: ERROR_EVENT_TYPE.to_string(),
            event_msg: event_msg.into(),
            service_name: service_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_event_uses_snake_case_wire_names() {
        let event: NewInstanceEvent =
            serde_json::from_str(r#"{"instance_id":"1234567890","file_url":"s3://bucket/v4.csv"}"#)
                .unwrap();
        assert_eq!(event, NewInstanceEvent::new("1234567890", "s3://bucket/v4.csv"));
    }

    #[test]
    fn new_instance_event_requires_both_fields() {
        let missing = serde_json::from_str::<NewInstanceEvent>(r#"{"instance_id":"1"}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn completed_event_mirrors_inbound_event() {
        let inbound = NewInstanceEvent::new("abc", "file://v4.csv");
        let completed = InstanceCompletedEvent::from(&inbound);

        let json = serde_json::to_value(&completed).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"instance_id": "abc", "file_url": "file://v4.csv"})
        );
    }

    #[test]
    fn report_event_is_an_error_event() {
        let report = ReportEvent::error("abc", "create instance returned an error", "importer");
        assert_eq!(report.event_type, ERROR_EVENT_TYPE);
        assert_eq!(report.service_name, "importer");
    }
}
