use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a client stands after asking for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Queued,
    Processed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdmissionResponse {
    pub id: String,
    pub status: ClientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
}

impl AdmissionResponse {
    pub fn processed(id: String) -> Self {
        Self {
            id,
            status: ClientStatus::Processed,
            position: None,
        }
    }

    pub fn queued(id: String, position: u64) -> Self {
        Self {
            id,
            status: ClientStatus::Queued,
            position: Some(position),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionResponse {
    pub id: String,
    pub position: u64,
    pub queue_length: u64,
    /// Lower bound on the wait: the worker admits at most one client per poll.
    pub estimated_wait_secs: f64,
}

impl PositionResponse {
    pub fn new(id: String, position: u64, queue_length: u64, poll_interval: Duration) -> Self {
        Self {
            id,
            position,
            queue_length,
            estimated_wait_secs: poll_interval.as_secs_f64() * (position + 1) as f64,
        }
    }
}

/// Payload of one server-sent admission event.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessedEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: String,
}

impl ProcessedEvent {
    pub fn new(user_id: String) -> Self {
        Self {
            kind: "processed".to_string(),
            user_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub message: String,
    pub config: serde_json::Value,
}

impl ConfigResponse {
    pub fn updated(config: serde_json::Value) -> Self {
        Self {
            message: "Limiter configuration updated successfully".to_string(),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_response_omits_position() {
        let json = serde_json::to_value(AdmissionResponse::processed("abc".into())).unwrap();
        assert_eq!(json["status"], "processed");
        assert!(json.get("position").is_none());
    }

    #[test]
    fn test_event_payload_shape() {
        let json = serde_json::to_string(&ProcessedEvent::new("abc".into())).unwrap();
        assert_eq!(json, r#"{"type":"processed","user_id":"abc"}"#);
    }

    #[test]
    fn test_estimated_wait_counts_polls_ahead() {
        let head = PositionResponse::new("a".into(), 0, 3, Duration::from_secs(5));
        assert_eq!(head.estimated_wait_secs, 5.0);

        let third = PositionResponse::new("c".into(), 2, 3, Duration::from_millis(500));
        assert_eq!(third.estimated_wait_secs, 1.5);
    }
}
