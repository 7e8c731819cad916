//! Job-start queue (at-least-once, no ordering guarantee).
//!
//! ## Components
//!
//! - `QueueMessage`: wire contract `{traceId, jobId, input}`
//! - `Delivery`: one received copy of a message plus its delivery count
//! - `JobQueue`: publish / receive / ack / nack / dead-letter
//! - `InMemoryJobQueue`: dev/test adapter
//! - `RedisStreamsJobQueue`: durable adapter (feature `redis`)

mod in_memory;
#[cfg(feature = "redis")]
mod redis_streams;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mediaconv_core::JobId;
use mediaconv_images::ProcessImageInput;

pub use in_memory::{DeadLetter, InMemoryJobQueue};
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsJobQueue;

/// Deliveries before a nacked message is dead-lettered.
pub const DEFAULT_MAX_DELIVERIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub trace_id: String,
    pub job_id: JobId,
    pub input: ProcessImageInput,
}

impl QueueMessage {
    pub fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Encode(e.to_string()))
    }
}

/// A received message. `body` is kept raw so undecodable messages can still
/// be dead-lettered as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub body: String,
    /// 1 on first delivery.
    pub delivery_count: u32,
}

impl Delivery {
    pub fn decode(&self) -> Result<QueueMessage, QueueError> {
        serde_json::from_str(&self.body).map_err(|e| QueueError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(String),

    #[error("queue message could not be encoded: {0}")]
    Encode(String),

    #[error("queue message could not be decoded: {0}")]
    Decode(String),
}

impl QueueError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Transport(_))
    }
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Wait up to `max_wait` for the next delivery.
    async fn receive(&self, max_wait: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Processing finished; drop the message.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Processing failed; make the message visible again, or dead-letter it
    /// once it has used up its deliveries.
    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;

    /// Move the message to the dead-letter path now.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;
}

#[async_trait::async_trait]
impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError> {
        (**self).publish(message).await
    }

    async fn receive(&self, max_wait: Duration) -> Result<Option<Delivery>, QueueError> {
        (**self).receive(max_wait).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        (**self).ack(delivery).await
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        (**self).nack(delivery, reason).await
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        (**self).dead_letter(delivery, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_uses_camel_case_wire_names() {
        let job_id = JobId::new();
        let message = QueueMessage {
            trace_id: "t-1".into(),
            job_id,
            input: ProcessImageInput::new("https://x/a.jpg", "describe"),
        };

        let value: serde_json::Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "traceId": "t-1",
                "jobId": job_id.to_string(),
                "input": {"url": "https://x/a.jpg", "prompt": "describe"}
            })
        );
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        let delivery = Delivery {
            id: "1".into(),
            body: "{not json".into(),
            delivery_count: 1,
        };
        let err = delivery.decode().unwrap_err();
        assert!(matches!(err, QueueError::Decode(_)));
        assert!(!err.is_retryable());
    }
}
