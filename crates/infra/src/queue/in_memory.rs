use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::warn;

use super::{DEFAULT_MAX_DELIVERIES, Delivery, JobQueue, QueueError, QueueMessage};

/// A message that left the queue through the dead-letter path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub delivery: Delivery,
    pub reason: String,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    ready: VecDeque<Delivery>,
    in_flight: HashMap<String, Delivery>,
    dead: Vec<DeadLetter>,
}

/// In-memory queue for tests/dev.
///
/// Nacked messages go to the back of the queue, so there is no ordering
/// guarantee across redeliveries.
#[derive(Debug)]
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    available: Notify,
    max_deliveries: u32,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_max_deliveries(DEFAULT_MAX_DELIVERIES)
    }

    pub fn with_max_deliveries(max_deliveries: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: Notify::new(),
            max_deliveries: max_deliveries.max(1),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Enqueue a body as-is, bypassing encoding.
    pub async fn publish_raw(&self, body: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let delivery = Delivery {
            id: state.next_id.to_string(),
            body: body.into(),
            delivery_count: 0,
        };
        state.ready.push_back(delivery);
        drop(state);

        self.available.notify_one();
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead.clone()
    }

    /// Messages waiting plus messages handed out but not yet settled.
    pub async fn outstanding(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.in_flight.len()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError> {
        self.publish_raw(message.encode()?).await;
        Ok(())
    }

    async fn receive(&self, max_wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            let notified = self.available.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(mut delivery) = state.ready.pop_front() {
                    delivery.delivery_count += 1;
                    state.in_flight.insert(delivery.id.clone(), delivery.clone());
                    return Ok(Some(delivery));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state.lock().await.in_flight.remove(&delivery.id);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        if delivery.delivery_count >= self.max_deliveries {
            warn!(
                delivery_id = %delivery.id,
                delivery_count = delivery.delivery_count,
                "deliveries exhausted"
            );
            return self.dead_letter(delivery, reason).await;
        }

        let mut state = self.state.lock().await;
        if let Some(delivery) = state.in_flight.remove(&delivery.id) {
            state.ready.push_back(delivery);
            drop(state);
            self.available.notify_one();
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let delivery = state
            .in_flight
            .remove(&delivery.id)
            .unwrap_or_else(|| delivery.clone());
        state.dead.push(DeadLetter {
            delivery,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaconv_core::JobId;
    use mediaconv_images::ProcessImageInput;

    const WAIT: Duration = Duration::from_millis(20);

    fn message() -> QueueMessage {
        QueueMessage {
            trace_id: "t-1".into(),
            job_id: JobId::new(),
            input: ProcessImageInput::new("https://x/a.jpg", "describe"),
        }
    }

    #[tokio::test]
    async fn empty_queue_times_out() {
        let queue = InMemoryJobQueue::new();
        assert!(queue.receive(WAIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_settles_the_message() {
        let queue = InMemoryJobQueue::new();
        let message = message();
        queue.publish(&message).await.unwrap();

        let delivery = queue.receive(WAIT).await.unwrap().unwrap();
        assert_eq!(delivery.delivery_count, 1);
        assert_eq!(delivery.decode().unwrap(), message);

        queue.ack(&delivery).await.unwrap();
        assert_eq!(queue.outstanding().await, 0);
        assert!(queue.receive(WAIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_redelivers_until_exhausted_then_dead_letters() {
        let queue = InMemoryJobQueue::with_max_deliveries(3);
        queue.publish(&message()).await.unwrap();

        for expected in 1..=3 {
            let delivery = queue.receive(WAIT).await.unwrap().unwrap();
            assert_eq!(delivery.delivery_count, expected);
            queue.nack(&delivery, "timeout").await.unwrap();
        }

        assert!(queue.receive(WAIT).await.unwrap().is_none());
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "timeout");
        assert_eq!(dead[0].delivery.delivery_count, 3);
    }

    #[tokio::test]
    async fn receive_wakes_on_publish() {
        let queue = InMemoryJobQueue::arc();
        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.publish(&message()).await.unwrap();

        let delivery = receiver.await.unwrap().unwrap();
        assert!(delivery.is_some());
    }
}
