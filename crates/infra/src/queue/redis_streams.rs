//! Redis Streams job queue (durable, at-least-once).
//!
//! - **Stream key**: `mediaconv:process-image` (configurable)
//! - **Consumer group**: one per worker pool, e.g. `process-image-workers`
//! - **Dead-letter stream**: `<stream>:dlq`
//!
//! Redelivery is explicit: a nacked entry is re-appended with an incremented
//! `deliveries` field and the original is acknowledged. On startup a consumer
//! first drains its own pending entries (id `0`), so messages it received
//! before a crash are seen again. Every `receive` also claims entries left
//! pending for longer than `claim_idle` by any consumer of the group (a failed
//! ack, a crashed peer), so nothing stays unsettled until a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use tracing::{debug, instrument, warn};

use super::{DEFAULT_MAX_DELIVERIES, Delivery, JobQueue, QueueError, QueueMessage};

const PAYLOAD_FIELD: &str = "payload";
const DELIVERIES_FIELD: &str = "deliveries";
const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(60);
const CLAIM_SCAN: usize = 10;

#[derive(Debug)]
pub struct RedisStreamsJobQueue {
    client: redis::Client,
    stream_key: String,
    dlq_key: String,
    group: String,
    consumer: String,
    max_deliveries: u32,
    claim_idle: Duration,
    pending_drained: AtomicBool,
}

impl RedisStreamsJobQueue {
    /// Connect and make sure the consumer group exists.
    pub async fn connect(
        redis_url: &str,
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(transport)?;
        let stream_key = stream_key.into();

        let queue = Self {
            client,
            dlq_key: format!("{stream_key}:dlq"),
            stream_key,
            group: group.into(),
            consumer: consumer.into(),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            claim_idle: DEFAULT_CLAIM_IDLE,
            pending_drained: AtomicBool::new(false),
        };
        queue.ensure_consumer_group().await?;
        Ok(queue)
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    /// How long an entry may stay pending before another receive claims it.
    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(transport)
    }

    /// XGROUP CREATE ... MKSTREAM; an existing group is fine.
    async fn ensure_consumer_group(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream_key, &self.group, "0")
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(transport(e)),
        }
    }

    async fn append(&self, key: &str, fields: &[(&str, String)]) -> Result<String, QueueError> {
        let mut conn = self.connection().await?;
        conn.xadd(key, "*", fields).await.map_err(transport)
    }

    async fn acknowledge(&self, id: &str) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let _: u64 = conn
            .xack(&self.stream_key, &self.group, &[id])
            .await
            .map_err(transport)?;
        Ok(())
    }

    /// One entry from this consumer's pending list (`0`) or new entries (`>`).
    async fn read_one(
        &self,
        from: &str,
        block: Option<Duration>,
    ) -> Result<Option<Delivery>, QueueError> {
        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1);
        if let Some(block) = block {
            options = options.block(block.as_millis() as usize);
        }

        let mut conn = self.connection().await?;
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream_key], &[from], &options)
            .await
            .map_err(transport)?;

        let entry = reply
            .and_then(|reply| reply.keys.into_iter().next())
            .and_then(|key| key.ids.into_iter().next());

        Ok(entry.map(|entry| parse_entry(entry, 1)))
    }

    /// XPENDING + XCLAIM: take over one entry idle for at least `claim_idle`.
    ///
    /// XCLAIM re-checks the idle time, so of two consumers racing for the same
    /// entry only one gets it.
    async fn claim_idle_entry(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.stream_key, &self.group, "-", "+", CLAIM_SCAN)
            .await
            .map_err(transport)?;

        let min_idle = self.claim_idle.as_millis() as usize;
        let Some(stale) = pending
            .ids
            .into_iter()
            .find(|p| p.last_delivered_ms >= min_idle)
        else {
            return Ok(None);
        };

        let claimed: StreamClaimReply = conn
            .xclaim(&self.stream_key, &self.group, &self.consumer, min_idle, &[&stale.id])
            .await
            .map_err(transport)?;

        let Some(entry) = claimed.ids.into_iter().next() else {
            return Ok(None);
        };

        debug!(
            delivery_id = %entry.id,
            previous_consumer = %stale.consumer,
            idle_ms = stale.last_delivered_ms,
            "claimed idle pending entry"
        );
        Ok(Some(parse_entry(entry, stale.times_delivered + 1)))
    }
}

/// `times_delivered` counts reads of this stream entry, including the current one.
///
/// Entries deleted while pending come back without fields; their empty body
/// fails to decode and the consumer dead-letters them.
fn parse_entry(entry: StreamId, times_delivered: usize) -> Delivery {
    let body: String = entry.get(PAYLOAD_FIELD).unwrap_or_default();
    let previous: u32 = entry.get(DELIVERIES_FIELD).unwrap_or(0);

    Delivery {
        id: entry.id,
        body,
        delivery_count: delivery_count(previous, times_delivered),
    }
}

fn delivery_count(previous: u32, times_delivered: usize) -> u32 {
    let times = u32::try_from(times_delivered.max(1)).unwrap_or(u32::MAX);
    previous.saturating_add(times)
}

fn transport(err: redis::RedisError) -> QueueError {
    QueueError::Transport(err.to_string())
}

#[async_trait::async_trait]
impl JobQueue for RedisStreamsJobQueue {
    #[instrument(
        skip(self, message),
        fields(stream_key = %self.stream_key, job_id = %message.job_id),
        err
    )]
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let payload = message.encode()?;
        self.append(
            &self.stream_key,
            &[(PAYLOAD_FIELD, payload), (DELIVERIES_FIELD, "0".to_string())],
        )
        .await?;
        Ok(())
    }

    async fn receive(&self, max_wait: Duration) -> Result<Option<Delivery>, QueueError> {
        if !self.pending_drained.load(Ordering::Acquire) {
            match self.read_one("0", None).await? {
                Some(delivery) => return Ok(Some(delivery)),
                None => self.pending_drained.store(true, Ordering::Release),
            }
        }

        if let Some(delivery) = self.claim_idle_entry().await? {
            return Ok(Some(delivery));
        }

        let block = max_wait.max(Duration::from_millis(1));
        self.read_one(">", Some(block)).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.acknowledge(&delivery.id).await
    }

    #[instrument(
        skip(self, delivery),
        fields(delivery_id = %delivery.id, delivery_count = delivery.delivery_count),
        err
    )]
    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        if delivery.delivery_count >= self.max_deliveries {
            return self.dead_letter(delivery, reason).await;
        }

        let id = self
            .append(
                &self.stream_key,
                &[
                    (PAYLOAD_FIELD, delivery.body.clone()),
                    (DELIVERIES_FIELD, delivery.delivery_count.to_string()),
                ],
            )
            .await?;
        self.acknowledge(&delivery.id).await?;

        debug!(redelivery_id = %id, "message re-queued");
        Ok(())
    }

    #[instrument(
        skip(self, delivery),
        fields(delivery_id = %delivery.id, dlq_key = %self.dlq_key),
        err
    )]
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        self.append(
            &self.dlq_key,
            &[
                ("original_message_id", delivery.id.clone()),
                (DELIVERIES_FIELD, delivery.delivery_count.to_string()),
                ("reason", reason.to_string()),
                ("failed_at", chrono::Utc::now().to_rfc3339()),
                (PAYLOAD_FIELD, delivery.body.clone()),
            ],
        )
        .await?;
        self.acknowledge(&delivery.id).await?;

        warn!(
            delivery_count = delivery.delivery_count,
            %reason,
            "message sent to dead-letter queue"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaconv_core::JobId;
    use mediaconv_images::ProcessImageInput;

    fn entry(fields: &[(&str, &str)]) -> StreamId {
        StreamId {
            id: "1700000000000-0".to_string(),
            map: fields
                .iter()
                .map(|(k, v)| (k.to_string(), redis::Value::Data(v.as_bytes().to_vec())))
                .collect(),
        }
    }

    #[test]
    fn first_read_counts_one_delivery_past_the_stored_field() {
        let delivery = parse_entry(entry(&[(PAYLOAD_FIELD, "{}"), (DELIVERIES_FIELD, "2")]), 1);
        assert_eq!(delivery.delivery_count, 3);
        assert_eq!(delivery.body, "{}");
    }

    #[test]
    fn claimed_entries_count_every_unsettled_read() {
        // Read once, ack failed, now claimed: two reads of the same entry.
        let delivery = parse_entry(entry(&[(PAYLOAD_FIELD, "{}"), (DELIVERIES_FIELD, "0")]), 2);
        assert_eq!(delivery.delivery_count, 2);
    }

    #[test]
    fn entries_without_fields_have_an_empty_body() {
        let delivery = parse_entry(entry(&[]), 1);
        assert_eq!(delivery.body, "");
        assert_eq!(delivery.delivery_count, 1);
        assert!(delivery.decode().is_err());
    }

    fn redis_url() -> Option<String> {
        std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty())
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn unacknowledged_entry_is_claimed_again_without_restart() {
        let Some(url) = redis_url() else { return };
        let stream = format!("mediaconv:test:{}", JobId::new());

        let queue = RedisStreamsJobQueue::connect(&url, stream.clone(), "g", "c-1")
            .await
            .unwrap()
            .with_claim_idle(Duration::from_millis(50));
        let message = QueueMessage {
            trace_id: "t-1".into(),
            job_id: JobId::new(),
            input: ProcessImageInput::new("https://x/a.jpg", "describe"),
        };
        queue.publish(&message).await.unwrap();

        let first = queue.receive(Duration::from_millis(100)).await.unwrap().unwrap();
        assert_eq!(first.delivery_count, 1);
        // Never settled: simulates an ack that failed.

        tokio::time::sleep(Duration::from_millis(80)).await;
        let again = queue.receive(Duration::from_millis(100)).await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.delivery_count, 2);
        assert_eq!(again.decode().unwrap(), message);

        queue.ack(&again).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(queue.receive(Duration::from_millis(50)).await.unwrap().is_none());
    }
}
