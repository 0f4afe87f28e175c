use serde::Serialize;
use tracing::debug;

use crate::transport::{BrokerError, SharedChannel};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("broker channel not available")]
    NoChannel,

    #[error("encoding message failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Local acceptance of a published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub queue: String,
    pub bytes: usize,
}

/// Publishes JSON messages to one durable queue with persistent delivery.
#[derive(Debug, Clone)]
pub struct Publisher {
    queue: String,
}

impl Publisher {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// No retry on failure; the caller decides what a failed publish means.
    pub async fn publish<T>(&self, channel: Option<&SharedChannel>, message: &T) -> Result<Ack, PublishError>
    where
        T: Serialize + Sync,
    {
        let channel = channel.ok_or(PublishError::NoChannel)?;
        let payload = serde_json::to_vec(message)?;

        channel.publish(&self.queue, &payload).await?;

        debug!(queue = %self.queue, bytes = payload.len(), "message published");
        Ok(Ack {
            queue: self.queue.clone(),
            bytes: payload.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BrokerChannel;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl BrokerChannel for RecordingChannel {
        async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
            if self.fail {
                return Err(BrokerError::Publish("channel closed".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((queue.to_string(), payload.to_vec()));
            Ok(())
        }
        async fn closed(&self) {
            std::future::pending::<()>().await
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn publishes_json_to_configured_queue() {
        let recorder = Arc::new(RecordingChannel::default());
        let channel: SharedChannel = recorder.clone();
        let publisher = Publisher::new("activity_events");

        let ack = publisher
            .publish(Some(&channel), &serde_json::json!({"event_id": 7}))
            .await
            .unwrap();
        assert_eq!(ack.queue, "activity_events");

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (queue, payload) = &sent[0];
        assert_eq!(queue, "activity_events");
        let v: serde_json::Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(v["event_id"], 7);
        assert_eq!(ack.bytes, payload.len());
    }

    #[tokio::test]
    async fn missing_channel_is_an_error() {
        let publisher = Publisher::new("activity_events");
        let err = publisher.publish(None, &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, PublishError::NoChannel));
    }

    #[tokio::test]
    async fn send_failure_is_not_retried() {
        let recorder = Arc::new(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let channel: SharedChannel = recorder.clone();
        let err = Publisher::new("q")
            .publish(Some(&channel), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Broker(BrokerError::Publish(_))));
        assert!(recorder.sent.lock().unwrap().is_empty());
    }
}
