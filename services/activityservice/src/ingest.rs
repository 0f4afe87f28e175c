//! Store-then-publish pipeline behind `POST /api/activity`.

use std::sync::Arc;
use std::time::Duration;

use abstractgateway::{BrokerHandle, ConnectionState, PublishError, Publisher};
use postgresdb::{EventId, NewEvent, RecordStore, StoreError, StoredEvent};
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

/// Where the broker availability check sits relative to the store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PublishPolicy {
    /// Write first, then look for a channel. A broker outage leaves stored,
    /// unpublished events behind.
    #[default]
    StoreFirst,
    /// Refuse the request up front when no channel is available. The channel
    /// is checked again after the write.
    BrokerFirst,
}

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("broker unavailable, nothing written")]
    BrokerUnavailable,

    #[error("record store write failed: {0}")]
    Store(#[from] StoreError),

    #[error("event {event_id} stored but not published: {source}")]
    Unpublished {
        event_id: EventId,
        #[source]
        source: PublishError,
    },

    /// The deadline passed. `event_id` is set when the write had already
    /// committed, in which case the event was never published.
    #[error("ingest deadline of {limit:?} exceeded")]
    Timeout { event_id: Option<EventId>, limit: Duration },
}

impl IngestError {
    /// Id of an event that is stored but will never reach the queue.
    pub fn orphaned_id(&self) -> Option<EventId> {
        match self {
            IngestError::Unpublished { event_id, .. } => Some(*event_id),
            IngestError::Timeout { event_id, .. } => *event_id,
            IngestError::BrokerUnavailable | IngestError::Store(_) => None,
        }
    }
}

pub struct IngestPipeline {
    store: Arc<dyn RecordStore>,
    broker: BrokerHandle,
    publisher: Publisher,
    policy: PublishPolicy,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        broker: BrokerHandle,
        publisher: Publisher,
        policy: PublishPolicy,
    ) -> Self {
        Self {
            store,
            broker,
            publisher,
            policy,
        }
    }

    pub fn broker_state(&self) -> ConnectionState {
        self.broker.state()
    }

    /// Persist, enrich with the store id, publish, all within `limit`. A
    /// publish failure or timeout does not undo the write; the orphaned id
    /// is logged here.
    pub async fn ingest(&self, event: NewEvent, limit: Duration) -> Result<StoredEvent, IngestError> {
        if self.policy == PublishPolicy::BrokerFirst && self.broker.current_channel().is_none() {
            return Err(IngestError::BrokerUnavailable);
        }

        let deadline = Instant::now() + limit;

        let event_id = timeout_at(deadline, self.store.insert(&event))
            .await
            .map_err(|_| IngestError::Timeout { event_id: None, limit })??;
        let stored = event.into_stored(event_id);

        let channel = self.broker.current_channel();
        match timeout_at(deadline, self.publisher.publish(channel.as_ref(), &stored)).await {
            Ok(Ok(_ack)) => {}
            Ok(Err(source)) => {
                warn!(%event_id, queue = self.publisher.queue(), "event stored but not published: {source}");
                return Err(IngestError::Unpublished { event_id, source });
            }
            Err(_) => {
                warn!(%event_id, queue = self.publisher.queue(), ?limit, "event stored but publish timed out");
                return Err(IngestError::Timeout {
                    event_id: Some(event_id),
                    limit,
                });
            }
        }

        info!(%event_id, event_type = %stored.event.event_type, "event ingested");
        Ok(stored)
    }
}
