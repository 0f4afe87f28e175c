use std::sync::Arc;

use async_trait::async_trait;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(#[source] BoxError),

    #[error("declaring queue '{queue}' failed: {source}")]
    Declare {
        queue: String,
        #[source]
        source: BoxError,
    },

    #[error("publish failed: {0}")]
    Publish(#[source] BoxError),
}

/// Publish handle obtained from a live broker connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Hand one persistent message to the broker client. Returns once the
    /// client has accepted the frame; broker-side confirms are not awaited.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Resolves once the broker has reported an error on the connection or
    /// the channel. After that the channel is never usable again.
    async fn closed(&self);

    /// Close the underlying connection.
    async fn close(&self);
}

pub type SharedChannel = Arc<dyn BrokerChannel>;

/// Dials the broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connect, open a channel and declare the target queue as durable.
    /// Either all of it succeeds or nothing is left open.
    async fn connect(&self) -> Result<SharedChannel, BrokerError>;
}
