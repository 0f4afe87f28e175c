//! Broker-agnostic half of the activity gateway.
pub mod publisher;
pub mod supervisor;
pub mod transport;

pub use publisher::{Ack, PublishError, Publisher};
pub use supervisor::{BrokerHandle, ConnectionState, Supervisor, SupervisorConfig};
pub use transport::{BrokerChannel, BrokerConnector, BrokerError, SharedChannel};
