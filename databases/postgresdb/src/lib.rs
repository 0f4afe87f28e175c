//! PostgreSQL record store for activity events.
//!
//! - `models::event` - the event shapes before and after insert
//! - `eventstore` - the `RecordStore` contract and its PostgreSQL implementation
//! - `postgresclient` - lazily connected, self-healing `tokio-postgres` session

pub mod eventstore;
pub mod postgresclient;

pub mod models {
    pub mod event;
}

pub use eventstore::{EventStoreConfig, PostgresEventStore, RecordStore, StoreError};
pub use models::event::{EventId, NewEvent, StoredEvent};
