//! Activity ingestion gateway.
//!
//! Accepts productivity events over HTTP, writes each one to PostgreSQL and
//! forwards the stored event, now carrying its id, to a durable RabbitMQ
//! queue.
//!
//! # Example
//!
//! ```rust,ignore
//! use activityservice::{ApiConfig, ApiState, IngestPipeline, NonRtService, PublishPolicy, RestApiService};
//!
//! let pipeline = IngestPipeline::new(store, supervisor.handle(), Publisher::new("activity_events"), PublishPolicy::StoreFirst);
//! let mut api = RestApiService::new("0.0.0.0", 3001, Arc::new(ApiState::new(pipeline, ApiConfig::default())));
//! api.start().await?;
//! ```

pub mod config;
pub mod ingest;
pub mod models;
pub mod rest_api;
pub mod traits;

// Re-exports
pub use config::ServiceConfig;
pub use ingest::{IngestError, IngestPipeline, PublishPolicy};
pub use rest_api::{create_router, ApiConfig, ApiState, RestApiService};
pub use traits::{IngestCounts, NonRtService, ServiceError, ServiceResult, ServiceStatus};
