//! Service lifecycle contract shared by the long-running parts of the
//! gateway process.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service start failed: {0}")]
    StartFailed(String),
    #[error("Service not running")]
    NotRunning,
    #[error("Service already running")]
    AlreadyRunning,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outcome counters of the ingestion endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IngestCounts {
    /// Answered 202.
    pub accepted: u64,
    /// Answered 4xx/503 before anything was written.
    pub rejected: u64,
    /// Answered 500.
    pub failed: u64,
    /// Stored but never published. Always a subset of `failed`.
    pub orphaned: u64,
}

/// Service status information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub running: bool,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub counts: IngestCounts,
}

impl ServiceStatus {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            running: false,
            started_at: None,
            counts: IngestCounts::default(),
        }
    }
}

#[async_trait]
pub trait NonRtService: Send + Sync {
    /// Unique name of the service
    fn name(&self) -> &str;

    async fn start(&mut self) -> ServiceResult<()>;

    async fn stop(&mut self) -> ServiceResult<()>;

    fn status(&self) -> ServiceStatus;
}
