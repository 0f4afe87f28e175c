//! REST API Service using Axum
//!
//! - GET /health - liveness plus broker connection state
//! - GET /status - service lifecycle status and ingest outcome counters
//! - POST /api/activity - ingest one activity event

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ingest::{IngestError, IngestPipeline};
use crate::models::{
    AcceptedResponse, ActivityRequest, ErrorResponse, HealthResponse, BROKER_UNAVAILABLE, EVENT_RECEIVED,
    INTERNAL_ERROR,
};
use crate::traits::{IngestCounts, NonRtService, ServiceError, ServiceResult, ServiceStatus};

pub const SERVICE_NAME: &str = "activityservice";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_bytes: 64 * 1024,
        }
    }
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    orphaned: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IngestCounts {
        IngestCounts {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }
}

/// REST API state shared across handlers and the owning service
pub struct ApiState {
    pipeline: IngestPipeline,
    config: ApiConfig,
    counters: Counters,
    lifecycle: RwLock<ServiceStatus>,
}

impl ApiState {
    pub fn new(pipeline: IngestPipeline, config: ApiConfig) -> Self {
        Self {
            pipeline,
            config,
            counters: Counters::default(),
            lifecycle: RwLock::new(ServiceStatus::new(SERVICE_NAME)),
        }
    }

    pub fn counts(&self) -> IngestCounts {
        self.counters.snapshot()
    }

    /// Lifecycle status with the current counters filled in.
    pub fn status(&self) -> ServiceStatus {
        let lifecycle = self.lifecycle.read().unwrap_or_else(PoisonError::into_inner);
        ServiceStatus {
            counts: self.counts(),
            ..lifecycle.clone()
        }
    }

    fn set_running(&self, running: bool) {
        let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
        lifecycle.running = running;
        if running {
            lifecycle.started_at = Some(Utc::now());
        }
    }
}

#[derive(serde::Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    service: ServiceStatus,
    broker: abstractgateway::ConnectionState,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Health check endpoint. Reads the broker handle only.
async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        broker: state.pipeline.broker_state(),
    })
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: state.status(),
        broker: state.pipeline.broker_state(),
    })
}

/// POST /api/activity - validate, store, publish
async fn post_activity(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request = match ActivityRequest::parse(&body) {
        Ok(r) => r,
        Err(e) => {
            debug!("rejecting activity: {e}");
            Counters::bump(&state.counters.rejected);
            return error_response(StatusCode::BAD_REQUEST, e.public_message());
        }
    };

    let limit = state.config.request_timeout;
    match state.pipeline.ingest(request.into_event(), limit).await {
        Ok(stored) => {
            Counters::bump(&state.counters.accepted);
            (
                StatusCode::ACCEPTED,
                Json(AcceptedResponse {
                    status: EVENT_RECEIVED,
                    event_id: stored.event_id,
                }),
            )
                .into_response()
        }
        Err(IngestError::BrokerUnavailable) => {
            warn!("rejecting activity: broker unavailable");
            Counters::bump(&state.counters.rejected);
            error_response(StatusCode::SERVICE_UNAVAILABLE, BROKER_UNAVAILABLE)
        }
        Err(e) => {
            // Orphaned ids are already logged by the pipeline.
            if e.orphaned_id().is_some() {
                Counters::bump(&state.counters.orphaned);
            } else {
                error!("{e}");
            }
            Counters::bump(&state.counters.failed);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

/// Create the REST API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/api/activity", post(post_activity))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// REST API Service
pub struct RestApiService {
    host: String,
    port: u16,
    state: Arc<ApiState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl RestApiService {
    /// `host` may be an IP literal (v4 or bare v6) or a resolvable name.
    pub fn new(host: &str, port: u16, state: Arc<ApiState>) -> Self {
        Self {
            host: host.to_string(),
            port,
            state,
            shutdown_tx: None,
            server: None,
        }
    }
}

#[async_trait::async_trait]
impl NonRtService for RestApiService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn start(&mut self) -> ServiceResult<()> {
        if self.state.status().running {
            return Err(ServiceError::AlreadyRunning);
        }

        let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| ServiceError::StartFailed(format!("Bind {} port {} failed: {}", self.host, self.port, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServiceError::StartFailed(format!("Listener address unavailable: {}", e)))?;

        let router = create_router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        self.server = Some(tokio::spawn(async move {
            info!("REST API listening on {}", addr);

            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    info!("REST API shutting down");
                })
                .await;

            if let Err(e) = served {
                error!("REST API server error: {e}");
            }
        }));

        self.state.set_running(true);
        Ok(())
    }

    async fn stop(&mut self) -> ServiceResult<()> {
        if !self.state.status().running {
            return Err(ServiceError::NotRunning);
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            if let Err(e) = server.await {
                warn!("REST API task ended abnormally: {e}");
            }
        }

        self.state.set_running(false);
        info!(counts = ?self.state.counts(), "REST API service stopped");
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        self.state.status()
    }
}
