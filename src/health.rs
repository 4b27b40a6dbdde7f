//! Health and metrics HTTP endpoint.
//!
//! [`HealthChecker`] polls a set of named checks on a background task and
//! caches the result; `GET /health` serves the cached status without running
//! the checks on the request path.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::PipelineMetrics;

type Check = Box<dyn Fn() -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    /// `ok` or the error message, per check
    pub details: BTreeMap<String, String>,
}

struct HealthInner {
    status: RwLock<HealthStatus>,
    checks: RwLock<BTreeMap<String, Check>>,
    interval: Duration,
}

#[derive(Clone)]
pub struct HealthChecker {
    inner: Arc<HealthInner>,
}

impl HealthChecker {
    /// Starts healthy with no checks; `interval` is the polling period used by
    /// [`spawn`](Self::spawn).
    pub fn new(interval: Duration) -> Self {
        HealthChecker {
            inner: Arc::new(HealthInner {
                status: RwLock::new(HealthStatus {
                    status: Status::Healthy,
                    timestamp: Utc::now(),
                    details: BTreeMap::new(),
                }),
                checks: RwLock::new(BTreeMap::new()),
                interval,
            }),
        }
    }

    /// Registers a check, replacing any check with the same name.
    pub fn add_check<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.inner
            .checks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Box::new(check));
    }

    /// Runs every check once and stores the result.
    pub fn run_checks(&self) -> HealthStatus {
        let mut details = BTreeMap::new();
        let mut status = Status::Healthy;
        {
            let checks = self
                .inner
                .checks
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for (name, check) in checks.iter() {
                match check() {
                    Ok(()) => {
                        details.insert(name.clone(), "ok".to_string());
                    }
                    Err(message) => {
                        status = Status::Unhealthy;
                        details.insert(name.clone(), message);
                    }
                }
            }
        }

        let current = HealthStatus {
            status,
            timestamp: Utc::now(),
            details,
        };
        *self
            .inner
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner) = current.clone();
        current
    }

    /// Last stored status.
    pub fn status(&self) -> HealthStatus {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Polls the checks every interval until `cancel` fires. The first poll
    /// happens immediately.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let checker = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(checker.inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let status = checker.run_checks();
                        if status.status == Status::Unhealthy {
                            warn!(details = ?status.details, "health check failed");
                        }
                    }
                }
            }
        })
    }
}

#[derive(Clone)]
struct AppState {
    checker: HealthChecker,
    metrics: PipelineMetrics,
}

/// `GET /health` and `GET /metrics`.
pub fn router(checker: HealthChecker, metrics: PipelineMetrics) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_snapshot))
        .with_state(AppState { checker, metrics })
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.checker.status();
    let code = match status.status {
        Status::Healthy => StatusCode::OK,
        Status::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(status))
}

async fn metrics_snapshot(State(state): State<AppState>) -> Json<Value> {
    Json(state.metrics.snapshot())
}

/// Serves `router` on `addr` until `cancel` fires.
pub async fn serve(addr: SocketAddr, router: Router, cancel: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "health endpoint listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
