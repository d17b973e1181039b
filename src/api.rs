use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{check_range, MAX_INTERVAL_SEC, MAX_TIMEOUT_MS};
use crate::engine::MonitorHandle;
use crate::error::MonitorError;
use crate::journal::Journal;
use crate::models::{MonitorStatus, ProbeMode, Target};

#[derive(Clone)]
pub struct AppState {
    pub monitor: MonitorHandle,
    pub journal: Journal,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigPatch {
    pub mode: Option<ProbeMode>,
    pub target: Option<Target>,
    pub interval_sec: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub max_samples: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveRequest {
    pub path: Option<PathBuf>,
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let code = match self {
            MonitorError::ControllerClosed => StatusCode::SERVICE_UNAVAILABLE,
            MonitorError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        };
        (code, self.to_string()).into_response()
    }
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<MonitorStatus>, MonitorError> {
    Ok(Json(state.monitor.status().await?))
}

pub async fn get_log(State(state): State<Arc<AppState>>) -> String {
    state.journal.text()
}

pub async fn start(State(state): State<Arc<AppState>>) -> Result<StatusCode, MonitorError> {
    let was_running = state.monitor.status().await?.running;
    state.monitor.start()?;
    if !was_running {
        state.journal.append("Auto-monitoring started.");
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Result<StatusCode, MonitorError> {
    let was_running = state.monitor.status().await?.running;
    state.monitor.stop()?;
    if was_running {
        state.journal.append("Auto-monitoring stopped.");
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn check(State(state): State<Arc<AppState>>) -> Result<StatusCode, MonitorError> {
    state.monitor.check_once()?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<ConfigPatch>,
) -> Result<StatusCode, MonitorError> {
    if let Some(target) = &patch.target {
        if target.host.trim().is_empty() || target.port == 0 {
            return Err(MonitorError::InvalidConfig(format!("invalid target {}", target)));
        }
    }
    if let Some(sec) = patch.interval_sec {
        check_range("interval_sec", sec, MAX_INTERVAL_SEC)?;
    }
    if let Some(ms) = patch.timeout_ms {
        check_range("timeout_ms", ms, MAX_TIMEOUT_MS)?;
    }
    if patch.max_samples == Some(0) {
        return Err(MonitorError::InvalidConfig("max_samples must be at least 1".into()));
    }

    let monitor = &state.monitor;
    if let Some(mode) = patch.mode {
        monitor.set_mode(mode)?;
    }
    if let Some(target) = patch.target {
        monitor.set_target(target.host.trim(), target.port)?;
    }
    if let Some(sec) = patch.interval_sec {
        monitor.set_interval_sec(sec)?;
        state.journal.append(format!("Interval changed to {} s.", sec));
    }
    if let Some(ms) = patch.timeout_ms {
        monitor.set_timeout_ms(ms)?;
    }
    if let Some(n) = patch.max_samples {
        monitor.set_max_samples(n)?;
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn save_log(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveRequest>,
) -> (StatusCode, String) {
    let Some(path) = request.path.or_else(|| state.log_file.clone()) else {
        return (StatusCode::BAD_REQUEST, "no path given and no log_file configured".into());
    };
    match state.journal.save(&path) {
        Ok(()) => (StatusCode::OK, path.display().to_string()),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/log", get(get_log))
        .route("/api/log/save", post(save_log))
        .route("/api/start", post(start))
        .route("/api/stop", post(stop))
        .route("/api/check", post(check))
        .route("/api/config", put(update_config))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn start_server(port: u16, state: AppState, cancel: CancellationToken) -> Result<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {}", port))?;
    info!("Control API: http://localhost:{}", addr.port());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Control API server failed")
}
