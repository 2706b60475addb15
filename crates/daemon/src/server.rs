use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use nav_backup_core::{BackupConfig, BackupConfigUpdate, BackupFileRef, BackupOutcome, Frequency, RestoreOutcome};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::connection::ConnectionCheck;
use crate::engine::BackupEngine;
use crate::error::EngineError;
use crate::scheduler::{ScheduleState, Scheduler};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BackupEngine>,
    pub scheduler: Arc<Scheduler>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/healthz", get(healthz))
        .route("/api/v1/backup/config", get(get_config).put(save_config))
        .route("/api/v1/backup/run", post(run_backup))
        .route("/api/v1/backup/files", get(list_files))
        .route("/api/v1/backup/restore", post(restore_backup))
        .route("/api/v1/backup/test", post(test_connection))
        .route("/api/v1/backup/schedule", get(schedule_state))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::ConfigIncomplete => StatusCode::BAD_REQUEST,
            EngineError::BackupNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidFormat(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::TransportUnavailable(_) | EngineError::UploadFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
}

async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse { status: "ok" })
}

/// Stored configuration with the password reduced to a flag.
#[derive(Debug, Serialize)]
struct ConfigView {
    url: Option<String>,
    username: Option<String>,
    has_password: bool,
    frequency: Option<Frequency>,
    last_backup_time: Option<DateTime<Utc>>,
    last_backup_status: Option<String>,
}

impl From<BackupConfig> for ConfigView {
    fn from(cfg: BackupConfig) -> Self {
        Self {
            has_password: cfg.password.as_deref().is_some_and(|p| !p.is_empty()),
            url: cfg.url,
            username: cfg.username,
            frequency: cfg.frequency,
            last_backup_time: cfg.last_backup_time,
            last_backup_status: cfg.last_backup_status,
        }
    }
}

async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigView>, EngineError> {
    let cfg = state.engine.configs().get().await?;
    Ok(Json(cfg.into()))
}

async fn save_config(
    State(state): State<AppState>,
    Json(update): Json<BackupConfigUpdate>,
) -> Result<Json<ConfigView>, EngineError> {
    state.engine.configs().save(&update).await?;
    if update.frequency.is_some() {
        state.scheduler.reconfigure().await?;
    }
    let cfg = state.engine.configs().get().await?;
    Ok(Json(cfg.into()))
}

async fn run_backup(State(state): State<AppState>) -> Result<Json<BackupOutcome>, EngineError> {
    Ok(Json(state.engine.perform_backup().await?))
}

async fn list_files(
    State(state): State<AppState>,
) -> Result<Json<Vec<BackupFileRef>>, EngineError> {
    Ok(Json(state.engine.list_backups().await?))
}

#[derive(Debug, Deserialize)]
struct RestoreRequest {
    filename: String,
    #[serde(default)]
    path: Option<String>,
}

async fn restore_backup(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<RestoreOutcome>, EngineError> {
    let outcome = state
        .engine
        .restore(&req.filename, req.path.as_deref())
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct TestConnectionRequest {
    url: String,
    username: String,
    password: String,
}

async fn test_connection(
    State(state): State<AppState>,
    Json(req): Json<TestConnectionRequest>,
) -> Json<ConnectionCheck> {
    Json(
        state
            .engine
            .test_connection(&req.url, &req.username, &req.password)
            .await,
    )
}

async fn schedule_state(State(state): State<AppState>) -> Json<ScheduleState> {
    Json(state.scheduler.state().await)
}
