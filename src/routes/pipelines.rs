//! Pipeline Routes
//!
//! Trigger Data Factory pipelines and inspect their runs.

use crate::error::{bad_request, validation_error, ApiResult, AppError};
use crate::orchestration::{PipelineRun, RunParameters, RunWindow};
use crate::state::SharedState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Data Factory entity names: leading letter, digit or underscore; no path or wildcard characters.
static PIPELINE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_\- ]{0,259}$").expect("valid pipeline name pattern"));

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub pipeline_name: Option<String>,
    #[serde(default)]
    pub parameters: RunParameters,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
    pub pipeline_name: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RunsQuery {
    #[validate(range(min = 1, max = 720, message = "hours must be between 1 and 720"))]
    pub hours: Option<u32>,
}

fn validate_pipeline_name(name: Option<String>) -> Result<String, AppError> {
    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| bad_request("pipeline_name is required"))?;

    if !PIPELINE_NAME.is_match(&name) {
        return Err(validation_error(format!("'{}' is not a valid pipeline name", name)));
    }
    Ok(name)
}

fn run_id_from(path: Result<Path<Uuid>, PathRejection>) -> Result<String, AppError> {
    let Path(run_id) = path.map_err(|e| bad_request(e.body_text()))?;
    Ok(run_id.to_string())
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Start a pipeline run
pub async fn trigger_pipeline(
    State(state): State<SharedState>,
    payload: Result<Json<TriggerRequest>, JsonRejection>,
) -> ApiResult<Json<TriggerResponse>> {
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;
    let pipeline_name = validate_pipeline_name(payload.pipeline_name)?;

    let orchestrator = state.orchestrator()?;
    let run_id = orchestrator.create_run(&pipeline_name, &payload.parameters).await?;

    info!("Pipeline triggered: {} (run {})", pipeline_name, run_id);

    Ok(Json(TriggerResponse {
        status: "triggered",
        pipeline_name,
        run_id,
        timestamp: Utc::now(),
    }))
}

/// Current state of one run
pub async fn get_run(
    State(state): State<SharedState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<PipelineRun>> {
    let run_id = run_id_from(path)?;
    let run = state.orchestrator()?.get_run(&run_id).await?;
    Ok(Json(run))
}

/// Block until the run is terminal, the poll deadline passes or the server shuts down
pub async fn wait_for_run(
    State(state): State<SharedState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<PipelineRun>> {
    let run_id = run_id_from(path)?;
    let orchestrator = state.orchestrator()?;

    let run = state
        .poller
        .wait_for_completion(orchestrator.as_ref(), &run_id, state.shutdown.clone())
        .await?;

    info!("Pipeline run {} completed with status: {}", run.run_id, run.status);
    Ok(Json(run))
}

/// Runs updated during the last `hours` hours (default 24)
pub async fn list_runs(
    State(state): State<SharedState>,
    query: Result<Query<RunsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<PipelineRun>>> {
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;
    query.validate().map_err(|e| validation_error(e.to_string()))?;

    let window = query.hours.map(RunWindow::last_hours).unwrap_or_default();
    let runs = state.orchestrator()?.query_runs(window).await?;

    info!("Found {} recent pipeline runs", runs.len());
    Ok(Json(runs))
}
