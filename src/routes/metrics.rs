//! Pipeline health route handlers
//!
//! Read-only views over the ETL control and data-quality tables.

use crate::error::{bad_request, ApiResult};
use crate::metrics::{MetricsSummary, QualityScore};
use crate::models::{EtlControlRow, RowLimit};
use crate::state::SharedState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// Today's load totals and success rate
pub async fn get_metrics_summary(
    State(state): State<SharedState>,
) -> ApiResult<Json<MetricsSummary>> {
    let counts = state.warehouse.load_summary().await?;
    debug!("Load summary: {:?}", counts);
    Ok(Json(counts.into()))
}

/// Most recently modified control rows
pub async fn get_recent_pipelines(
    State(state): State<SharedState>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<EtlControlRow>>> {
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;
    let limit = match query.limit {
        Some(limit) => RowLimit::new(limit)?,
        None => RowLimit::default(),
    };

    let rows = state.warehouse.recent_loads(limit).await?;
    Ok(Json(rows))
}

/// Pass rate of data-quality checks over the last day
pub async fn get_data_quality_score(
    State(state): State<SharedState>,
) -> ApiResult<Json<QualityScore>> {
    let counts = state.warehouse.quality_counts().await?;
    Ok(Json(counts.into()))
}
