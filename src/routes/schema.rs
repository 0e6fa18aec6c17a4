//! Warehouse schema route handlers

use crate::error::ApiResult;
use crate::schema_check::{self, SchemaReport};
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;

/// Verify expected warehouse objects and dimension integrity
pub async fn get_schema_report(State(state): State<SharedState>) -> ApiResult<Json<SchemaReport>> {
    let report = schema_check::verify(state.warehouse.as_ref()).await?;
    Ok(Json(report))
}
