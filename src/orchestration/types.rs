//! Pipeline run types shared by the Data Factory client, the poller and the routes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Status of a pipeline run as reported by Data Factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    InProgress,
    /// Cancellation requested but not yet finished
    Canceling,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// A terminal run never transitions again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "Queued",
            RunStatus::InProgress => "InProgress",
            RunStatus::Canceling => "Canceling",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
            RunStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A pipeline run record, read-only from this service's side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub message: Option<String>,
}

/// Parameters passed to `createRun`
pub type RunParameters = HashMap<String, serde_json::Value>;

/// Window of `lastUpdated` timestamps for run queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub updated_after: DateTime<Utc>,
    pub updated_before: DateTime<Utc>,
}

impl RunWindow {
    /// Runs updated during the last `hours` hours
    pub fn last_hours(hours: u32) -> Self {
        let now = Utc::now();
        Self {
            updated_after: now - chrono::Duration::hours(i64::from(hours)),
            updated_before: now,
        }
    }
}

impl Default for RunWindow {
    fn default() -> Self {
        Self::last_hours(24)
    }
}
