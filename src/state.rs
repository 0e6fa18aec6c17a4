//! Application state management
//!
//! Contains shared state accessible across all handlers. Nothing in here is
//! mutated per request; each handler borrows what it needs.

use crate::db::Warehouse;
use crate::error::AppError;
use crate::orchestration::{CancelSignal, PipelineOrchestrator, RunPoller};
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Read access to the ETL control and data-quality tables
    pub warehouse: Arc<dyn Warehouse>,

    /// Data Factory client; `None` when no factory is configured
    pub orchestrator: Option<Arc<dyn PipelineOrchestrator>>,

    /// Poller used by the wait endpoint
    pub poller: RunPoller,

    /// Flips to `true` when the server starts shutting down
    pub shutdown: CancelSignal,
}

impl AppState {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        orchestrator: Option<Arc<dyn PipelineOrchestrator>>,
        poller: RunPoller,
        shutdown: CancelSignal,
    ) -> Self {
        Self {
            warehouse,
            orchestrator,
            poller,
            shutdown,
        }
    }

    /// The configured orchestrator, or a 503-mapped error
    pub fn orchestrator(&self) -> Result<&Arc<dyn PipelineOrchestrator>, AppError> {
        self.orchestrator.as_ref().ok_or_else(|| {
            AppError::NotConfigured(
                "Data Factory is not configured (set ADF_SUBSCRIPTION_ID, ADF_RESOURCE_GROUP and ADF_FACTORY_NAME)"
                    .to_string(),
            )
        })
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
