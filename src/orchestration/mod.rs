//! Pipeline Orchestration Module
//!
//! Everything that talks to Azure Data Factory:
//!
//! 1. **Credential**: acquires and caches management-plane access tokens
//! 2. **Client**: `createRun`, `pipelineruns/{id}` and `queryPipelineRuns`
//! 3. **Poller**: waits for a run to reach a terminal status, bounded by a
//!    deadline and cancellable from the outside

pub mod client;
pub mod credential;
pub mod poller;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::DataFactoryClient;
pub use poller::{CancelSignal, PollError, RunPoller};
pub use types::{PipelineRun, RunParameters, RunStatus, RunWindow};

/// Errors raised while talking to the orchestration service
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Data Factory returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Pipeline run not found: {0}")]
    RunNotFound(String),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Pipeline-run management operations
///
/// `DataFactoryClient` is the production implementation; tests substitute
/// scripted fakes.
#[async_trait]
pub trait PipelineOrchestrator: Send + Sync {
    /// Start a run of `pipeline_name` and return its run id.
    async fn create_run(
        &self,
        pipeline_name: &str,
        parameters: &RunParameters,
    ) -> Result<String, OrchestrationError>;

    /// Current state of a single run.
    async fn get_run(&self, run_id: &str) -> Result<PipelineRun, OrchestrationError>;

    /// All runs of the factory last updated inside `window`.
    async fn query_runs(&self, window: RunWindow) -> Result<Vec<PipelineRun>, OrchestrationError>;
}
