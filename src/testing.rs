//! In-memory fakes of the warehouse and the orchestration service for unit tests

use crate::db::Warehouse;
use crate::error::AppError;
use crate::models::{
    EtlControlRow, IntegrityProbe, LoadSummaryCounts, QualityCounts, RowLimit, SchemaObject,
};
use crate::orchestration::{
    OrchestrationError, PipelineOrchestrator, PipelineRun, RunParameters, RunStatus, RunWindow,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeWarehouse {
    pub summary: LoadSummaryCounts,
    pub quality: QualityCounts,
    pub loads: Vec<EtlControlRow>,
    pub missing_objects: Vec<SchemaObject>,
    pub null_customer_keys: i64,
    pub duplicate_current_customers: i64,
    /// Every query fails when set
    pub unreachable: bool,
    pub last_limit: Mutex<Option<i64>>,
}

impl FakeWarehouse {
    fn check_reachable(&self) -> Result<(), AppError> {
        if self.unreachable {
            return Err(AppError::Unavailable("warehouse unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn ping(&self) -> Result<(), AppError> {
        self.check_reachable()
    }

    async fn load_summary(&self) -> Result<LoadSummaryCounts, AppError> {
        self.check_reachable()?;
        Ok(self.summary)
    }

    async fn recent_loads(&self, limit: RowLimit) -> Result<Vec<EtlControlRow>, AppError> {
        self.check_reachable()?;
        *self.last_limit.lock().unwrap() = Some(limit.get());
        Ok(self.loads.iter().take(limit.get() as usize).cloned().collect())
    }

    async fn quality_counts(&self) -> Result<QualityCounts, AppError> {
        self.check_reachable()?;
        Ok(self.quality)
    }

    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, AppError> {
        self.check_reachable()?;
        Ok(!self.missing_objects.contains(object))
    }

    async fn integrity_violations(&self, probe: IntegrityProbe) -> Result<i64, AppError> {
        self.check_reachable()?;
        Ok(match probe {
            IntegrityProbe::NullCustomerKeys => self.null_customer_keys,
            IntegrityProbe::DuplicateCurrentCustomers => self.duplicate_current_customers,
        })
    }
}

pub fn run_record(run_id: &str, status: RunStatus) -> PipelineRun {
    PipelineRun {
        run_id: run_id.to_string(),
        pipeline_name: "PL_FullLoad_OnPremToAzureDW".to_string(),
        status,
        start_time: None,
        end_time: None,
        duration_ms: None,
        message: None,
    }
}

/// Orchestrator that replays a fixed status script
///
/// Once the script is exhausted every status query reports `InProgress`.
#[derive(Default)]
pub struct ScriptedOrchestrator {
    statuses: Mutex<VecDeque<RunStatus>>,
    status_calls: AtomicUsize,
    fail_status: bool,
    pub runs: Vec<PipelineRun>,
    pub triggered: Mutex<Vec<(String, RunParameters)>>,
}

impl ScriptedOrchestrator {
    pub fn with_statuses(statuses: &[RunStatus]) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Self::default()
        }
    }

    /// `query_runs` answers with `runs`
    pub fn with_runs(runs: Vec<PipelineRun>) -> Self {
        Self {
            runs,
            ..Self::default()
        }
    }

    /// Every status query fails with `RunNotFound`
    pub fn failing_status() -> Self {
        Self {
            fail_status: true,
            ..Self::default()
        }
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineOrchestrator for ScriptedOrchestrator {
    async fn create_run(
        &self,
        pipeline_name: &str,
        parameters: &RunParameters,
    ) -> Result<String, OrchestrationError> {
        if pipeline_name == "PL_Missing" {
            return Err(OrchestrationError::PipelineNotFound(pipeline_name.to_string()));
        }
        let mut triggered = self.triggered.lock().unwrap();
        triggered.push((pipeline_name.to_string(), parameters.clone()));
        Ok(format!("run-{}", triggered.len()))
    }

    async fn get_run(&self, run_id: &str) -> Result<PipelineRun, OrchestrationError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_status {
            return Err(OrchestrationError::RunNotFound(run_id.to_string()));
        }
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunStatus::InProgress);
        Ok(run_record(run_id, status))
    }

    async fn query_runs(&self, _window: RunWindow) -> Result<Vec<PipelineRun>, OrchestrationError> {
        Ok(self.runs.clone())
    }
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_http(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
