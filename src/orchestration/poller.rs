//! Pipeline run poller
//!
//! Waits for a run to reach a terminal status. Each iteration checks the
//! deadline, queries the run once, and then suspends for a fixed interval.
//! There is no backoff and no jitter. The wait ends early when the caller's
//! [`CancelSignal`] flips to `true`.

use super::types::PipelineRun;
use super::{OrchestrationError, PipelineOrchestrator};
use crate::config::PollConfig;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Receiving half of a cancellation flag; `true` means stop waiting.
pub type CancelSignal = watch::Receiver<bool>;

/// Create a linked cancel sender / signal pair, initially not cancelled.
pub fn cancel_channel() -> (watch::Sender<bool>, CancelSignal) {
    watch::channel(false)
}

/// Why a wait ended without a terminal status
#[derive(Error, Debug)]
pub enum PollError {
    /// The run was still active when the deadline passed
    #[error("Pipeline run {run_id} exceeded timeout of {} seconds", .timeout.as_secs())]
    Timeout { run_id: String, timeout: Duration },

    #[error("Wait for pipeline run {0} was cancelled")]
    Cancelled(String),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

/// Bounded fixed-interval poller
#[derive(Debug, Clone, Copy)]
pub struct RunPoller {
    interval: Duration,
    timeout: Duration,
}

impl RunPoller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            interval: config.interval,
            timeout: config.timeout,
        }
    }

    /// Poll `run_id` until it is terminal.
    ///
    /// A `Failed` or `Cancelled` run is a normal `Ok` result; only the
    /// deadline, the cancel signal or a failed status query produce an error.
    /// After any of those outcomes no further status query is issued.
    pub async fn wait_for_completion(
        &self,
        orchestrator: &dyn PipelineOrchestrator,
        run_id: &str,
        mut cancel: CancelSignal,
    ) -> Result<PipelineRun, PollError> {
        info!("Waiting for pipeline run {} to complete...", run_id);
        let started = Instant::now();

        loop {
            if started.elapsed() > self.timeout {
                return Err(PollError::Timeout {
                    run_id: run_id.to_string(),
                    timeout: self.timeout,
                });
            }

            let run = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return Err(PollError::Cancelled(run_id.to_string())),
                run = orchestrator.get_run(run_id) => run?,
            };

            info!(run_id = %run_id, status = %run.status, "Current status");
            if run.status.is_terminal() {
                return Ok(run);
            }

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return Err(PollError::Cancelled(run_id.to_string())),
                _ = tokio::time::sleep(self.interval) => {}
            }
            debug!("Polling run {} again after {:?}", run_id, started.elapsed());
        }
    }
}

/// Resolves once the flag is `true`. A dropped sender can never cancel, so it never resolves.
async fn cancelled(cancel: &mut CancelSignal) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}
