//! Polls a slide-rendering job until it reaches a terminal status.
//!
//! Two independent caps bound a job: the attempt ceiling of the loop itself,
//! and a wall-clock timeout of `interval * max_attempts + grace` around the
//! whole loop. Whichever fires first ends polling; no status query is issued
//! after the loop exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::slides::{JobStatus, SlideRenderer};

const DEFAULT_FAILURE_MESSAGE: &str = "Presentation generation failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    pub grace: Duration,
}

impl PollConfig {
    pub fn safety_timeout(&self) -> Duration {
        self.interval * self.max_attempts + self.grace
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
            grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("{0}")]
    Failed(String),

    #[error("presentation job {job_id} timed out after {attempts} status checks")]
    TimedOut { job_id: String, attempts: u32 },

    #[error("status query failed: {0}")]
    Query(String),

    #[error("presentation job finished without a result URL")]
    MissingResult,
}

/// In-memory record of one job being polled
#[derive(Debug)]
pub struct PollingJob {
    pub job_id: String,
    pub attempts: u32,
    pub started_at: Instant,
}

impl PollingJob {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            attempts: 0,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, PartialEq)]
enum PollState {
    Polling,
    Succeeded(Option<String>),
    Failed(String),
    QueryFailed(String),
    TimedOut,
}

pub struct Poller {
    renderer: Arc<dyn SlideRenderer>,
    config: PollConfig,
}

impl Poller {
    pub fn new(renderer: Arc<dyn SlideRenderer>, config: PollConfig) -> Self {
        Self { renderer, config }
    }

    /// Wait for `job_id` to finish and return the rendered deck's URL.
    pub async fn wait(&self, job_id: &str) -> Result<String, PollError> {
        let mut job = PollingJob::new(job_id);
        let outcome = tokio::time::timeout(self.config.safety_timeout(), self.run(&mut job)).await;

        let state = match outcome {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    attempts = job.attempts,
                    elapsed = ?job.started_at.elapsed(),
                    "Presentation polling hit the safety timeout"
                );
                PollState::TimedOut
            }
        };

        match state {
            PollState::Succeeded(Some(url)) => {
                tracing::info!(job_id = %job.job_id, attempts = job.attempts, "Presentation ready");
                Ok(url)
            }
            PollState::Succeeded(None) => Err(PollError::MissingResult),
            PollState::Failed(message) => Err(PollError::Failed(message)),
            PollState::QueryFailed(message) => Err(PollError::Query(message)),
            PollState::TimedOut | PollState::Polling => Err(PollError::TimedOut {
                job_id: job.job_id,
                attempts: job.attempts,
            }),
        }
    }

    async fn run(&self, job: &mut PollingJob) -> PollState {
        // First check happens one interval after submission.
        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        // A slow status call pushes the next check back instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.step(job).await {
                PollState::Polling => continue,
                terminal => return terminal,
            }
        }
    }

    async fn step(&self, job: &mut PollingJob) -> PollState {
        job.attempts += 1;
        let at_ceiling = job.attempts >= self.config.max_attempts;

        let report = match self.renderer.status(&job.job_id).await {
            Ok(report) => report,
            Err(e) if at_ceiling => return PollState::QueryFailed(e.to_string()),
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, attempt = job.attempts, error = %e, "Status check failed, will retry");
                return PollState::Polling;
            }
        };

        tracing::debug!(job_id = %job.job_id, attempt = job.attempts, status = ?report.status, "Polled presentation job");

        match report.status {
            JobStatus::Success => PollState::Succeeded(report.result_url),
            JobStatus::Failed | JobStatus::Error => PollState::Failed(
                report
                    .error
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            ),
            _ if at_ceiling => PollState::TimedOut,
            _ => PollState::Polling,
        }
    }
}
