//! Job Polling
//!
//! State machine tracking an asynchronous whole-video detection job:
//! SUBMITTED -> POLLING -> {SUCCEEDED, FAILED, TIMED_OUT}. The poller runs as
//! its own suspending task; its waits never block frame dispatch or other
//! streams' pipelines.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info};

use crate::clients::VideoAnalyzer;
use crate::error::{Error, Result};
use crate::models::{DetectionJob, DetectionLabel, JobState, JobStatus};
use crate::retry::RetryPolicy;

// =============================================================================
// Configuration
// =============================================================================

/// Poller configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between status polls
    pub poll_interval_secs: u64,
    /// Polls before the job is declared timed out
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            max_attempts: 20,
        }
    }
}

// =============================================================================
// Job Poller
// =============================================================================

/// Submits whole videos for asynchronous analysis and drives the returned
/// jobs to a terminal state.
pub struct JobPoller {
    analyzer: Arc<dyn VideoAnalyzer>,
    retry: Arc<RetryPolicy>,
    config: PollerConfig,
}

impl JobPoller {
    pub fn new(
        analyzer: Arc<dyn VideoAnalyzer>,
        retry: Arc<RetryPolicy>,
        config: PollerConfig,
    ) -> Self {
        Self {
            analyzer,
            retry,
            config,
        }
    }

    /// Submits a stored video for label detection. The returned job enters
    /// `POLLING` immediately.
    pub async fn submit(
        &self,
        video_ref: &str,
        notification_target: Option<&str>,
    ) -> Result<DetectionJob> {
        if video_ref.is_empty() {
            return Err(Error::InvalidInput(
                "video reference must not be empty".into(),
            ));
        }

        let job_id = self
            .retry
            .execute("submit video job", || {
                self.analyzer.submit(video_ref, notification_target)
            })
            .await?;
        info!(%job_id, video_ref, "label detection job submitted");

        Ok(DetectionJob {
            job_id,
            video_ref: video_ref.to_string(),
            state: JobState::Polling,
            attempts: 0,
        })
    }

    /// Polls `job` until it reaches a terminal state. A SUCCEEDED status
    /// returns the result payload; FAILED surfaces [`Error::JobFailed`];
    /// exhausting the attempt budget without a terminal status marks the job
    /// TIMED_OUT and surfaces [`Error::JobTimeout`]. Between polls the task
    /// suspends for the configured interval.
    pub async fn wait(&self, job: &mut DetectionJob) -> Result<Vec<DetectionLabel>> {
        let started = Instant::now();
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        job.state = JobState::Polling;

        while job.attempts < self.config.max_attempts {
            let report = self
                .retry
                .execute("poll job status", || self.analyzer.poll_status(&job.job_id))
                .await?;
            job.attempts += 1;

            match report.status {
                JobStatus::Succeeded => {
                    job.state = JobState::Succeeded;
                    info!(
                        job_id = %job.job_id,
                        attempts = job.attempts,
                        labels = report.labels.len(),
                        "detection job completed"
                    );
                    return Ok(report.labels);
                }
                JobStatus::Failed => {
                    job.state = JobState::Failed;
                    error!(job_id = %job.job_id, attempts = job.attempts, "detection job failed");
                    return Err(Error::JobFailed {
                        job_id: job.job_id.clone(),
                    });
                }
                status => {
                    info!(
                        job_id = %job.job_id,
                        attempt = job.attempts,
                        ?status,
                        "detection job still running"
                    );
                    if job.attempts < self.config.max_attempts {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        job.state = JobState::TimedOut;
        let elapsed_secs = started.elapsed().as_secs_f64();
        error!(
            job_id = %job.job_id,
            attempts = job.attempts,
            elapsed_secs,
            "detection job did not complete in time"
        );
        Err(Error::JobTimeout {
            job_id: job.job_id.clone(),
            attempts: job.attempts,
            elapsed_secs,
        })
    }

    /// Submit-and-wait convenience for callers that do not track the job.
    pub async fn run_to_completion(
        &self,
        video_ref: &str,
        notification_target: Option<&str>,
    ) -> Result<(DetectionJob, Vec<DetectionLabel>)> {
        let mut job = self.submit(video_ref, notification_target).await?;
        let labels = self.wait(&mut job).await?;
        Ok((job, labels))
    }
}
