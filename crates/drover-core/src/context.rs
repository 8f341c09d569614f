use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use drover_client::{task_status, RpaApi, TaskRecord};
use drover_types::{
    JobState, LogEntry, LogLevel, PhoneJob, Screenshot, WorkflowConfig,
};

use crate::{WorkflowError, WorkflowStore};

/// Poll budget for publish tasks; everything else uses the configured
/// poll timeout.
pub const PUBLISH_POLL_BUDGET_SECS: u64 = 900;

const SCREENSHOT_POLL_PERIOD_SECS: u64 = 2;
const SCREENSHOT_POLL_BUDGET_SECS: u64 = 30;

/// Which budget a remote task poll runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    Login,
    Warmup,
    Publish,
    Setup,
}

impl TaskCategory {
    fn budget_secs(self, config: &WorkflowConfig) -> u64 {
        match self {
            TaskCategory::Publish => PUBLISH_POLL_BUDGET_SECS,
            _ => config.poll_timeout_secs,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TaskCategory::Login => "login task",
            TaskCategory::Warmup => "warmup task",
            TaskCategory::Publish => "publish task",
            TaskCategory::Setup => "setup task",
        }
    }
}

pub fn backoff_secs(base: u64, attempt: u32) -> u64 {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u64 << shift)
}

/// Per-job façade handed to state handlers: the client, the run config, the
/// store, and the run's cancellation token, bound to one env id.
#[derive(Clone)]
pub struct WorkflowContext {
    pub client: Arc<dyn RpaApi>,
    pub config: Arc<WorkflowConfig>,
    pub store: WorkflowStore,
    pub env_id: String,
    pub phone_name: String,
    pub cancel: CancellationToken,
}

impl WorkflowContext {
    pub async fn job(&self) -> Result<PhoneJob, WorkflowError> {
        self.store
            .job(&self.env_id)
            .await
            .ok_or_else(|| WorkflowError::fatal(format!("job record for {} is gone", self.env_id)))
    }

    pub async fn update_job<F>(&self, mutate: F) -> Option<PhoneJob>
    where
        F: FnOnce(&mut PhoneJob),
    {
        self.store.update_job(&self.env_id, mutate).await
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_with_details(level, message, None).await;
    }

    pub async fn log_with_details(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        details: Option<Value>,
    ) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!(env_id = %self.env_id, "{message}"),
            LogLevel::Info => tracing::info!(env_id = %self.env_id, "{message}"),
            LogLevel::Warn => tracing::warn!(env_id = %self.env_id, "{message}"),
            LogLevel::Error => tracing::error!(env_id = %self.env_id, "{message}"),
        }
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            phone_id: Some(self.env_id.clone()),
            phone_name: Some(self.phone_name.clone()),
            details,
        };
        self.store.log(entry).await;
    }

    /// Moves the job into `state`; the executor loop picks the new state up
    /// on its next iteration. Also advances the progress counter and stamps
    /// completion when the state is terminal.
    pub async fn transition_to(&self, state: JobState) {
        self.update_job(|job| {
            job.state = state;
            if job.current_step < job.total_steps {
                job.current_step += 1;
            }
            if state.is_terminal() {
                job.completed_at = Some(Utc::now());
            }
        })
        .await;
    }

    pub async fn transition_to_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.log(LogLevel::Error, format!("job failed: {reason}")).await;
        self.update_job(|job| {
            job.state = JobState::Failed;
            job.error = Some(reason);
            job.completed_at = Some(Utc::now());
        })
        .await;
    }

    pub fn check_cancelled(&self) -> Result<(), WorkflowError> {
        if self.cancel.is_cancelled() {
            Err(WorkflowError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps until the deadline or the run's cancellation signal fires.
    pub async fn sleep_with_abort(&self, duration: Duration) -> Result<(), WorkflowError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(WorkflowError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub async fn task_id(&self, stage: &str) -> Result<String, WorkflowError> {
        let job = self.job().await?;
        job.task_ids.get(stage).cloned().ok_or_else(|| {
            WorkflowError::fatal(format!("no remote task recorded for stage {stage}"))
        })
    }

    pub async fn record_task_id(&self, stage: &str, task_id: &str) {
        let stage = stage.to_string();
        let task_id = task_id.to_string();
        self.update_job(move |job| {
            job.task_ids.insert(stage, task_id);
        })
        .await;
    }

    /// Long-polls a remote task to its first terminal record. Transient query
    /// failures keep polling; budget expiry and cancellation end the poll.
    pub async fn poll_task(
        &self,
        task_id: &str,
        category: TaskCategory,
        timeout_override: Option<u64>,
    ) -> Result<TaskRecord, WorkflowError> {
        let budget = timeout_override.unwrap_or_else(|| category.budget_secs(&self.config));
        let period = Duration::from_secs(self.config.poll_interval_secs);
        let started = Instant::now();
        loop {
            self.check_cancelled()?;
            match self.client.query_task(task_id).await {
                Ok(record) if record.is_terminal() => {
                    if record.status == task_status::CANCELLED {
                        self.log(
                            LogLevel::Warn,
                            format!("remote task {task_id} was cancelled on the provider side"),
                        )
                        .await;
                    }
                    return Ok(record);
                }
                Ok(_) => {}
                Err(err) if err.is_retryable() => {
                    self.log(
                        LogLevel::Debug,
                        format!("task query for {task_id} failed transiently: {err}"),
                    )
                    .await;
                }
                Err(err) => return Err(err.into()),
            }
            if started.elapsed().as_secs() >= budget {
                return Err(WorkflowError::PollTimeout {
                    what: format!("{} {task_id}", category.label()),
                    elapsed_secs: budget,
                });
            }
            self.sleep_with_abort(period).await?;
        }
    }

    /// Number of retries still available for `state`.
    pub async fn retries_left(&self, state: JobState) -> Result<u32, WorkflowError> {
        let job = self.job().await?;
        Ok(self
            .config
            .max_retries_per_stage
            .saturating_sub(job.attempts_for(state)))
    }

    /// Consumes one retry from the budget of `state` and sleeps the
    /// exponential backoff. Returns the attempt number, or `None` when the
    /// budget is exhausted.
    pub async fn consume_retry(&self, state: JobState) -> Result<Option<u32>, WorkflowError> {
        if self.retries_left(state).await? == 0 {
            return Ok(None);
        }
        let mut attempt = 0;
        self.update_job(|job| attempt = job.record_attempt(state)).await;
        let delay = backoff_secs(self.config.base_backoff_secs, attempt);
        self.log(
            LogLevel::Warn,
            format!(
                "retrying {state:?} (attempt {attempt}/{}) after {delay}s",
                self.config.max_retries_per_stage
            ),
        )
        .await;
        self.sleep_with_abort(Duration::from_secs(delay)).await?;
        Ok(Some(attempt))
    }

    /// Runs `op`, retrying retryable failures against the budget of `state`
    /// with exponential backoff. The final error is re-raised for the
    /// executor to translate.
    pub async fn with_retry<T, F, Fut>(&self, state: JobState, mut op: F) -> Result<T, WorkflowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        loop {
            self.check_cancelled()?;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    if self.consume_retry(state).await?.is_none() {
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Best-effort screenshot: request, short-poll the result, record the
    /// download URL on the job. Failures are logged and swallowed.
    pub async fn take_screenshot(&self, label: &str) {
        let outcome: Result<(), WorkflowError> = async {
            let ticket = self.client.request_screenshot(&self.env_id).await?;
            let started = Instant::now();
            loop {
                self.check_cancelled()?;
                let shot = self.client.get_screenshot_result(&ticket).await?;
                if shot.status == task_status::COMPLETED {
                    if let Some(url) = shot.download_link {
                        let label = label.to_string();
                        self.update_job(move |job| {
                            job.screenshots.push(Screenshot {
                                label,
                                url,
                                taken_at: Utc::now(),
                            });
                        })
                        .await;
                    }
                    return Ok(());
                }
                if shot.status == task_status::FAILED {
                    return Err(WorkflowError::fatal("screenshot capture failed"));
                }
                if started.elapsed().as_secs() >= SCREENSHOT_POLL_BUDGET_SECS {
                    return Err(WorkflowError::PollTimeout {
                        what: format!("screenshot {ticket}"),
                        elapsed_secs: SCREENSHOT_POLL_BUDGET_SECS,
                    });
                }
                self.sleep_with_abort(Duration::from_secs(SCREENSHOT_POLL_PERIOD_SECS))
                    .await?;
            }
        }
        .await;
        if let Err(err) = outcome {
            self.log(
                LogLevel::Warn,
                format!("screenshot '{label}' not captured: {err}"),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_secs(2, 1), 2);
        assert_eq!(backoff_secs(2, 2), 4);
        assert_eq!(backoff_secs(2, 3), 8);
        assert_eq!(backoff_secs(1, 1), 1);
        assert_eq!(backoff_secs(0, 3), 0);
    }
}
