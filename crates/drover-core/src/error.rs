use drover_client::RpaError;
use thiserror::Error;

/// Everything that can go wrong while driving a job. Provider errors keep
/// their classification; the remaining variants are workflow-level outcomes
/// the executor pattern-matches on instead of retrying blindly.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Rpa(#[from] RpaError),
    /// Publish preflight found media URLs that do not answer 2xx to HEAD.
    #[error("media not reachable: {0}")]
    MediaUnreachable(String),
    /// Rename task failed because the requested handle is taken.
    #[error("username is taken: {0}")]
    UsernameTaken(String),
    #[error("timed out after {elapsed_secs}s waiting for {what}")]
    PollTimeout { what: String, elapsed_secs: u64 },
    #[error("cancelled")]
    Cancelled,
    /// Non-retryable workflow failure with a human-readable reason.
    #[error("{0}")]
    Fatal(String),
}

impl WorkflowError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        WorkflowError::Fatal(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowError::Cancelled)
    }

    pub fn is_phone_not_running(&self) -> bool {
        matches!(self, WorkflowError::Rpa(RpaError::PhoneNotRunning(_)))
    }

    /// Transport failures and rate limiting retry in any state; other
    /// provider codes retry only when the failing state has budget left.
    /// Everything else is final for the job.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Rpa(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Retryable even in states outside the strategy's retryable set.
    pub fn retries_anywhere(&self) -> bool {
        matches!(
            self,
            WorkflowError::Rpa(RpaError::Transport(_)) | WorkflowError::Rpa(RpaError::RateLimited(_))
        )
    }
}
