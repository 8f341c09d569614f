//! Workflow strategies: state tables for everything after login.
//!
//! The executor resolves each state against the job's strategy first and
//! falls through to the core pre-login chain when the strategy returns
//! [`StateOutcome::Unhandled`].

use std::sync::Arc;

use async_trait::async_trait;

use drover_types::{JobState, PhoneJob, WorkflowConfig, WorkflowType};

use crate::{WorkflowContext, WorkflowError};

pub mod custom;
pub mod post;
pub mod setup;
pub mod steps;
pub mod username;
pub mod warmup;

pub use custom::CustomStrategy;
pub use post::PostStrategy;
pub use setup::SetupStrategy;
pub use warmup::WarmupStrategy;

/// Package the workflows install, launch and log into.
pub const IG_PACKAGE_NAME: &str = "com.instagram.android";

/// Progress steps of the shared pre-login chain.
pub const CORE_STEPS: u32 = 7;

/// Pre-login states every strategy retries with backoff.
pub const CORE_RETRYABLE: [JobState; 4] = [
    JobState::StartEnv,
    JobState::RestartEnv,
    JobState::InstallApp,
    JobState::Login,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    Handled,
    Unhandled,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn requires_login(&self) -> bool {
        true
    }

    /// First state after a successful login.
    fn post_login_state(&self, job: &PhoneJob) -> JobState;

    /// States whose provider-logical failures are retried against the budget.
    fn retryable_states(&self) -> Vec<JobState>;

    /// Progress denominator for jobs running this strategy.
    fn total_steps(&self) -> u32;

    /// Runs the handler for `state`, or reports the state as not belonging
    /// to this strategy.
    async fn run_state(
        &self,
        state: JobState,
        ctx: &WorkflowContext,
    ) -> Result<StateOutcome, WorkflowError>;
}

pub fn strategy_for(config: &Arc<WorkflowConfig>) -> Arc<dyn Strategy> {
    match config.workflow_type {
        WorkflowType::Warmup => Arc::new(WarmupStrategy),
        WorkflowType::Post => Arc::new(PostStrategy),
        WorkflowType::Setup => Arc::new(SetupStrategy::new(config.clone())),
        WorkflowType::Custom => Arc::new(CustomStrategy::new(config.clone())),
    }
}

fn with_core(states: &[JobState]) -> Vec<JobState> {
    CORE_RETRYABLE.iter().chain(states).copied().collect()
}
