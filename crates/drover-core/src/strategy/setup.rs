use std::sync::Arc;

use async_trait::async_trait;

use drover_types::{JobState, PhoneJob, SetupStep, WorkflowConfig};

use crate::strategy::{steps, with_core, StateOutcome, Strategy, CORE_STEPS};
use crate::{WorkflowContext, WorkflowError};

/// Fixed linear profile-setup sequence. Steps without a configured flow id or
/// without data in the account payload are skipped.
pub struct SetupStrategy {
    config: Arc<WorkflowConfig>,
}

impl SetupStrategy {
    pub fn new(config: Arc<WorkflowConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Strategy for SetupStrategy {
    fn post_login_state(&self, job: &PhoneJob) -> JobState {
        steps::enabled_steps(&self.config, &job.account)
            .first()
            .map(|step| step.submit_state())
            .unwrap_or(JobState::Done)
    }

    fn retryable_states(&self) -> Vec<JobState> {
        let submit_states: Vec<JobState> = SetupStep::CANONICAL_ORDER
            .into_iter()
            .map(|step| step.submit_state())
            .collect();
        with_core(&submit_states)
    }

    fn total_steps(&self) -> u32 {
        CORE_STEPS + 2 * SetupStep::CANONICAL_ORDER.len() as u32
    }

    async fn run_state(
        &self,
        state: JobState,
        ctx: &WorkflowContext,
    ) -> Result<StateOutcome, WorkflowError> {
        if let Some(step) = steps::step_for_submit_state(state) {
            steps::submit_step(ctx, step).await?;
            return Ok(StateOutcome::Handled);
        }
        if let Some(step) = steps::step_for_poll_state(state) {
            let record = steps::poll_step_record(ctx, step).await?;
            let job = ctx.job().await?;
            let enabled = steps::enabled_steps(&self.config, &job.account);
            steps::finish_step(ctx, &enabled, step, &record).await?;
            return Ok(StateOutcome::Handled);
        }
        Ok(StateOutcome::Unhandled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::run_job;
    use crate::test_support::*;
    use drover_types::{Account, PostKind, PostSpec, SetupProfile, WorkflowType};

    #[tokio::test]
    async fn enabled_steps_run_in_canonical_order() {
        let account = Account {
            username: "u".to_string(),
            password: "p".to_string(),
            posts: Vec::new(),
            setup: Some(SetupProfile {
                new_display_name: Some("Sally Roe".to_string()),
                bio: Some("a bio".to_string()),
                posts: vec![PostSpec {
                    kind: PostKind::Image,
                    description: "first".to_string(),
                    media_urls: vec!["https://x/a.jpg".to_string()],
                }],
                ..Default::default()
            }),
        };
        let mut config = test_config(WorkflowType::Setup, vec![account]);
        for key in ["editDisplayName", "editBio", "post1", "setPrivate", "renameUsername"] {
            config
                .setup_flow_ids
                .insert(key.to_string(), format!("flow-{key}"));
        }

        let api = std::sync::Arc::new(ScriptedApi::default());
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);

        // renameUsername is gated off (no new_username in the payload);
        // the rest run in the canonical sequence.
        let log = api.custom_task_log.lock().unwrap();
        let flows: Vec<_> = log.iter().map(|(flow, _)| flow.clone()).collect();
        assert_eq!(
            flows,
            vec!["flow-editDisplayName", "flow-editBio", "flow-post1", "flow-setPrivate"]
        );
    }

    #[tokio::test]
    async fn no_enabled_steps_means_done_after_login() {
        let account = Account::new("u", "p");
        let config = test_config(WorkflowType::Setup, vec![account]);
        let api = std::sync::Arc::new(ScriptedApi::default());
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(api.call_count("create_custom_task"), 0);
    }
}
