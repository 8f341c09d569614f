use std::sync::Arc;

use async_trait::async_trait;

use drover_types::{Account, JobState, LogLevel, PhoneJob, SetupStep, WorkflowConfig};

use crate::strategy::{steps, username, with_core, StateOutcome, Strategy, CORE_STEPS};
use crate::{WorkflowContext, WorkflowError};

/// Runs a user-selected subset of the setup palette in the user's order, and
/// recovers from taken usernames by generating alternatives from the display
/// name instead of burning the retry budget.
pub struct CustomStrategy {
    config: Arc<WorkflowConfig>,
}

impl CustomStrategy {
    pub fn new(config: Arc<WorkflowConfig>) -> Self {
        Self { config }
    }

    fn selected_steps(&self, account: &Account) -> Vec<SetupStep> {
        if self.config.custom_task_order.is_empty() {
            return steps::enabled_steps(&self.config, account);
        }
        self.config
            .custom_task_order
            .iter()
            .filter_map(|key| SetupStep::from_key(key))
            .filter(|step| steps::step_enabled(&self.config, account, *step))
            .collect()
    }

    /// Picks the next untried username candidate and re-enters the rename
    /// submit state. These loops are not counted against the retry budget.
    async fn smart_retry_rename(&self, ctx: &WorkflowContext) -> Result<(), WorkflowError> {
        let job = ctx.job().await?;
        if job.username_candidates.is_empty() {
            let setup = job.account.setup.as_ref();
            let display_name = setup
                .and_then(|s| s.new_display_name.as_deref())
                .unwrap_or_default();
            let candidates =
                username::generate_candidates(display_name, username::CANDIDATE_LIMIT);
            let original = job
                .current_username
                .clone()
                .or_else(|| setup.and_then(|s| s.new_username.clone()));
            ctx.update_job(move |j| {
                j.username_candidates = candidates;
                j.original_username = original;
            })
            .await;
        }

        let job = ctx.job().await?;
        let next = job
            .username_candidates
            .iter()
            .find(|candidate| !job.attempted_usernames.contains(*candidate))
            .cloned();
        match next {
            Some(candidate) => {
                ctx.log(
                    LogLevel::Warn,
                    format!("username taken, retrying rename as {candidate}"),
                )
                .await;
                ctx.update_job(move |j| j.current_username = Some(candidate))
                    .await;
                ctx.transition_to(JobState::RenameUsername).await;
                Ok(())
            }
            None => Err(WorkflowError::UsernameTaken(
                "all generated username candidates are taken".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Strategy for CustomStrategy {
    fn post_login_state(&self, job: &PhoneJob) -> JobState {
        self.selected_steps(&job.account)
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
            if step == SetupStep::RenameUsername && !record.succeeded() {
                let desc = record.fail_desc.clone().unwrap_or_default();
                if username::is_taken_desc(&desc) {
                    self.smart_retry_rename(ctx).await?;
                    return Ok(StateOutcome::Handled);
                }
            }
            let job = ctx.job().await?;
            let selected = self.selected_steps(&job.account);
            steps::finish_step(ctx, &selected, step, &record).await?;
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
    use drover_types::{SetupProfile, WorkflowType};

    fn custom_config() -> WorkflowConfig {
        let account = Account {
            username: "old".to_string(),
            password: "pw".to_string(),
            posts: Vec::new(),
            setup: Some(SetupProfile {
                new_username: Some("sallyroe".to_string()),
                new_display_name: Some("Sally Roe".to_string()),
                bio: Some("a bio".to_string()),
                ..Default::default()
            }),
        };
        let mut config = test_config(WorkflowType::Custom, vec![account]);
        config
            .setup_flow_ids
            .insert("renameUsername".to_string(), "flow-rename".to_string());
        config
            .setup_flow_ids
            .insert("editBio".to_string(), "flow-bio".to_string());
        config
    }

    #[tokio::test]
    async fn taken_usernames_walk_generated_candidates() {
        let api = Arc::new(ScriptedApi::default());
        api.custom_tasks.lock().unwrap().extend([
            Ok("t-r1".to_string()),
            Ok("t-r2".to_string()),
            Ok("t-r3".to_string()),
            Ok("t-bio".to_string()),
        ]);
        api.script_task("t-r1", vec![failed("t-r1", "username is already taken")]);
        api.script_task("t-r2", vec![failed("t-r2", "Username is already taken")]);

        let (ctx, strategy) = ctx_with_job(api.clone(), custom_config()).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.attempts_for(JobState::RenameUsername), 0);
        assert_eq!(job.original_username.as_deref(), Some("sallyroe"));
        assert_eq!(job.current_username.as_deref(), Some("sallyroe_2"));

        let log = api.custom_task_log.lock().unwrap();
        let rename_usernames: Vec<_> = log
            .iter()
            .filter(|(flow, _)| flow == "flow-rename")
            .filter_map(|(_, params)| params.get("username").cloned())
            .collect();
        assert_eq!(rename_usernames, vec!["sallyroe", "sallyroe_1", "sallyroe_2"]);
    }

    #[tokio::test]
    async fn exhausted_candidates_fail_the_job() {
        let api = Arc::new(ScriptedApi::default());
        // Every rename attempt comes back taken.
        for i in 0..10 {
            let task_id = format!("t-r{i}");
            api.custom_tasks.lock().unwrap().push_back(Ok(task_id.clone()));
            api.script_task(&task_id, vec![failed(&task_id, "username taken")]);
        }

        let (ctx, strategy) = ctx_with_job(api, custom_config()).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.as_deref().unwrap().contains("username"));
    }

    #[tokio::test]
    async fn user_selected_order_overrides_the_canonical_one() {
        let mut config = custom_config();
        config.custom_task_order = vec!["editBio".to_string(), "renameUsername".to_string()];
        let api = Arc::new(ScriptedApi::default());

        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        assert_eq!(ctx.store.job("E1").await.unwrap().state, JobState::Done);
        let log = api.custom_task_log.lock().unwrap();
        let flows: Vec<_> = log.iter().map(|(flow, _)| flow.clone()).collect();
        assert_eq!(flows, vec!["flow-bio", "flow-rename"]);
    }

    #[tokio::test]
    async fn unselected_steps_are_skipped() {
        let mut config = custom_config();
        config.custom_task_order = vec!["editBio".to_string()];
        let api = Arc::new(ScriptedApi::default());

        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        assert_eq!(ctx.store.job("E1").await.unwrap().state, JobState::Done);
        let log = api.custom_task_log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "flow-bio");
    }
}
