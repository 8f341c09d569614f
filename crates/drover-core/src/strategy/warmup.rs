use async_trait::async_trait;

use drover_client::WarmupParams;
use drover_types::{JobState, LogLevel, PhoneJob};

use crate::strategy::{with_core, StateOutcome, Strategy, CORE_STEPS, IG_PACKAGE_NAME};
use crate::{TaskCategory, WorkflowContext, WorkflowError};

pub struct WarmupStrategy;

#[async_trait]
impl Strategy for WarmupStrategy {
    fn post_login_state(&self, _job: &PhoneJob) -> JobState {
        JobState::StartApp
    }

    fn retryable_states(&self) -> Vec<JobState> {
        with_core(&[JobState::StartApp, JobState::StartWarmup])
    }

    fn total_steps(&self) -> u32 {
        CORE_STEPS + 3
    }

    async fn run_state(
        &self,
        state: JobState,
        ctx: &WorkflowContext,
    ) -> Result<StateOutcome, WorkflowError> {
        match state {
            JobState::StartApp => {
                let client = ctx.client.clone();
                let env_id = ctx.env_id.clone();
                ctx.with_retry(JobState::StartApp, || {
                    let client = client.clone();
                    let env_id = env_id.clone();
                    async move {
                        client
                            .start_app(&env_id, IG_PACKAGE_NAME)
                            .await
                            .map_err(WorkflowError::from)
                    }
                })
                .await?;
                ctx.log(LogLevel::Info, "target app brought to foreground").await;
                ctx.transition_to(JobState::StartWarmup).await;
            }
            JobState::StartWarmup => {
                let params = WarmupParams {
                    videos_to_browse: ctx.config.warmup.videos_to_browse,
                    search_keyword: ctx.config.warmup.search_keyword.clone(),
                };
                let client = ctx.client.clone();
                let env_id = ctx.env_id.clone();
                let task_id = ctx
                    .with_retry(JobState::StartWarmup, || {
                        let client = client.clone();
                        let env_id = env_id.clone();
                        let params = params.clone();
                        async move {
                            client
                                .instagram_warmup(&env_id, &params)
                                .await
                                .map_err(WorkflowError::from)
                        }
                    })
                    .await?;
                ctx.record_task_id("warmup", &task_id).await;
                ctx.log(LogLevel::Info, format!("warmup task {task_id} submitted"))
                    .await;
                ctx.transition_to(JobState::PollWarmup).await;
            }
            JobState::PollWarmup => {
                let task_id = ctx.task_id("warmup").await?;
                let record = ctx.poll_task(&task_id, TaskCategory::Warmup, None).await?;
                if record.succeeded() {
                    ctx.log(LogLevel::Info, "warmup finished").await;
                    ctx.transition_to(JobState::Done).await;
                } else {
                    let desc = record
                        .fail_desc
                        .unwrap_or_else(|| "no failure description".to_string());
                    if ctx.consume_retry(JobState::StartWarmup).await?.is_some() {
                        ctx.transition_to(JobState::StartWarmup).await;
                    } else {
                        return Err(WorkflowError::fatal(format!("warmup task failed: {desc}")));
                    }
                }
            }
            _ => return Ok(StateOutcome::Unhandled),
        }
        Ok(StateOutcome::Handled)
    }
}
