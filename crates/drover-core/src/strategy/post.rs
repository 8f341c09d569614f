use std::time::Duration;

use async_trait::async_trait;

use drover_client::PublishRequest;
use drover_types::{JobState, LogLevel, PhoneJob, PostKind, PostSpec};

use crate::strategy::{with_core, StateOutcome, Strategy, CORE_STEPS, IG_PACKAGE_NAME};
use crate::{TaskCategory, WorkflowContext, WorkflowError};

/// Settle time after foregrounding the app before the first publish.
const APP_LAUNCH_DELAY: Duration = Duration::from_secs(3);

pub struct PostStrategy;

impl PostStrategy {
    fn submit_state(index: usize) -> JobState {
        if index == 0 {
            JobState::PublishPost1
        } else {
            JobState::PublishPost2
        }
    }

    fn stage(index: usize) -> &'static str {
        if index == 0 {
            "post1"
        } else {
            "post2"
        }
    }

    async fn publish(&self, ctx: &WorkflowContext, index: usize) -> Result<(), WorkflowError> {
        let job = ctx.job().await?;
        let Some(post) = job.account.posts.get(index).cloned() else {
            ctx.transition_to(JobState::Done).await;
            return Ok(());
        };

        if index == 0 {
            let client = ctx.client.clone();
            let env_id = ctx.env_id.clone();
            ctx.with_retry(JobState::PublishPost1, || {
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
            ctx.sleep_with_abort(APP_LAUNCH_DELAY).await?;
        }

        validate_media(ctx, &post).await?;

        let request = PublishRequest {
            description: post.description.clone(),
            media_urls: post.media_urls.clone(),
            schedule_at: None,
        };
        let client = ctx.client.clone();
        let env_id = ctx.env_id.clone();
        let kind = post.kind;
        let task_id = ctx
            .with_retry(Self::submit_state(index), || {
                let client = client.clone();
                let env_id = env_id.clone();
                let request = request.clone();
                async move {
                    let result = match kind {
                        PostKind::Video => {
                            client.instagram_publish_reels_video(&env_id, &request).await
                        }
                        PostKind::Image => {
                            client
                                .instagram_publish_reels_images(&env_id, &request)
                                .await
                        }
                    };
                    result.map_err(WorkflowError::from)
                }
            })
            .await?;
        ctx.record_task_id(Self::stage(index), &task_id).await;
        ctx.log(
            LogLevel::Info,
            format!("publish task {task_id} submitted for post {}", index + 1),
        )
        .await;
        ctx.transition_to(if index == 0 {
            JobState::PollPost1
        } else {
            JobState::PollPost2
        })
        .await;
        Ok(())
    }

    async fn poll_publish(&self, ctx: &WorkflowContext, index: usize) -> Result<(), WorkflowError> {
        let task_id = ctx.task_id(Self::stage(index)).await?;
        let record = ctx.poll_task(&task_id, TaskCategory::Publish, None).await?;
        if record.succeeded() {
            let job = ctx.job().await?;
            let next = if index == 0 && job.account.posts.len() > 1 {
                JobState::PublishPost2
            } else {
                JobState::Done
            };
            ctx.log(LogLevel::Info, format!("post {} published", index + 1))
                .await;
            ctx.transition_to(next).await;
            Ok(())
        } else {
            let desc = record
                .fail_desc
                .unwrap_or_else(|| "no failure description".to_string());
            if ctx.consume_retry(Self::submit_state(index)).await?.is_some() {
                ctx.transition_to(Self::submit_state(index)).await;
                Ok(())
            } else {
                Err(WorkflowError::fatal(format!(
                    "publish task for post {} failed: {desc}",
                    index + 1
                )))
            }
        }
    }
}

/// Fail fast before spending a publish task on dead links. A URL counts as
/// unreachable when HEAD errors or answers outside 2xx.
async fn validate_media(ctx: &WorkflowContext, post: &PostSpec) -> Result<(), WorkflowError> {
    let mut unreachable = Vec::new();
    for url in &post.media_urls {
        match ctx.client.check_media_url(url).await {
            Ok(true) => {}
            Ok(false) => unreachable.push(url.clone()),
            Err(err) => {
                ctx.log(
                    LogLevel::Warn,
                    format!("media preflight for {url} errored: {err}"),
                )
                .await;
                unreachable.push(url.clone());
            }
        }
    }
    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::MediaUnreachable(unreachable.join(", ")))
    }
}

#[async_trait]
impl Strategy for PostStrategy {
    fn post_login_state(&self, job: &PhoneJob) -> JobState {
        if job.account.posts.is_empty() {
            JobState::Done
        } else {
            JobState::PublishPost1
        }
    }

    fn retryable_states(&self) -> Vec<JobState> {
        with_core(&[JobState::PublishPost1, JobState::PublishPost2])
    }

    fn total_steps(&self) -> u32 {
        CORE_STEPS + 4
    }

    async fn run_state(
        &self,
        state: JobState,
        ctx: &WorkflowContext,
    ) -> Result<StateOutcome, WorkflowError> {
        match state {
            JobState::PublishPost1 => self.publish(ctx, 0).await?,
            JobState::PollPost1 => self.poll_publish(ctx, 0).await?,
            JobState::PublishPost2 => self.publish(ctx, 1).await?,
            JobState::PollPost2 => self.poll_publish(ctx, 1).await?,
            _ => return Ok(StateOutcome::Unhandled),
        }
        Ok(StateOutcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::run_job;
    use crate::test_support::*;
    use drover_types::{Account, WorkflowType};
    use std::sync::Arc;

    fn post_account(posts: Vec<PostSpec>) -> Account {
        Account {
            username: "u".to_string(),
            password: "p".to_string(),
            posts,
            setup: None,
        }
    }

    fn video_post(urls: &[&str]) -> PostSpec {
        PostSpec {
            kind: PostKind::Video,
            description: "a reel".to_string(),
            media_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn unreachable_media_fails_before_any_publish() {
        let api = Arc::new(ScriptedApi::default());
        api.media
            .lock()
            .unwrap()
            .insert("https://x/missing.mp4".to_string(), false);

        let account = post_account(vec![video_post(&[
            "https://x/ok.mp4",
            "https://x/missing.mp4",
        ])]);
        let config = test_config(WorkflowType::Post, vec![account]);
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        let error = job.error.as_deref().unwrap();
        assert!(error.contains("https://x/missing.mp4"));
        assert!(!error.contains("https://x/ok.mp4,"));
        assert_eq!(api.call_count("instagram_publish_reels_video"), 0);
        assert_eq!(api.call_count("instagram_publish_reels_images"), 0);
    }

    #[tokio::test]
    async fn two_posts_publish_in_order() {
        let api = Arc::new(ScriptedApi::default());
        let account = post_account(vec![
            video_post(&["https://x/a.mp4"]),
            PostSpec {
                kind: PostKind::Image,
                description: "a carousel".to_string(),
                media_urls: vec!["https://x/b.jpg".to_string()],
            },
        ]);
        let config = test_config(WorkflowType::Post, vec![account]);
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(api.call_count("instagram_publish_reels_video"), 1);
        assert_eq!(api.call_count("instagram_publish_reels_images"), 1);
        // Foregrounded once before the first publish.
        assert_eq!(api.call_count("start_app"), 1);
        assert!(job.task_ids.contains_key("post1"));
        assert!(job.task_ids.contains_key("post2"));
    }

    #[tokio::test]
    async fn single_post_finishes_after_first_poll() {
        let api = Arc::new(ScriptedApi::default());
        let account = post_account(vec![video_post(&["https://x/a.mp4"])]);
        let config = test_config(WorkflowType::Post, vec![account]);
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(api.call_count("instagram_publish_reels_video"), 1);
        assert!(!job.task_ids.contains_key("post2"));
    }

    #[tokio::test]
    async fn failed_publish_task_resubmits_against_the_budget() {
        let api = Arc::new(ScriptedApi::default());
        api.publish.lock().unwrap().extend([
            Ok("t-p1".to_string()),
            Ok("t-p2".to_string()),
        ]);
        api.script_task("t-p1", vec![failed("t-p1", "upload interrupted")]);

        let account = post_account(vec![video_post(&["https://x/a.mp4"])]);
        let config = test_config(WorkflowType::Post, vec![account]);
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.attempts_for(JobState::PublishPost1), 1);
        assert_eq!(api.call_count("instagram_publish_reels_video"), 2);
    }
}
