//! The profile-setup task palette shared by the setup and custom strategies.
//! Every step runs as a provider custom task: flow id from the run config,
//! parameters from the account's setup payload.

use std::collections::HashMap;

use drover_client::TaskRecord;
use drover_types::{
    Account, JobState, LogLevel, PhoneJob, PostKind, SetupStep, WorkflowConfig,
};

use crate::{TaskCategory, WorkflowContext, WorkflowError};

pub fn flow_id_for(config: &WorkflowConfig, step: SetupStep) -> Option<String> {
    config.setup_flow_ids.get(step.flow_key()).cloned()
}

/// A step runs only when a flow id is configured and the account carries the
/// data the step needs.
pub fn step_enabled(config: &WorkflowConfig, account: &Account, step: SetupStep) -> bool {
    flow_id_for(config, step).is_some() && step.has_data(account)
}

pub fn enabled_steps(config: &WorkflowConfig, account: &Account) -> Vec<SetupStep> {
    SetupStep::CANONICAL_ORDER
        .into_iter()
        .filter(|step| step_enabled(config, account, *step))
        .collect()
}

pub fn step_for_submit_state(state: JobState) -> Option<SetupStep> {
    SetupStep::CANONICAL_ORDER
        .into_iter()
        .find(|step| step.submit_state() == state)
}

pub fn step_for_poll_state(state: JobState) -> Option<SetupStep> {
    SetupStep::CANONICAL_ORDER
        .into_iter()
        .find(|step| step.poll_state() == state)
}

/// Submit state of the step following `completed` in `steps`, or `Done`.
pub fn next_state_after(steps: &[SetupStep], completed: SetupStep) -> JobState {
    steps
        .iter()
        .skip_while(|step| **step != completed)
        .nth(1)
        .map(|step| step.submit_state())
        .unwrap_or(JobState::Done)
}

fn post_params(post: &drover_types::PostSpec) -> HashMap<String, String> {
    HashMap::from([
        ("description".to_string(), post.description.clone()),
        ("mediaUrls".to_string(), post.media_urls.join(",")),
        (
            "mediaType".to_string(),
            match post.kind {
                PostKind::Video => "video".to_string(),
                PostKind::Image => "image".to_string(),
            },
        ),
    ])
}

/// Parameter map for the step's task flow. The data gate has already passed,
/// so missing fields here are a configuration inconsistency, not a skip.
pub fn step_params(step: SetupStep, job: &PhoneJob) -> Result<HashMap<String, String>, WorkflowError> {
    let missing =
        |field: &str| WorkflowError::fatal(format!("setup data missing {field} for {:?}", step));
    let setup = job.account.setup.as_ref();
    let params = match step {
        SetupStep::RenameUsername => {
            let username = job
                .current_username
                .clone()
                .or_else(|| setup.and_then(|s| s.new_username.clone()))
                .ok_or_else(|| missing("new_username"))?;
            HashMap::from([("username".to_string(), username)])
        }
        SetupStep::EditDisplayName => {
            let name = setup
                .and_then(|s| s.new_display_name.clone())
                .ok_or_else(|| missing("new_display_name"))?;
            HashMap::from([("displayName".to_string(), name)])
        }
        SetupStep::SetProfilePicture => {
            let url = setup
                .and_then(|s| s.profile_picture_url.clone())
                .ok_or_else(|| missing("profile_picture_url"))?;
            HashMap::from([("imageUrl".to_string(), url)])
        }
        SetupStep::EditBio => {
            let bio = setup
                .and_then(|s| s.bio.clone())
                .ok_or_else(|| missing("bio"))?;
            HashMap::from([("bio".to_string(), bio)])
        }
        SetupStep::Post1 | SetupStep::Post2 => {
            let index = usize::from(step == SetupStep::Post2);
            let post = setup
                .and_then(|s| s.posts.get(index))
                .ok_or_else(|| missing("post"))?;
            post_params(post)
        }
        SetupStep::Highlight => {
            let title = setup
                .and_then(|s| s.highlight_title.clone())
                .ok_or_else(|| missing("highlight_title"))?;
            let mut params = HashMap::from([("title".to_string(), title)]);
            if let Some(cover) = setup.and_then(|s| s.highlight_cover_url.clone()) {
                params.insert("coverUrl".to_string(), cover);
            }
            params
        }
        SetupStep::SetPrivate | SetupStep::Enable2fa => HashMap::new(),
    };
    Ok(params)
}

pub async fn submit_step(ctx: &WorkflowContext, step: SetupStep) -> Result<(), WorkflowError> {
    let flow_id = flow_id_for(&ctx.config, step).ok_or_else(|| {
        WorkflowError::fatal(format!("no task flow configured for {}", step.flow_key()))
    })?;
    let params = step_params(step, &ctx.job().await?)?;

    if step == SetupStep::RenameUsername {
        if let Some(username) = params.get("username").cloned() {
            ctx.update_job(|job| {
                job.attempted_usernames.insert(username.clone());
                job.current_username = Some(username);
            })
            .await;
        }
    }

    let client = ctx.client.clone();
    let env_id = ctx.env_id.clone();
    let task_id = ctx
        .with_retry(step.submit_state(), || {
            let client = client.clone();
            let env_id = env_id.clone();
            let flow_id = flow_id.clone();
            let params = params.clone();
            async move {
                client
                    .create_custom_task(&env_id, &flow_id, &params)
                    .await
                    .map_err(WorkflowError::from)
            }
        })
        .await?;
    ctx.record_task_id(step.flow_key(), &task_id).await;
    ctx.log(
        LogLevel::Info,
        format!("{} task {task_id} submitted", step.flow_key()),
    )
    .await;
    ctx.transition_to(step.poll_state()).await;
    Ok(())
}

pub async fn poll_step_record(
    ctx: &WorkflowContext,
    step: SetupStep,
) -> Result<TaskRecord, WorkflowError> {
    let task_id = ctx.task_id(step.flow_key()).await?;
    ctx.poll_task(&task_id, TaskCategory::Setup, None).await
}

/// Standard completion handling for a polled step: advance on success, retry
/// the submit against the budget on failure.
pub async fn finish_step(
    ctx: &WorkflowContext,
    steps: &[SetupStep],
    step: SetupStep,
    record: &TaskRecord,
) -> Result<(), WorkflowError> {
    if record.succeeded() {
        ctx.log(LogLevel::Info, format!("{} completed", step.flow_key()))
            .await;
        ctx.transition_to(next_state_after(steps, step)).await;
        return Ok(());
    }
    let desc = record
        .fail_desc
        .clone()
        .unwrap_or_else(|| "no failure description".to_string());
    if ctx.consume_retry(step.submit_state()).await?.is_some() {
        ctx.transition_to(step.submit_state()).await;
        Ok(())
    } else {
        Err(WorkflowError::fatal(format!(
            "{} task failed: {desc}",
            step.flow_key()
        )))
    }
}
