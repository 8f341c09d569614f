//! Per-job state machine loop: resolves the handler for the current state
//! (strategy first, core chain as fallback), enforces the retry budget, and
//! translates errors into terminal job states.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use drover_client::phone_status;
use drover_types::{JobState, LogLevel};

use crate::strategy::{StateOutcome, Strategy, IG_PACKAGE_NAME};
use crate::{TaskCategory, WorkflowContext, WorkflowError};

/// Drives one job to a terminal state. Never panics or escapes errors: every
/// failure path lands in `state = Failed` with a human-readable reason.
pub async fn run_job(ctx: WorkflowContext, strategy: std::sync::Arc<dyn Strategy>) {
    loop {
        if ctx.cancel.is_cancelled() {
            ctx.transition_to_failed("cancelled").await;
            return;
        }
        let Ok(job) = ctx.job().await else {
            // Store was cleared out from under the run; nothing left to drive.
            return;
        };
        let state = job.state;
        if state.is_terminal() {
            return;
        }

        let result = match strategy.run_state(state, &ctx).await {
            Ok(StateOutcome::Handled) => Ok(()),
            Ok(StateOutcome::Unhandled) => run_core_state(state, &ctx, strategy.as_ref()).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                let Ok(after) = ctx.job().await else { return };
                // A handler that completes without choosing a successor still
                // counts as one step of progress; the loop re-runs the state.
                if after.state == state {
                    ctx.update_job(|job| {
                        if job.current_step < job.total_steps {
                            job.current_step += 1;
                        }
                    })
                    .await;
                }
            }
            Err(err) => {
                if !handle_state_error(&ctx, strategy.as_ref(), state, err).await {
                    return;
                }
            }
        }
    }
}

/// Decides what a handler error means for the job. Returns `false` once the
/// job has reached a terminal verdict.
async fn handle_state_error(
    ctx: &WorkflowContext,
    strategy: &dyn Strategy,
    state: JobState,
    err: WorkflowError,
) -> bool {
    if err.is_cancelled() || ctx.cancel.is_cancelled() {
        ctx.transition_to_failed("cancelled").await;
        return false;
    }

    // A phone that stopped mid-flow gets restarted and the originating state
    // re-entered without touching the retry budget.
    if err.is_phone_not_running()
        && !matches!(
            state,
            JobState::StartEnv | JobState::RestartEnv | JobState::ConfirmEnvRunning
        )
    {
        ctx.log(
            LogLevel::Warn,
            format!("phone stopped mid-flow in {state:?}, restarting it"),
        )
        .await;
        ctx.update_job(|job| job.resume_state = Some(state)).await;
        ctx.transition_to(JobState::RestartEnv).await;
        return true;
    }

    let state_retryable = strategy.retryable_states().contains(&state);
    if err.retries_anywhere() || (err.is_retryable() && state_retryable) {
        match ctx.consume_retry(state).await {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(_) => {
                ctx.transition_to_failed("cancelled").await;
                return false;
            }
        }
    }
    ctx.transition_to_failed(err.to_string()).await;
    false
}

/// The pre-login chain shared by every strategy.
pub(crate) async fn run_core_state(
    state: JobState,
    ctx: &WorkflowContext,
    strategy: &dyn Strategy,
) -> Result<(), WorkflowError> {
    match state {
        JobState::Init => {
            ctx.update_job(|job| job.started_at = Some(Utc::now())).await;
            let job = ctx.job().await?;
            ctx.log(
                LogLevel::Info,
                format!(
                    "starting {:?} workflow for @{}",
                    ctx.config.workflow_type, job.account.username
                ),
            )
            .await;
            ctx.transition_to(JobState::StartEnv).await;
            Ok(())
        }
        JobState::StartEnv => {
            let client = ctx.client.clone();
            let env_ids = vec![ctx.env_id.clone()];
            ctx.with_retry(JobState::StartEnv, || {
                let client = client.clone();
                let env_ids = env_ids.clone();
                async move { client.start_phones(&env_ids).await.map_err(WorkflowError::from) }
            })
            .await?;
            ctx.transition_to(JobState::ConfirmEnvRunning).await;
            Ok(())
        }
        JobState::RestartEnv => {
            let client = ctx.client.clone();
            let env_ids = vec![ctx.env_id.clone()];
            ctx.with_retry(JobState::RestartEnv, || {
                let client = client.clone();
                let env_ids = env_ids.clone();
                async move {
                    client
                        .restart_phones(&env_ids)
                        .await
                        .map_err(WorkflowError::from)
                }
            })
            .await?;
            ctx.transition_to(JobState::ConfirmEnvRunning).await;
            Ok(())
        }
        JobState::ConfirmEnvRunning => {
            wait_for_phone_running(ctx).await?;
            let mut resume = None;
            ctx.update_job(|job| resume = job.resume_state.take()).await;
            let next = resume.unwrap_or(JobState::InstallApp);
            ctx.transition_to(next).await;
            Ok(())
        }
        JobState::InstallApp => {
            let client = ctx.client.clone();
            let env_ids = vec![ctx.env_id.clone()];
            let app_version_id = ctx.config.app_version_id.clone();
            ctx.with_retry(JobState::InstallApp, || {
                let client = client.clone();
                let env_ids = env_ids.clone();
                let app_version_id = app_version_id.clone();
                async move {
                    match client.install_app(&env_ids, &app_version_id).await {
                        Ok(()) => Ok(()),
                        // A higher installed version satisfies the install step.
                        Err(err)
                            if err.code() == Some(drover_client::code::HIGHER_VERSION_INSTALLED) =>
                        {
                            Ok(())
                        }
                        Err(err) => Err(WorkflowError::from(err)),
                    }
                }
            })
            .await?;
            ctx.transition_to(JobState::ConfirmAppInstalled).await;
            Ok(())
        }
        JobState::ConfirmAppInstalled => {
            wait_for_app_installed(ctx).await?;
            let next = if strategy.requires_login() {
                JobState::Login
            } else {
                let job = ctx.job().await?;
                strategy.post_login_state(&job)
            };
            ctx.transition_to(next).await;
            Ok(())
        }
        JobState::Login => {
            let job = ctx.job().await?;
            let client = ctx.client.clone();
            let env_id = ctx.env_id.clone();
            let task_id = if let Some(flow_id) = ctx.config.custom_login_flow_id.clone() {
                let params = login_flow_params(
                    &ctx.config.custom_login_flow_params,
                    &job.account.username,
                    &job.account.password,
                );
                ctx.with_retry(JobState::Login, || {
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
                .await?
            } else {
                let username = job.account.username.clone();
                let password = job.account.password.clone();
                ctx.with_retry(JobState::Login, || {
                    let client = client.clone();
                    let env_id = env_id.clone();
                    let username = username.clone();
                    let password = password.clone();
                    async move {
                        client
                            .instagram_login(&env_id, &username, &password)
                            .await
                            .map_err(WorkflowError::from)
                    }
                })
                .await?
            };
            ctx.record_task_id("login", &task_id).await;
            ctx.log(LogLevel::Info, format!("login task {task_id} submitted"))
                .await;
            ctx.transition_to(JobState::PollLoginTask).await;
            Ok(())
        }
        JobState::PollLoginTask => {
            let task_id = ctx.task_id("login").await?;
            let record = ctx.poll_task(&task_id, TaskCategory::Login, None).await?;
            if record.succeeded() {
                ctx.take_screenshot("post-login").await;
                let job = ctx.job().await?;
                ctx.transition_to(strategy.post_login_state(&job)).await;
                Ok(())
            } else {
                let desc = record
                    .fail_desc
                    .unwrap_or_else(|| "no failure description".to_string());
                if ctx.consume_retry(JobState::Login).await?.is_some() {
                    ctx.transition_to(JobState::Login).await;
                    Ok(())
                } else {
                    Err(WorkflowError::fatal(format!("login failed: {desc}")))
                }
            }
        }
        other => Err(WorkflowError::fatal(format!(
            "no handler for state {other:?}"
        ))),
    }
}

/// Custom login flows map their declared parameter keys positionally:
/// first key takes the username, second the password.
fn login_flow_params(
    keys: &[String],
    username: &str,
    password: &str,
) -> HashMap<String, String> {
    let mut params = HashMap::new();
    match keys {
        [] => {
            params.insert("username".to_string(), username.to_string());
            params.insert("password".to_string(), password.to_string());
        }
        [user_key, rest @ ..] => {
            params.insert(user_key.clone(), username.to_string());
            if let Some(pass_key) = rest.first() {
                params.insert(pass_key.clone(), password.to_string());
            }
        }
    }
    params
}

/// Polls phone status until STARTED, for at most the configured poll
/// timeout. A phone stuck in SHUT_DOWN or EXPIRED for the whole window fails
/// the job.
async fn wait_for_phone_running(ctx: &WorkflowContext) -> Result<(), WorkflowError> {
    let budget = ctx.config.poll_timeout_secs;
    let period = Duration::from_secs(ctx.config.poll_interval_secs);
    let started = Instant::now();
    loop {
        ctx.check_cancelled()?;
        match ctx.client.get_phone_status(&ctx.env_id).await {
            Ok(info) if info.status == phone_status::STARTED => return Ok(()),
            Ok(info) => {
                ctx.log(
                    LogLevel::Debug,
                    format!("phone not up yet (status {})", info.status),
                )
                .await;
            }
            Err(err) if err.is_retryable() => {
                ctx.log(
                    LogLevel::Debug,
                    format!("phone status query failed transiently: {err}"),
                )
                .await;
            }
            Err(err) => return Err(err.into()),
        }
        if started.elapsed().as_secs() >= budget {
            return Err(WorkflowError::fatal(format!(
                "phone did not start within {budget}s"
            )));
        }
        ctx.sleep_with_abort(period).await?;
    }
}

/// Polls the installed-app list until the target build (or its package) shows
/// up, for at most the configured poll timeout.
async fn wait_for_app_installed(ctx: &WorkflowContext) -> Result<(), WorkflowError> {
    let budget = ctx.config.poll_timeout_secs;
    let period = Duration::from_secs(ctx.config.poll_interval_secs);
    let started = Instant::now();
    loop {
        ctx.check_cancelled()?;
        match ctx.client.list_installed_apps(&ctx.env_id).await {
            Ok(apps) => {
                let present = apps.iter().any(|app| {
                    app.app_version_id.as_deref() == Some(ctx.config.app_version_id.as_str())
                        || app.package_name.as_deref() == Some(IG_PACKAGE_NAME)
                });
                if present {
                    return Ok(());
                }
            }
            Err(err) if err.is_retryable() => {
                ctx.log(
                    LogLevel::Debug,
                    format!("installed-apps query failed transiently: {err}"),
                )
                .await;
            }
            Err(err) => return Err(err.into()),
        }
        if started.elapsed().as_secs() >= budget {
            return Err(WorkflowError::PollTimeout {
                what: format!("install of {}", ctx.config.app_version_id),
                elapsed_secs: budget,
            });
        }
        ctx.sleep_with_abort(period).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use drover_client::{code, RpaError};
    use drover_types::{Account, WorkflowType};
    use std::sync::Arc;

    #[tokio::test]
    async fn happy_warmup_runs_to_done() {
        let api = Arc::new(ScriptedApi::default());
        api.statuses.lock().unwrap().extend([
            phone_status::STARTING,
            phone_status::STARTING,
            phone_status::STARTED,
        ]);
        // App list is empty on the first poll, present on the second.
        api.installed_lists.lock().unwrap().push_back(Vec::new());
        api.login.lock().unwrap().push_back(Ok("t1".to_string()));
        api.script_task("t1", vec![in_progress("t1"), in_progress("t1"), completed("t1")]);
        api.warmup.lock().unwrap().push_back(Ok("t2".to_string()));
        api.script_task("t2", vec![in_progress("t2"), completed("t2")]);

        let config = test_config(WorkflowType::Warmup, vec![Account::new("a", "b")]);
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert!(job.error.is_none());
        assert!(job.started_at.is_some() && job.completed_at.is_some());
        assert!(!job.task_ids.is_empty());
        let results = ctx.store.results_summary().await;
        assert_eq!((results.total, results.completed, results.failed), (1, 1, 0));
        assert_eq!(api.call_count("instagram_login"), 1);
        assert_eq!(api.call_count("instagram_warmup"), 1);
    }

    #[tokio::test]
    async fn phone_stopping_mid_flow_restarts_without_burning_budget() {
        let api = Arc::new(ScriptedApi::default());
        api.warmup
            .lock()
            .unwrap()
            .push_back(Err(RpaError::from_code(code::ENV_NOT_RUNNING, "env stopped")));

        let config = test_config(WorkflowType::Warmup, vec![Account::new("a", "b")]);
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.attempts_for(JobState::StartWarmup), 0);
        assert_eq!(api.call_count("restart_phones"), 1);
        assert_eq!(api.call_count("instagram_warmup"), 2);
    }

    #[tokio::test]
    async fn exhausted_login_retries_fail_the_job() {
        let api = Arc::new(ScriptedApi::default());
        for _ in 0..3 {
            api.login
                .lock()
                .unwrap()
                .push_back(Err(RpaError::Transport("connection reset".to_string())));
        }

        let mut config = test_config(WorkflowType::Warmup, vec![Account::new("a", "b")]);
        config.max_retries_per_stage = 2;
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(job.attempts_for(JobState::Login), 2);
        assert_eq!(api.call_count("instagram_login"), 3);
        assert_eq!(ctx.store.results_summary().await.failed, 1);
    }

    #[tokio::test]
    async fn failed_login_task_resubmits_from_login() {
        let api = Arc::new(ScriptedApi::default());
        api.login.lock().unwrap().push_back(Ok("t1".to_string()));
        api.login.lock().unwrap().push_back(Ok("t2".to_string()));
        api.script_task("t1", vec![failed("t1", "wrong password page")]);

        let config = test_config(WorkflowType::Warmup, vec![Account::new("a", "b")]);
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.attempts_for(JobState::Login), 1);
        assert_eq!(api.call_count("instagram_login"), 2);
    }

    #[tokio::test]
    async fn phone_that_never_starts_fails_with_a_reason() {
        let mut scripted = ScriptedApi::default();
        scripted.status_default = phone_status::STARTING;
        let api = Arc::new(scripted);

        let mut config = test_config(WorkflowType::Warmup, vec![Account::new("a", "b")]);
        config.poll_timeout_secs = 0;
        let (ctx, strategy) = ctx_with_job(api, config).await;
        run_job(ctx.clone(), strategy).await;

        let job = ctx.store.job("E1").await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.as_deref().unwrap().contains("did not start"));
    }

    #[tokio::test]
    async fn custom_login_flow_maps_param_keys_positionally() {
        let api = Arc::new(ScriptedApi::default());
        let mut config = test_config(WorkflowType::Warmup, vec![Account::new("sally", "hunter2")]);
        config.custom_login_flow_id = Some("flow-login".to_string());
        config.custom_login_flow_params = vec!["acct".to_string(), "secret".to_string()];
        let (ctx, strategy) = ctx_with_job(api.clone(), config).await;
        run_job(ctx.clone(), strategy).await;

        assert_eq!(ctx.store.job("E1").await.unwrap().state, JobState::Done);
        let log = api.custom_task_log.lock().unwrap();
        let (flow_id, params) = &log[0];
        assert_eq!(flow_id, "flow-login");
        assert_eq!(params.get("acct").map(String::as_str), Some("sally"));
        assert_eq!(params.get("secret").map(String::as_str), Some("hunter2"));
    }
}
