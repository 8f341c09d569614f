use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Account, WorkflowType};

fn default_concurrency() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_secs() -> u64 {
    2
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_timeout_secs() -> u64 {
    300
}

/// Tuning for the warmup protocol. Both knobs are optional; the provider
/// falls back to its own defaults when they are absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupTuning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos_to_browse: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_keyword: Option<String>,
}

/// Immutable run configuration. Frozen when the orchestrator accepts a start
/// request; executors only ever see it behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    pub api_token: String,
    pub group_name: String,
    pub accounts: Vec<Account>,
    pub app_version_id: String,

    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,
    /// Retry budget per retryable state.
    #[serde(default = "default_max_retries")]
    pub max_retries_per_stage: u32,
    /// Retry n sleeps base_backoff_secs * 2^(n-1) seconds.
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Poll budget for everything except publish tasks, which have their own.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    pub workflow_type: WorkflowType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_login_flow_id: Option<String>,
    /// Parameter keys the custom login flow expects, in declaration order:
    /// first key receives the username, second the password.
    #[serde(default)]
    pub custom_login_flow_params: Vec<String>,
    /// Task-flow ids for setup steps, keyed by step name.
    #[serde(default)]
    pub setup_flow_ids: HashMap<String, String>,
    /// Step order for the custom strategy; canonical setup order when empty.
    #[serde(default)]
    pub custom_task_order: Vec<String>,
    #[serde(default)]
    pub warmup: WarmupTuning,
}

impl WorkflowConfig {
    pub fn new(
        api_token: impl Into<String>,
        group_name: impl Into<String>,
        accounts: Vec<Account>,
        app_version_id: impl Into<String>,
        workflow_type: WorkflowType,
    ) -> Self {
        Self {
            api_token: api_token.into(),
            group_name: group_name.into(),
            accounts,
            app_version_id: app_version_id.into(),
            concurrency_limit: default_concurrency(),
            max_retries_per_stage: default_max_retries(),
            base_backoff_secs: default_base_backoff_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            workflow_type,
            custom_login_flow_id: None,
            custom_login_flow_params: Vec::new(),
            setup_flow_ids: HashMap::new(),
            custom_task_order: Vec::new(),
            warmup: WarmupTuning::default(),
        }
    }
}
