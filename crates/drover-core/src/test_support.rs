//! Scripted provider double and context builders shared by the core tests.
//! Every endpoint answers success by default; tests enqueue deviations.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use drover_client::{
    phone_status, task_status, GroupInfo, InstalledApp, MarketplaceApp, Paged, PhoneInfo,
    PhoneStatusInfo, PublishRequest, RpaApi, RpaError, ScreenshotResult, TaskFlow, TaskRecord,
    WarmupParams,
};
use drover_types::{Account, PhoneJob, WorkflowConfig, WorkflowType};

use crate::strategy::{strategy_for, Strategy};
use crate::{EventBus, WorkflowContext, WorkflowStore};

pub const TEST_APP_VERSION: &str = "app-1";

type Script<T> = Mutex<VecDeque<T>>;

fn pop<T>(script: &Script<T>) -> Option<T> {
    script.lock().unwrap().pop_front()
}

pub struct ScriptedApi {
    pub phones: Vec<PhoneInfo>,
    pub start_phones: Script<Result<(), RpaError>>,
    pub restart_phones: Script<Result<(), RpaError>>,
    pub statuses: Script<i64>,
    /// Status served once the queue runs dry.
    pub status_default: i64,
    pub install: Script<Result<(), RpaError>>,
    pub installed_lists: Script<Vec<InstalledApp>>,
    pub login: Script<Result<String, RpaError>>,
    pub warmup: Script<Result<String, RpaError>>,
    pub publish: Script<Result<String, RpaError>>,
    pub custom_tasks: Script<Result<String, RpaError>>,
    /// Per-task-id record queues; a missing or drained queue answers
    /// completed.
    pub task_records: Mutex<HashMap<String, VecDeque<TaskRecord>>>,
    /// Media URLs mapped to their HEAD verdict; unlisted URLs are reachable.
    pub media: Mutex<HashMap<String, bool>>,
    pub calls: Mutex<Vec<String>>,
    pub custom_task_log: Mutex<Vec<(String, HashMap<String, String>)>>,
    counter: AtomicUsize,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self {
            phones: vec![phone("E1", "P1")],
            start_phones: Mutex::new(VecDeque::new()),
            restart_phones: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            status_default: phone_status::STARTED,
            install: Mutex::new(VecDeque::new()),
            installed_lists: Mutex::new(VecDeque::new()),
            login: Mutex::new(VecDeque::new()),
            warmup: Mutex::new(VecDeque::new()),
            publish: Mutex::new(VecDeque::new()),
            custom_tasks: Mutex::new(VecDeque::new()),
            task_records: Mutex::new(HashMap::new()),
            media: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            custom_task_log: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }
}

impl ScriptedApi {
    pub fn with_phones(phones: Vec<PhoneInfo>) -> Self {
        Self {
            phones,
            ..Self::default()
        }
    }

    pub fn record_call(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    pub fn script_task(&self, task_id: &str, records: Vec<TaskRecord>) {
        self.task_records
            .lock()
            .unwrap()
            .insert(task_id.to_string(), records.into());
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }

    fn task_record_for(&self, task_id: &str) -> TaskRecord {
        let mut records = self.task_records.lock().unwrap();
        records
            .get_mut(task_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| completed(task_id))
    }
}

pub fn phone(id: &str, name: &str) -> PhoneInfo {
    PhoneInfo {
        id: id.to_string(),
        name: name.to_string(),
        group_name: None,
    }
}

pub fn completed(task_id: &str) -> TaskRecord {
    TaskRecord {
        id: task_id.to_string(),
        status: task_status::COMPLETED,
        fail_code: None,
        fail_desc: None,
    }
}

pub fn in_progress(task_id: &str) -> TaskRecord {
    TaskRecord {
        id: task_id.to_string(),
        status: task_status::IN_PROGRESS,
        fail_code: None,
        fail_desc: None,
    }
}

pub fn failed(task_id: &str, desc: &str) -> TaskRecord {
    TaskRecord {
        id: task_id.to_string(),
        status: task_status::FAILED,
        fail_code: Some(1),
        fail_desc: Some(desc.to_string()),
    }
}

#[async_trait]
impl RpaApi for ScriptedApi {
    async fn list_phones(
        &self,
        _group_name: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Paged<PhoneInfo>, RpaError> {
        self.record_call("list_phones");
        let items = if page == 1 { self.phones.clone() } else { Vec::new() };
        Ok(Paged {
            items,
            total: self.phones.len() as u64,
            page,
            page_size,
        })
    }

    async fn start_phones(&self, _env_ids: &[String]) -> Result<(), RpaError> {
        self.record_call("start_phones");
        pop(&self.start_phones).unwrap_or(Ok(()))
    }

    async fn stop_phones(&self, _env_ids: &[String]) -> Result<(), RpaError> {
        self.record_call("stop_phones");
        Ok(())
    }

    async fn restart_phones(&self, _env_ids: &[String]) -> Result<(), RpaError> {
        self.record_call("restart_phones");
        pop(&self.restart_phones).unwrap_or(Ok(()))
    }

    async fn get_phone_status(&self, env_id: &str) -> Result<PhoneStatusInfo, RpaError> {
        self.record_call("get_phone_status");
        Ok(PhoneStatusInfo {
            id: env_id.to_string(),
            status: pop(&self.statuses).unwrap_or(self.status_default),
        })
    }

    async fn install_app(&self, _env_ids: &[String], _app: &str) -> Result<(), RpaError> {
        self.record_call("install_app");
        pop(&self.install).unwrap_or(Ok(()))
    }

    async fn uninstall_app(&self, _env_ids: &[String], _app: &str) -> Result<(), RpaError> {
        self.record_call("uninstall_app");
        Ok(())
    }

    async fn list_installed_apps(&self, _env_id: &str) -> Result<Vec<InstalledApp>, RpaError> {
        self.record_call("list_installed_apps");
        Ok(pop(&self.installed_lists).unwrap_or_else(|| {
            vec![InstalledApp {
                app_version_id: Some(TEST_APP_VERSION.to_string()),
                package_name: Some(crate::strategy::IG_PACKAGE_NAME.to_string()),
                app_name: None,
            }]
        }))
    }

    async fn start_app(&self, _env_id: &str, _package: &str) -> Result<(), RpaError> {
        self.record_call("start_app");
        Ok(())
    }

    async fn instagram_login(
        &self,
        _env_id: &str,
        _username: &str,
        _password: &str,
    ) -> Result<String, RpaError> {
        self.record_call("instagram_login");
        pop(&self.login).unwrap_or_else(|| Ok(self.next_id("t-login")))
    }

    async fn instagram_warmup(
        &self,
        _env_id: &str,
        _params: &WarmupParams,
    ) -> Result<String, RpaError> {
        self.record_call("instagram_warmup");
        pop(&self.warmup).unwrap_or_else(|| Ok(self.next_id("t-warmup")))
    }

    async fn instagram_publish_reels_video(
        &self,
        _env_id: &str,
        _post: &PublishRequest,
    ) -> Result<String, RpaError> {
        self.record_call("instagram_publish_reels_video");
        pop(&self.publish).unwrap_or_else(|| Ok(self.next_id("t-publish")))
    }

    async fn instagram_publish_reels_images(
        &self,
        _env_id: &str,
        _post: &PublishRequest,
    ) -> Result<String, RpaError> {
        self.record_call("instagram_publish_reels_images");
        pop(&self.publish).unwrap_or_else(|| Ok(self.next_id("t-publish")))
    }

    async fn reddit_warmup(
        &self,
        _env_id: &str,
        _params: &WarmupParams,
    ) -> Result<String, RpaError> {
        self.record_call("reddit_warmup");
        pop(&self.warmup).unwrap_or_else(|| Ok(self.next_id("t-warmup")))
    }

    async fn reddit_publish_image(
        &self,
        _env_id: &str,
        _post: &PublishRequest,
    ) -> Result<String, RpaError> {
        self.record_call("reddit_publish_image");
        pop(&self.publish).unwrap_or_else(|| Ok(self.next_id("t-publish")))
    }

    async fn reddit_publish_video(
        &self,
        _env_id: &str,
        _post: &PublishRequest,
    ) -> Result<String, RpaError> {
        self.record_call("reddit_publish_video");
        pop(&self.publish).unwrap_or_else(|| Ok(self.next_id("t-publish")))
    }

    async fn create_custom_task(
        &self,
        _env_id: &str,
        flow_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<String, RpaError> {
        self.record_call("create_custom_task");
        self.custom_task_log
            .lock()
            .unwrap()
            .push((flow_id.to_string(), params.clone()));
        pop(&self.custom_tasks).unwrap_or_else(|| Ok(self.next_id("t-custom")))
    }

    async fn query_task(&self, task_id: &str) -> Result<TaskRecord, RpaError> {
        self.record_call("query_task");
        Ok(self.task_record_for(task_id))
    }

    async fn query_tasks(&self, task_ids: &[String]) -> Result<Vec<TaskRecord>, RpaError> {
        self.record_call("query_tasks");
        Ok(task_ids.iter().map(|id| self.task_record_for(id)).collect())
    }

    async fn request_screenshot(&self, _env_id: &str) -> Result<String, RpaError> {
        self.record_call("request_screenshot");
        Ok(self.next_id("t-shot"))
    }

    async fn get_screenshot_result(&self, ticket_id: &str) -> Result<ScreenshotResult, RpaError> {
        self.record_call("get_screenshot_result");
        Ok(ScreenshotResult {
            status: task_status::COMPLETED,
            download_link: Some(format!("https://shots.invalid/{ticket_id}.png")),
        })
    }

    async fn list_marketplace_apps(
        &self,
        _query: Option<&str>,
    ) -> Result<Vec<MarketplaceApp>, RpaError> {
        self.record_call("list_marketplace_apps");
        Ok(Vec::new())
    }

    async fn list_task_flows(&self) -> Result<Vec<TaskFlow>, RpaError> {
        self.record_call("list_task_flows");
        Ok(Vec::new())
    }

    async fn list_groups(&self) -> Result<Vec<GroupInfo>, RpaError> {
        self.record_call("list_groups");
        Ok(Vec::new())
    }

    async fn check_media_url(&self, url: &str) -> Result<bool, RpaError> {
        self.record_call("check_media_url");
        Ok(self.media.lock().unwrap().get(url).copied().unwrap_or(true))
    }
}

/// Fast-running config: zero backoff and poll period so tests never sleep.
pub fn test_config(workflow_type: WorkflowType, accounts: Vec<Account>) -> WorkflowConfig {
    let mut config = WorkflowConfig::new("token", "group", accounts, TEST_APP_VERSION, workflow_type);
    config.concurrency_limit = 2;
    config.max_retries_per_stage = 3;
    config.base_backoff_secs = 0;
    config.poll_interval_secs = 0;
    config.poll_timeout_secs = 60;
    config
}

/// Store with one seeded job plus the context and strategy to drive it.
pub async fn ctx_with_job(
    api: Arc<ScriptedApi>,
    config: WorkflowConfig,
) -> (WorkflowContext, Arc<dyn Strategy>) {
    let config = Arc::new(config);
    let strategy = strategy_for(&config);
    let store = WorkflowStore::new(EventBus::new());
    let account = config
        .accounts
        .first()
        .cloned()
        .unwrap_or_else(|| Account::new("a", "b"));
    store
        .insert_job(PhoneJob::new("E1", "P1", account, strategy.total_steps()))
        .await;
    let ctx = WorkflowContext {
        client: api,
        config,
        store,
        env_id: "E1".to_string(),
        phone_name: "P1".to_string(),
        cancel: CancellationToken::new(),
    };
    (ctx, strategy)
}
