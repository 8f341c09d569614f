//! Typed client for the cloud-phone RPA provider.
//!
//! Every provider endpoint is HTTP POST with bearer auth and a JSON envelope
//! `{ code, msg, data }`; `code == 0` is success, anything else is a logical
//! failure even on HTTP 2xx. The [`RpaApi`] trait is the seam the workflow
//! core programs against, so executors can run against a scripted double.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Provider result codes
// ---------------------------------------------------------------------------

pub mod code {
    pub const OK: i64 = 0;
    pub const BAD_REQUEST: i64 = 40000;
    pub const MALFORMED: i64 = 40004;
    pub const NOT_FOUND: i64 = 40005;
    pub const RATE_LIMITED: i64 = 40007;
    pub const BALANCE_INSUFFICIENT: i64 = 41001;
    pub const ENV_NOT_FOUND: i64 = 42001;
    pub const ENV_NOT_RUNNING: i64 = 42002;
    pub const INSTALL_IN_PROGRESS: i64 = 42003;
    pub const HIGHER_VERSION_INSTALLED: i64 = 42004;
    pub const APP_NOT_INSTALLED: i64 = 42005;
    pub const APP_NOT_INSTALLED_ON_ENV: i64 = 42006;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum RpaError {
    /// Network failure or non-2xx HTTP status.
    #[error("transport error: {0}")]
    Transport(String),
    /// Provider code 40007.
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    /// Provider code 42002. Recoverable by restarting the phone.
    #[error("phone is not running: {0}")]
    PhoneNotRunning(String),
    /// Any other non-zero provider code, preserved for callers to branch on.
    #[error("provider error {code}: {msg}")]
    Provider { code: i64, msg: String },
}

impl RpaError {
    pub fn from_code(code: i64, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match code {
            code::RATE_LIMITED => RpaError::RateLimited(msg),
            code::ENV_NOT_RUNNING => RpaError::PhoneNotRunning(msg),
            other => RpaError::Provider { code: other, msg },
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            RpaError::Transport(_) => None,
            RpaError::RateLimited(_) => Some(code::RATE_LIMITED),
            RpaError::PhoneNotRunning(_) => Some(code::ENV_NOT_RUNNING),
            RpaError::Provider { code, .. } => Some(*code),
        }
    }

    /// Codes that will not succeed on resubmission no matter how often we try.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self.code(),
            Some(code::MALFORMED) | Some(code::NOT_FOUND) | Some(code::BALANCE_INSUFFICIENT)
        )
    }

    /// Transport failures and rate limiting are retryable anywhere; other
    /// provider codes only when the failing state has retry budget left.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpaError::Transport(_) | RpaError::RateLimited(_) => true,
            RpaError::PhoneNotRunning(_) => false,
            RpaError::Provider { .. } => !self.is_permanent(),
        }
    }
}

impl From<reqwest::Error> for RpaError {
    fn from(err: reqwest::Error) -> Self {
        RpaError::Transport(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

/// Phone status codes: 0 started, 1 starting, 2 shut down, 3 expired.
pub mod phone_status {
    pub const STARTED: i64 = 0;
    pub const STARTING: i64 = 1;
    pub const SHUT_DOWN: i64 = 2;
    pub const EXPIRED: i64 = 3;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneStatusInfo {
    pub id: String,
    pub status: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

/// Task status codes: 1 waiting, 2 in progress, 3 completed, 4 failed,
/// 7 cancelled.
pub mod task_status {
    pub const WAITING: i64 = 1;
    pub const IN_PROGRESS: i64 = 2;
    pub const COMPLETED: i64 = 3;
    pub const FAILED: i64 = 4;
    pub const CANCELLED: i64 = 7;

    pub fn is_terminal(status: i64) -> bool {
        matches!(status, COMPLETED | FAILED | CANCELLED)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_desc: Option<String>,
}

impl TaskRecord {
    pub fn is_terminal(&self) -> bool {
        task_status::is_terminal(self.status)
    }

    pub fn succeeded(&self) -> bool {
        self.status == task_status::COMPLETED
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotResult {
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceApp {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFlow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
}

/// Warmup protocol parameters. Absent knobs fall back to provider defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos_to_browse: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_keyword: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub description: String,
    pub media_urls: Vec<String>,
    /// Unix seconds; the provider schedules for "now" when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskHandle {
    task_id: String,
}

pub const DEFAULT_BASE_URL: &str = "https://openapi.geelark.com";

const DEFAULT_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// API seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RpaApi: Send + Sync {
    // phone lifecycle
    async fn list_phones(
        &self,
        group_name: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Paged<PhoneInfo>, RpaError>;

    /// Walks `list_phones` pages until a short page is returned.
    async fn list_all_phones(&self, group_name: Option<&str>) -> Result<Vec<PhoneInfo>, RpaError> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .list_phones(group_name, page, DEFAULT_PAGE_SIZE)
                .await?;
            let count = batch.items.len();
            all.extend(batch.items);
            if count < DEFAULT_PAGE_SIZE as usize {
                return Ok(all);
            }
            page += 1;
        }
    }

    async fn start_phones(&self, env_ids: &[String]) -> Result<(), RpaError>;
    async fn stop_phones(&self, env_ids: &[String]) -> Result<(), RpaError>;
    async fn restart_phones(&self, env_ids: &[String]) -> Result<(), RpaError>;
    async fn get_phone_status(&self, env_id: &str) -> Result<PhoneStatusInfo, RpaError>;

    // app lifecycle
    async fn install_app(&self, env_ids: &[String], app_version_id: &str) -> Result<(), RpaError>;
    async fn uninstall_app(&self, env_ids: &[String], app_version_id: &str)
        -> Result<(), RpaError>;
    async fn list_installed_apps(&self, env_id: &str) -> Result<Vec<InstalledApp>, RpaError>;
    async fn start_app(&self, env_id: &str, package_name: &str) -> Result<(), RpaError>;

    // RPA task submission; each returns the remote task id
    async fn instagram_login(
        &self,
        env_id: &str,
        username: &str,
        password: &str,
    ) -> Result<String, RpaError>;
    async fn instagram_warmup(
        &self,
        env_id: &str,
        params: &WarmupParams,
    ) -> Result<String, RpaError>;
    async fn instagram_publish_reels_video(
        &self,
        env_id: &str,
        post: &PublishRequest,
    ) -> Result<String, RpaError>;
    async fn instagram_publish_reels_images(
        &self,
        env_id: &str,
        post: &PublishRequest,
    ) -> Result<String, RpaError>;
    async fn reddit_warmup(&self, env_id: &str, params: &WarmupParams) -> Result<String, RpaError>;
    async fn reddit_publish_image(
        &self,
        env_id: &str,
        post: &PublishRequest,
    ) -> Result<String, RpaError>;
    async fn reddit_publish_video(
        &self,
        env_id: &str,
        post: &PublishRequest,
    ) -> Result<String, RpaError>;
    async fn create_custom_task(
        &self,
        env_id: &str,
        flow_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<String, RpaError>;

    // task query
    async fn query_task(&self, task_id: &str) -> Result<TaskRecord, RpaError>;
    async fn query_tasks(&self, task_ids: &[String]) -> Result<Vec<TaskRecord>, RpaError>;

    // screenshots
    async fn request_screenshot(&self, env_id: &str) -> Result<String, RpaError>;
    async fn get_screenshot_result(&self, ticket_id: &str) -> Result<ScreenshotResult, RpaError>;

    // discovery
    async fn list_marketplace_apps(&self, query: Option<&str>)
        -> Result<Vec<MarketplaceApp>, RpaError>;
    async fn list_task_flows(&self) -> Result<Vec<TaskFlow>, RpaError>;
    async fn list_groups(&self) -> Result<Vec<GroupInfo>, RpaError>;

    /// Media preflight: HEAD the URL, true when it answers 2xx.
    async fn check_media_url(&self, url: &str) -> Result<bool, RpaError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct RpaHttpClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RpaHttpClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn post_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<ApiEnvelope<T>, RpaError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        debug!(path, "rpa request");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RpaError::Transport(format!("HTTP {status} from {path}")));
        }
        let envelope: ApiEnvelope<T> = resp.json().await?;
        if envelope.code != code::OK {
            return Err(RpaError::from_code(envelope.code, envelope.msg));
        }
        Ok(envelope)
    }

    /// POST expecting a `data` payload.
    async fn post_data<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, RpaError> {
        self.post_envelope::<T>(path, body).await?.data.ok_or_else(|| {
            RpaError::Transport(format!("provider response from {path} carried no data"))
        })
    }

    /// POST where success carries no payload of interest.
    async fn post_unit(&self, path: &str, body: Value) -> Result<(), RpaError> {
        self.post_envelope::<Value>(path, body).await.map(|_| ())
    }

    async fn submit_task(&self, path: &str, body: Value) -> Result<String, RpaError> {
        let handle: TaskHandle = self.post_data(path, body).await?;
        Ok(handle.task_id)
    }
}

#[async_trait]
impl RpaApi for RpaHttpClient {
    async fn list_phones(
        &self,
        group_name: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Paged<PhoneInfo>, RpaError> {
        self.post_data(
            "/open/v1/phone/list",
            json!({ "groupName": group_name, "page": page, "pageSize": page_size }),
        )
        .await
    }

    async fn start_phones(&self, env_ids: &[String]) -> Result<(), RpaError> {
        self.post_unit("/open/v1/phone/start", json!({ "ids": env_ids }))
            .await
    }

    async fn stop_phones(&self, env_ids: &[String]) -> Result<(), RpaError> {
        self.post_unit("/open/v1/phone/stop", json!({ "ids": env_ids }))
            .await
    }

    async fn restart_phones(&self, env_ids: &[String]) -> Result<(), RpaError> {
        self.post_unit("/open/v1/phone/restart", json!({ "ids": env_ids }))
            .await
    }

    async fn get_phone_status(&self, env_id: &str) -> Result<PhoneStatusInfo, RpaError> {
        #[derive(Deserialize)]
        struct StatusPage {
            #[serde(default)]
            items: Vec<PhoneStatusInfo>,
        }
        let page: StatusPage = self
            .post_data("/open/v1/phone/status", json!({ "ids": [env_id] }))
            .await?;
        page.items
            .into_iter()
            .find(|item| item.id == env_id)
            .ok_or_else(|| {
                RpaError::from_code(code::ENV_NOT_FOUND, format!("no status row for {env_id}"))
            })
    }

    async fn install_app(&self, env_ids: &[String], app_version_id: &str) -> Result<(), RpaError> {
        self.post_unit(
            "/open/v1/app/install",
            json!({ "envIds": env_ids, "appVersionId": app_version_id }),
        )
        .await
    }

    async fn uninstall_app(
        &self,
        env_ids: &[String],
        app_version_id: &str,
    ) -> Result<(), RpaError> {
        self.post_unit(
            "/open/v1/app/uninstall",
            json!({ "envIds": env_ids, "appVersionId": app_version_id }),
        )
        .await
    }

    async fn list_installed_apps(&self, env_id: &str) -> Result<Vec<InstalledApp>, RpaError> {
        #[derive(Deserialize)]
        struct AppPage {
            #[serde(default)]
            items: Vec<InstalledApp>,
        }
        let page: AppPage = self
            .post_data("/open/v1/app/list", json!({ "envId": env_id }))
            .await?;
        Ok(page.items)
    }

    async fn start_app(&self, env_id: &str, package_name: &str) -> Result<(), RpaError> {
        self.post_unit(
            "/open/v1/app/start",
            json!({ "envId": env_id, "packageName": package_name }),
        )
        .await
    }

    async fn instagram_login(
        &self,
        env_id: &str,
        username: &str,
        password: &str,
    ) -> Result<String, RpaError> {
        self.submit_task(
            "/open/v1/rpa/instagram/login",
            json!({ "envId": env_id, "username": username, "password": password }),
        )
        .await
    }

    async fn instagram_warmup(
        &self,
        env_id: &str,
        params: &WarmupParams,
    ) -> Result<String, RpaError> {
        self.submit_task(
            "/open/v1/rpa/instagram/warmup",
            json!({
                "envId": env_id,
                "videosToBrowse": params.videos_to_browse,
                "searchKeyword": params.search_keyword,
            }),
        )
        .await
    }

    async fn instagram_publish_reels_video(
        &self,
        env_id: &str,
        post: &PublishRequest,
    ) -> Result<String, RpaError> {
        self.submit_task(
            "/open/v1/rpa/instagram/publishReelsVideo",
            json!({
                "envId": env_id,
                "description": post.description,
                "videoUrl": post.media_urls.first(),
                "scheduleAt": post.schedule_at,
            }),
        )
        .await
    }

    async fn instagram_publish_reels_images(
        &self,
        env_id: &str,
        post: &PublishRequest,
    ) -> Result<String, RpaError> {
        self.submit_task(
            "/open/v1/rpa/instagram/publishReelsImages",
            json!({
                "envId": env_id,
                "description": post.description,
                "imageUrls": post.media_urls,
                "scheduleAt": post.schedule_at,
            }),
        )
        .await
    }

    async fn reddit_warmup(&self, env_id: &str, params: &WarmupParams) -> Result<String, RpaError> {
        self.submit_task(
            "/open/v1/rpa/reddit/warmup",
            json!({
                "envId": env_id,
                "videosToBrowse": params.videos_to_browse,
                "searchKeyword": params.search_keyword,
            }),
        )
        .await
    }

    async fn reddit_publish_image(
        &self,
        env_id: &str,
        post: &PublishRequest,
    ) -> Result<String, RpaError> {
        self.submit_task(
            "/open/v1/rpa/reddit/publishImage",
            json!({
                "envId": env_id,
                "description": post.description,
                "imageUrls": post.media_urls,
                "scheduleAt": post.schedule_at,
            }),
        )
        .await
    }

    async fn reddit_publish_video(
        &self,
        env_id: &str,
        post: &PublishRequest,
    ) -> Result<String, RpaError> {
        self.submit_task(
            "/open/v1/rpa/reddit/publishVideo",
            json!({
                "envId": env_id,
                "description": post.description,
                "videoUrl": post.media_urls.first(),
                "scheduleAt": post.schedule_at,
            }),
        )
        .await
    }

    async fn create_custom_task(
        &self,
        env_id: &str,
        flow_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<String, RpaError> {
        self.submit_task(
            "/open/v1/task/custom",
            json!({ "envId": env_id, "flowId": flow_id, "paramMap": params }),
        )
        .await
    }

    async fn query_task(&self, task_id: &str) -> Result<TaskRecord, RpaError> {
        let ids = vec![task_id.to_string()];
        let records = self.query_tasks(&ids).await?;
        records.into_iter().find(|r| r.id == task_id).ok_or_else(|| {
            RpaError::from_code(code::NOT_FOUND, format!("task {task_id} not found"))
        })
    }

    async fn query_tasks(&self, task_ids: &[String]) -> Result<Vec<TaskRecord>, RpaError> {
        #[derive(Deserialize)]
        struct TaskPage {
            #[serde(default)]
            items: Vec<TaskRecord>,
        }
        let page: TaskPage = self
            .post_data("/open/v1/task/query", json!({ "ids": task_ids }))
            .await?;
        Ok(page.items)
    }

    async fn request_screenshot(&self, env_id: &str) -> Result<String, RpaError> {
        self.submit_task("/open/v1/phone/screenshot", json!({ "envId": env_id }))
            .await
    }

    async fn get_screenshot_result(&self, ticket_id: &str) -> Result<ScreenshotResult, RpaError> {
        self.post_data(
            "/open/v1/phone/screenshot/result",
            json!({ "taskId": ticket_id }),
        )
        .await
    }

    async fn list_marketplace_apps(
        &self,
        query: Option<&str>,
    ) -> Result<Vec<MarketplaceApp>, RpaError> {
        #[derive(Deserialize)]
        struct AppPage {
            #[serde(default)]
            items: Vec<MarketplaceApp>,
        }
        let page: AppPage = self
            .post_data("/open/v1/market/app/list", json!({ "query": query }))
            .await?;
        Ok(page.items)
    }

    async fn list_task_flows(&self) -> Result<Vec<TaskFlow>, RpaError> {
        #[derive(Deserialize)]
        struct FlowPage {
            #[serde(default)]
            items: Vec<TaskFlow>,
        }
        let page: FlowPage = self.post_data("/open/v1/flow/list", json!({})).await?;
        Ok(page.items)
    }

    async fn list_groups(&self) -> Result<Vec<GroupInfo>, RpaError> {
        #[derive(Deserialize)]
        struct GroupPage {
            #[serde(default)]
            items: Vec<GroupInfo>,
        }
        let page: GroupPage = self.post_data("/open/v1/group/list", json!({})).await?;
        Ok(page.items)
    }

    async fn check_media_url(&self, url: &str) -> Result<bool, RpaError> {
        let resp = self.http.head(url).send().await?;
        Ok(resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_classify_into_error_kinds() {
        assert!(matches!(
            RpaError::from_code(code::RATE_LIMITED, "slow down"),
            RpaError::RateLimited(_)
        ));
        assert!(matches!(
            RpaError::from_code(code::ENV_NOT_RUNNING, "env stopped"),
            RpaError::PhoneNotRunning(_)
        ));
        assert!(matches!(
            RpaError::from_code(code::HIGHER_VERSION_INSTALLED, "newer build present"),
            RpaError::Provider { code: 42004, .. }
        ));
    }

    #[test]
    fn permanent_codes_are_not_retryable() {
        for code in [code::MALFORMED, code::NOT_FOUND, code::BALANCE_INSUFFICIENT] {
            let err = RpaError::from_code(code, "nope");
            assert!(err.is_permanent(), "{code} should be permanent");
            assert!(!err.is_retryable(), "{code} should not be retryable");
        }
        assert!(RpaError::Transport("connection reset".into()).is_retryable());
        assert!(RpaError::from_code(code::RATE_LIMITED, "429").is_retryable());
        assert!(RpaError::from_code(code::INSTALL_IN_PROGRESS, "busy").is_retryable());
    }

    #[test]
    fn envelope_decodes_logical_failure() {
        let raw = r#"{ "code": 42002, "msg": "env not running", "data": null }"#;
        let envelope: ApiEnvelope<Paged<PhoneInfo>> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.code, 42002);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn task_terminality() {
        assert!(task_status::is_terminal(task_status::COMPLETED));
        assert!(task_status::is_terminal(task_status::FAILED));
        assert!(task_status::is_terminal(task_status::CANCELLED));
        assert!(!task_status::is_terminal(task_status::WAITING));
        assert!(!task_status::is_terminal(task_status::IN_PROGRESS));
    }

    struct PagingStub;

    #[async_trait]
    impl RpaApi for PagingStub {
        async fn list_phones(
            &self,
            _group: Option<&str>,
            page: u32,
            page_size: u32,
        ) -> Result<Paged<PhoneInfo>, RpaError> {
            // Two full pages followed by a short one.
            let count = if page <= 2 { page_size } else { 3 };
            let items = (0..count)
                .map(|i| PhoneInfo {
                    id: format!("env-{page}-{i}"),
                    name: format!("phone-{page}-{i}"),
                    group_name: None,
                })
                .collect();
            Ok(Paged {
                items,
                total: 0,
                page,
                page_size,
            })
        }

        async fn start_phones(&self, _: &[String]) -> Result<(), RpaError> {
            unimplemented!()
        }
        async fn stop_phones(&self, _: &[String]) -> Result<(), RpaError> {
            unimplemented!()
        }
        async fn restart_phones(&self, _: &[String]) -> Result<(), RpaError> {
            unimplemented!()
        }
        async fn get_phone_status(&self, _: &str) -> Result<PhoneStatusInfo, RpaError> {
            unimplemented!()
        }
        async fn install_app(&self, _: &[String], _: &str) -> Result<(), RpaError> {
            unimplemented!()
        }
        async fn uninstall_app(&self, _: &[String], _: &str) -> Result<(), RpaError> {
            unimplemented!()
        }
        async fn list_installed_apps(&self, _: &str) -> Result<Vec<InstalledApp>, RpaError> {
            unimplemented!()
        }
        async fn start_app(&self, _: &str, _: &str) -> Result<(), RpaError> {
            unimplemented!()
        }
        async fn instagram_login(&self, _: &str, _: &str, _: &str) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn instagram_warmup(&self, _: &str, _: &WarmupParams) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn instagram_publish_reels_video(
            &self,
            _: &str,
            _: &PublishRequest,
        ) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn instagram_publish_reels_images(
            &self,
            _: &str,
            _: &PublishRequest,
        ) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn reddit_warmup(&self, _: &str, _: &WarmupParams) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn reddit_publish_image(
            &self,
            _: &str,
            _: &PublishRequest,
        ) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn reddit_publish_video(
            &self,
            _: &str,
            _: &PublishRequest,
        ) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn create_custom_task(
            &self,
            _: &str,
            _: &str,
            _: &HashMap<String, String>,
        ) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn query_task(&self, _: &str) -> Result<TaskRecord, RpaError> {
            unimplemented!()
        }
        async fn query_tasks(&self, _: &[String]) -> Result<Vec<TaskRecord>, RpaError> {
            unimplemented!()
        }
        async fn request_screenshot(&self, _: &str) -> Result<String, RpaError> {
            unimplemented!()
        }
        async fn get_screenshot_result(&self, _: &str) -> Result<ScreenshotResult, RpaError> {
            unimplemented!()
        }
        async fn list_marketplace_apps(
            &self,
            _: Option<&str>,
        ) -> Result<Vec<MarketplaceApp>, RpaError> {
            unimplemented!()
        }
        async fn list_task_flows(&self) -> Result<Vec<TaskFlow>, RpaError> {
            unimplemented!()
        }
        async fn list_groups(&self) -> Result<Vec<GroupInfo>, RpaError> {
            unimplemented!()
        }
        async fn check_media_url(&self, _: &str) -> Result<bool, RpaError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn list_all_phones_stops_on_short_page() {
        let stub = PagingStub;
        let phones = stub.list_all_phones(None).await.unwrap();
        assert_eq!(phones.len(), 2 * DEFAULT_PAGE_SIZE as usize + 3);
        assert_eq!(phones[0].id, "env-1-0");
        assert_eq!(phones.last().unwrap().id, "env-3-2");
    }
}
