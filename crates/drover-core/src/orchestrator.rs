//! Process-wide scheduler: owns the single active run, pairs phones to
//! accounts, fans executors out under a concurrency semaphore, and walks the
//! workflow status graph as the run progresses.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use drover_client::{RpaApi, RpaError};
use drover_types::{PhoneJob, WorkflowConfig, WorkflowStatus};

use crate::strategy::{strategy_for, Strategy};
use crate::{executor, WorkflowContext, WorkflowStore};

#[derive(Debug, Error)]
pub enum StartError {
    #[error("a workflow is already running")]
    AlreadyRunning,
    #[error("no accounts provided")]
    NoAccounts,
    #[error("no phones available in group {0}")]
    NoPhones(String),
    #[error(transparent)]
    Rpa(#[from] RpaError),
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// At most one run per process. Constructed once at startup and shared.
pub struct Orchestrator {
    store: WorkflowStore,
    active: Mutex<Option<ActiveRun>>,
}

impl Orchestrator {
    pub fn new(store: WorkflowStore) -> Self {
        Self {
            store,
            active: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|run| !run.handle.is_finished())
            .unwrap_or(false)
    }

    /// Loads the phone roster, pairs phones to account rows in row order
    /// (truncating to the shorter side), seeds the store and spawns bounded
    /// executors. Rejected while a run is active.
    pub async fn start(
        &self,
        config: WorkflowConfig,
        client: Arc<dyn RpaApi>,
    ) -> Result<String, StartError> {
        let mut active = self.active.lock().await;
        if let Some(run) = active.as_ref() {
            if !run.handle.is_finished() {
                return Err(StartError::AlreadyRunning);
            }
        }
        if config.accounts.is_empty() {
            return Err(StartError::NoAccounts);
        }
        let phones = client.list_all_phones(Some(&config.group_name)).await?;
        if phones.is_empty() {
            return Err(StartError::NoPhones(config.group_name.clone()));
        }

        let config = Arc::new(config);
        let strategy = strategy_for(&config);
        self.store.reset().await;
        self.store.set_status(WorkflowStatus::Running, None).await;

        let cancel = CancellationToken::new();
        let mut contexts = Vec::new();
        for (phone, account) in phones.into_iter().zip(config.accounts.iter().cloned()) {
            self.store
                .insert_job(PhoneJob::new(
                    phone.id.clone(),
                    phone.name.clone(),
                    account,
                    strategy.total_steps(),
                ))
                .await;
            contexts.push(WorkflowContext {
                client: client.clone(),
                config: config.clone(),
                store: self.store.clone(),
                env_id: phone.id,
                phone_name: phone.name,
                cancel: cancel.clone(),
            });
        }

        let run_id = Uuid::new_v4().to_string();
        info!(run_id, jobs = contexts.len(), "workflow run starting");
        let handle = tokio::spawn(run_all(
            self.store.clone(),
            contexts,
            strategy,
            config.concurrency_limit.max(1),
            cancel.clone(),
        ));
        *active = Some(ActiveRun { cancel, handle });
        Ok(run_id)
    }

    /// Cancels the active run and returns once every executor has wound
    /// down. Returns whether there was a live run to stop.
    pub async fn stop(&self) -> bool {
        let run = self.active.lock().await.take();
        let Some(run) = run else { return false };
        if run.handle.is_finished() {
            let _ = run.handle.await;
            return false;
        }
        self.store.set_status(WorkflowStatus::Stopping, None).await;
        run.cancel.cancel();
        let _ = run.handle.await;
        self.store.set_status(WorkflowStatus::Stopped, None).await;
        self.store.publish_results().await;
        info!("workflow run stopped");
        true
    }
}

async fn run_all(
    store: WorkflowStore,
    contexts: Vec<WorkflowContext>,
    strategy: Arc<dyn Strategy>,
    concurrency: usize,
    cancel: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut set = JoinSet::new();
    for ctx in contexts {
        let semaphore = semaphore.clone();
        let strategy = strategy.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            tokio::select! {
                // A job still queued behind the semaphore fails promptly on
                // stop instead of waiting for a permit.
                _ = cancel.cancelled() => {
                    ctx.transition_to_failed("cancelled").await;
                }
                permit = semaphore.acquire_owned() => {
                    if let Ok(_permit) = permit {
                        executor::run_job(ctx, strategy).await;
                    }
                }
            }
        });
    }
    while set.join_next().await.is_some() {}

    if !cancel.is_cancelled() {
        store.set_status(WorkflowStatus::Completed, None).await;
        store.publish_results().await;
        info!("workflow run completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use drover_types::{Account, JobState, WorkflowEvent, WorkflowType};
    use std::time::Duration;

    async fn wait_for_status(store: &WorkflowStore, want: WorkflowStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store.status().await == want {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("store never reached {want:?}"));
    }

    fn accounts(n: usize) -> Vec<Account> {
        (0..n)
            .map(|i| Account::new(format!("user{i}"), format!("pw{i}")))
            .collect()
    }

    #[tokio::test]
    async fn pairing_is_deterministic_and_truncates() {
        let api = Arc::new(ScriptedApi::with_phones(vec![
            phone("E1", "P1"),
            phone("E2", "P2"),
            phone("E3", "P3"),
        ]));
        let store = WorkflowStore::new(crate::EventBus::new());
        let orchestrator = Orchestrator::new(store.clone());
        let config = test_config(WorkflowType::Warmup, accounts(2));
        orchestrator.start(config, api).await.unwrap();
        wait_for_status(&store, WorkflowStatus::Completed).await;

        let jobs = store.jobs().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            (jobs[0].env_id.as_str(), jobs[0].account.username.as_str()),
            ("E1", "user0")
        );
        assert_eq!(
            (jobs[1].env_id.as_str(), jobs[1].account.username.as_str()),
            ("E2", "user1")
        );
    }

    #[tokio::test]
    async fn completed_run_publishes_results() {
        let api = Arc::new(ScriptedApi::with_phones(vec![
            phone("E1", "P1"),
            phone("E2", "P2"),
        ]));
        let store = WorkflowStore::new(crate::EventBus::new());
        let mut rx = store.bus().subscribe();
        let orchestrator = Orchestrator::new(store.clone());
        let config = test_config(WorkflowType::Warmup, accounts(2));
        orchestrator.start(config, api).await.unwrap();
        wait_for_status(&store, WorkflowStatus::Completed).await;

        let results = store.results_summary().await;
        assert_eq!((results.total, results.completed, results.failed), (2, 2, 0));

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkflowEvent::WorkflowStatus { status, .. } = event {
                statuses.push(status);
            }
        }
        let running_at = statuses
            .iter()
            .position(|s| *s == WorkflowStatus::Running)
            .unwrap();
        let completed_at = statuses
            .iter()
            .position(|s| *s == WorkflowStatus::Completed)
            .unwrap();
        assert!(running_at < completed_at);
    }

    #[tokio::test]
    async fn start_is_rejected_while_running() {
        let mut scripted = ScriptedApi::default();
        scripted.status_default = drover_client::phone_status::STARTING;
        let api = Arc::new(scripted);
        let store = WorkflowStore::new(crate::EventBus::new());
        let orchestrator = Orchestrator::new(store.clone());
        let mut config = test_config(WorkflowType::Warmup, accounts(1));
        config.poll_interval_secs = 1;
        orchestrator.start(config.clone(), api.clone()).await.unwrap();

        assert!(matches!(
            orchestrator.start(config, api).await,
            Err(StartError::AlreadyRunning)
        ));
        assert!(orchestrator.is_running().await);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn stop_cancels_every_polling_job() {
        let mut scripted = ScriptedApi::with_phones(
            (1..=5)
                .map(|i| phone(&format!("E{i}"), &format!("P{i}")))
                .collect(),
        );
        scripted.status_default = drover_client::phone_status::STARTING;
        let api = Arc::new(scripted);
        let store = WorkflowStore::new(crate::EventBus::new());
        let orchestrator = Orchestrator::new(store.clone());
        let mut config = test_config(WorkflowType::Warmup, accounts(5));
        config.concurrency_limit = 5;
        config.poll_interval_secs = 1;
        orchestrator.start(config, api).await.unwrap();

        // Let every job settle into its status-polling sleep.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut rx = store.bus().subscribe();
        assert!(orchestrator.stop().await);

        let jobs = store.jobs().await;
        assert_eq!(jobs.len(), 5);
        for job in &jobs {
            assert_eq!(job.state, JobState::Failed);
            assert_eq!(job.error.as_deref(), Some("cancelled"));
        }
        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkflowEvent::WorkflowStatus { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![WorkflowStatus::Stopping, WorkflowStatus::Stopped]
        );
        assert!(!orchestrator.is_running().await);

        // Second stop is a no-op with the same terminal state.
        assert!(!orchestrator.stop().await);
        assert_eq!(store.status().await, WorkflowStatus::Stopped);
    }

    #[tokio::test]
    async fn serial_execution_with_unit_concurrency() {
        let api = Arc::new(ScriptedApi::with_phones(vec![
            phone("E1", "P1"),
            phone("E2", "P2"),
            phone("E3", "P3"),
        ]));
        let store = WorkflowStore::new(crate::EventBus::new());
        let orchestrator = Orchestrator::new(store.clone());
        let mut config = test_config(WorkflowType::Warmup, accounts(3));
        config.concurrency_limit = 1;
        orchestrator.start(config, api).await.unwrap();
        wait_for_status(&store, WorkflowStatus::Completed).await;

        let results = store.results_summary().await;
        assert_eq!(results.completed, 3);
    }
}
