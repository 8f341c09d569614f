use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use drover_types::{
    JobState, LogEntry, PhoneJob, ResultsSummary, WorkflowEvent, WorkflowStatus,
};

use crate::EventBus;

const LOG_RING_CAP: usize = 500;

struct StoreInner {
    jobs: HashMap<String, PhoneJob>,
    /// Insertion order of env ids, for stable listings.
    job_order: Vec<String>,
    status: WorkflowStatus,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    logs: VecDeque<LogEntry>,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            job_order: Vec::new(),
            status: WorkflowStatus::Idle,
            error: None,
            started_at: None,
            completed_at: None,
            logs: VecDeque::new(),
        }
    }

    fn results_summary(&self) -> ResultsSummary {
        let mut summary = ResultsSummary {
            total: self.jobs.len() as u32,
            ..Default::default()
        };
        for job in self.jobs.values() {
            match job.state {
                JobState::Done => summary.completed += 1,
                JobState::Failed => summary.failed += 1,
                _ => summary.pending += 1,
            }
        }
        summary
    }
}

/// Point-in-time view served by `/workflow/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub phones: Vec<PhoneJob>,
    pub results: ResultsSummary,
    pub logs: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Authoritative in-memory workflow state. All mutations pass through here,
/// serialized behind one lock, and every externally observable change is
/// published on the bus.
#[derive(Clone)]
pub struct WorkflowStore {
    inner: Arc<RwLock<StoreInner>>,
    bus: EventBus,
}

impl WorkflowStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::new())),
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn insert_job(&self, job: PhoneJob) {
        let snapshot = job.clone();
        {
            let mut inner = self.inner.write().await;
            if !inner.jobs.contains_key(&job.env_id) {
                inner.job_order.push(job.env_id.clone());
            }
            inner.jobs.insert(job.env_id.clone(), job);
        }
        self.bus.publish(WorkflowEvent::PhoneUpdate {
            job: Box::new(snapshot),
        });
    }

    /// Applies `mutate` to the job and publishes the resulting snapshot.
    /// Returns the snapshot, or `None` when the job is gone (store cleared).
    pub async fn update_job<F>(&self, env_id: &str, mutate: F) -> Option<PhoneJob>
    where
        F: FnOnce(&mut PhoneJob),
    {
        let snapshot = {
            let mut inner = self.inner.write().await;
            let job = inner.jobs.get_mut(env_id)?;
            mutate(job);
            job.clone()
        };
        self.bus.publish(WorkflowEvent::PhoneUpdate {
            job: Box::new(snapshot.clone()),
        });
        Some(snapshot)
    }

    pub async fn job(&self, env_id: &str) -> Option<PhoneJob> {
        self.inner.read().await.jobs.get(env_id).cloned()
    }

    pub async fn jobs(&self) -> Vec<PhoneJob> {
        let inner = self.inner.read().await;
        inner
            .job_order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    pub async fn status(&self) -> WorkflowStatus {
        self.inner.read().await.status
    }

    /// Walks the status graph. Illegal edges are refused (and logged) so a
    /// late writer cannot drag a finished run backwards.
    pub async fn set_status(&self, next: WorkflowStatus, error: Option<String>) -> bool {
        let changed = {
            let mut inner = self.inner.write().await;
            if !inner.status.can_transition_to(next) {
                warn!(from = ?inner.status, to = ?next, "refusing illegal workflow status transition");
                return false;
            }
            if inner.status == next {
                return true;
            }
            inner.status = next;
            inner.error = error.clone();
            match next {
                WorkflowStatus::Running => {
                    inner.started_at = Some(Utc::now());
                    inner.completed_at = None;
                }
                WorkflowStatus::Completed | WorkflowStatus::Stopped => {
                    inner.completed_at = Some(Utc::now());
                }
                _ => {}
            }
            true
        };
        if changed {
            self.bus.publish(WorkflowEvent::WorkflowStatus {
                status: next,
                error,
            });
        }
        changed
    }

    /// Reconciliation escape hatch for the stop endpoint: the stored status
    /// is forced regardless of the graph, e.g. when the store says `running`
    /// but no orchestrator run exists anymore.
    pub async fn force_status(&self, next: WorkflowStatus) {
        {
            let mut inner = self.inner.write().await;
            if inner.status == next {
                return;
            }
            inner.status = next;
            if matches!(next, WorkflowStatus::Completed | WorkflowStatus::Stopped) {
                inner.completed_at = Some(Utc::now());
            }
        }
        self.bus.publish(WorkflowEvent::WorkflowStatus {
            status: next,
            error: None,
        });
    }

    pub async fn log(&self, entry: LogEntry) {
        {
            let mut inner = self.inner.write().await;
            if inner.logs.len() == LOG_RING_CAP {
                inner.logs.pop_front();
            }
            inner.logs.push_back(entry.clone());
        }
        self.bus.publish(WorkflowEvent::Log { entry });
    }

    /// Most recent `n` entries, newest first.
    pub async fn recent_logs(&self, n: usize) -> Vec<LogEntry> {
        let inner = self.inner.read().await;
        inner.logs.iter().rev().take(n).cloned().collect()
    }

    pub async fn results_summary(&self) -> ResultsSummary {
        self.inner.read().await.results_summary()
    }

    pub async fn publish_results(&self) {
        let results = self.results_summary().await;
        self.bus.publish(WorkflowEvent::Results { results });
    }

    /// Empties the store back to idle. Publishes the idle status so observers
    /// drop their stale views.
    pub async fn reset(&self) {
        {
            let mut inner = self.inner.write().await;
            *inner = StoreInner::new();
        }
        self.bus.publish(WorkflowEvent::WorkflowStatus {
            status: WorkflowStatus::Idle,
            error: None,
        });
    }

    pub async fn snapshot(&self, log_limit: usize) -> StoreSnapshot {
        let inner = self.inner.read().await;
        StoreSnapshot {
            status: inner.status,
            error: inner.error.clone(),
            phones: inner
                .job_order
                .iter()
                .filter_map(|id| inner.jobs.get(id).cloned())
                .collect(),
            results: inner.results_summary(),
            logs: inner.logs.iter().rev().take(log_limit).cloned().collect(),
            started_at: inner.started_at,
            completed_at: inner.completed_at,
        }
    }
}
