use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Account, JobState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub label: String,
    pub url: String,
    pub taken_at: DateTime<Utc>,
}

/// One orchestrator-tracked execution of a workflow against one
/// (phone, account) pair. Snapshots of this record are what observers see on
/// the `phone_update` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneJob {
    pub env_id: String,
    pub phone_name: String,
    pub account: Account,

    pub state: JobState,
    /// Per-state retry attempts consumed against the run's retry budget.
    #[serde(default)]
    pub attempts: HashMap<JobState, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Remote task ids keyed by stage (login, warmup, post1, ...).
    #[serde(default)]
    pub task_ids: HashMap<String, String>,

    pub current_step: u32,
    pub total_steps: u32,

    #[serde(default)]
    pub screenshots: Vec<Screenshot>,

    // Username-retry scratch for the custom strategy.
    #[serde(default)]
    pub username_candidates: Vec<String>,
    #[serde(default)]
    pub attempted_usernames: HashSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_username: Option<String>,

    /// Where to resume after a phone-restart recovery detour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<JobState>,
}

impl PhoneJob {
    pub fn new(
        env_id: impl Into<String>,
        phone_name: impl Into<String>,
        account: Account,
        total_steps: u32,
    ) -> Self {
        Self {
            env_id: env_id.into(),
            phone_name: phone_name.into(),
            account,
            state: JobState::Init,
            attempts: HashMap::new(),
            started_at: None,
            completed_at: None,
            error: None,
            task_ids: HashMap::new(),
            current_step: 0,
            total_steps,
            screenshots: Vec::new(),
            username_candidates: Vec::new(),
            attempted_usernames: HashSet::new(),
            current_username: None,
            original_username: None,
            resume_state: None,
        }
    }

    pub fn attempts_for(&self, state: JobState) -> u32 {
        self.attempts.get(&state).copied().unwrap_or(0)
    }

    pub fn record_attempt(&mut self, state: JobState) -> u32 {
        let count = self.attempts.entry(state).or_insert(0);
        *count += 1;
        *count
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsSummary {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub pending: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_ledger_counts_per_state() {
        let mut job = PhoneJob::new("e1", "p1", Account::new("a", "b"), 10);
        assert_eq!(job.attempts_for(JobState::Login), 0);
        assert_eq!(job.record_attempt(JobState::Login), 1);
        assert_eq!(job.record_attempt(JobState::Login), 2);
        assert_eq!(job.record_attempt(JobState::StartEnv), 1);
        assert_eq!(job.attempts_for(JobState::Login), 2);
    }
}
