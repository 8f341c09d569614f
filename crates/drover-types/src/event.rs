use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PhoneJob, ResultsSummary, WorkflowStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            phone_id: None,
            phone_name: None,
            details: None,
        }
    }
}

/// Typed bus payload. `topic()` is the SSE event name observers subscribe by.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    PhoneUpdate {
        job: Box<PhoneJob>,
    },
    Log {
        entry: LogEntry,
    },
    WorkflowStatus {
        status: WorkflowStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Results {
        results: ResultsSummary,
    },
}

impl WorkflowEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            WorkflowEvent::PhoneUpdate { .. } => "phone_update",
            WorkflowEvent::Log { .. } => "log",
            WorkflowEvent::WorkflowStatus { .. } => "workflow_status",
            WorkflowEvent::Results { .. } => "results",
        }
    }
}
