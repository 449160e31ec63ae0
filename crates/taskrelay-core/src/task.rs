//! Task definitions: the single persisted entity of the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RelayError, Result};
use crate::payload::TaskPayload;

/// What kind of action a task performs when it comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Call,
    Sms,
    Whatsapp,
    Email,
    CalendarEvent,
    OutlookEvent,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::Call,
        TaskType::Sms,
        TaskType::Whatsapp,
        TaskType::Email,
        TaskType::CalendarEvent,
        TaskType::OutlookEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::Email => "email",
            Self::CalendarEvent => "calendar_event",
            Self::OutlookEvent => "outlook_event",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RelayError::Validation(format!("unknown task type '{s}'")))
    }
}

/// Task status. `Pending` moves exactly once, to `Done` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(RelayError::Validation(format!("unknown task status '{other}'"))),
        }
    }
}

/// A task submission, before it has an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    /// Destination address: phone number or email.
    pub target: String,
    /// Body text.
    pub message: String,
    pub task_type: TaskType,
    /// When the task becomes due. Defaults to "now".
    #[serde(default = "Utc::now", deserialize_with = "crate::time::deserialize")]
    pub scheduled_at: DateTime<Utc>,
    /// Provider-specific fields, interpreted per `task_type`.
    #[serde(default)]
    pub extra_data: Option<serde_json::Value>,
}

impl NewTask {
    pub fn new(target: &str, message: &str, task_type: TaskType, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            target: target.to_string(),
            message: message.to_string(),
            task_type,
            scheduled_at,
            extra_data: None,
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra_data = Some(extra);
        self
    }

    /// Check required fields and decode `extra_data` against the task type.
    pub fn validate(&self) -> Result<TaskPayload> {
        if self.target.trim().is_empty() {
            return Err(RelayError::Validation("target must not be empty".into()));
        }
        if self.message.trim().is_empty() {
            return Err(RelayError::Validation("message must not be empty".into()));
        }
        TaskPayload::decode(self.task_type, self.extra_data.as_ref())
    }

    /// Whether the submission falls inside the "immediate" window.
    /// Only affects logging: every task goes through the store.
    pub fn is_immediate(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        self.scheduled_at <= now + chrono::Duration::seconds(threshold_secs)
    }
}

/// A persisted task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub target: String,
    pub message: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub scheduled_at: DateTime<Utc>,
    pub extra_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Eligible for dispatch at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_at <= now
    }

    /// Decode `extra_data` for this task's type.
    pub fn payload(&self) -> Result<TaskPayload> {
        TaskPayload::decode(self.task_type, self.extra_data.as_ref())
    }
}
