//! TaskDescription: the unit of work submitted to the router.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::errors::TaskValidationError;
use super::ids::TaskId;

/// Name of the unit of work. Maps to a job name, workflow type or automation
/// name depending on the backend that ends up running it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub base_delay_ms: u64,
}

impl Backoff {
    pub fn fixed(base_delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base_delay_ms,
        }
    }

    pub fn exponential(base_delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay_ms,
        }
    }
}

/// Retry policy attached to a task.
///
/// The router uses it for submission retries, and the queue adapter forwards
/// it to the queue as job options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Backoff::fixed(0))
    }

    /// Delay to wait after the given (1-indexed) failed attempt.
    ///
    /// Example with base=200ms:
    /// - Fixed: 200ms, 200ms, 200ms, ...
    /// - Exponential: 200ms, 400ms, 800ms, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff.base_delay_ms;
        let ms = match self.backoff.kind {
            BackoffKind::Fixed => base,
            BackoffKind::Exponential => {
                let exponent = attempt.saturating_sub(1).min(63);
                base.saturating_mul(1u64 << exponent)
            }
        };
        Duration::from_millis(ms)
    }
}

/// The unit of work submitted to the router.
///
/// `id` is private and has no setter: once a description exists its id never
/// changes, which is what makes re-submission idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescription {
    id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub is_durable: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_hint: Option<String>,
}

impl TaskDescription {
    pub fn new(id: impl Into<TaskId>, task_type: impl Into<TaskType>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            payload: serde_json::Value::Null,
            is_durable: false,
            tags: BTreeSet::new(),
            retry_policy: None,
            queue_hint: None,
        }
    }

    /// Description with a router-generated id (`task-{ulid}`).
    pub fn generated(task_type: impl Into<TaskType>) -> Self {
        Self::new(TaskId::from_ulid(Ulid::new()), task_type)
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn durable(mut self) -> Self {
        self.is_durable = true;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_queue_hint(mut self, hint: impl Into<String>) -> Self {
        self.queue_hint = Some(hint.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.id.is_empty() {
            return Err(TaskValidationError::EmptyId);
        }
        if self.task_type.as_str().trim().is_empty() {
            return Err(TaskValidationError::EmptyType(self.id.clone()));
        }
        if let Some(policy) = &self.retry_policy
            && policy.max_attempts == 0
        {
            return Err(TaskValidationError::ZeroAttempts(self.id.clone()));
        }
        Ok(())
    }
}
