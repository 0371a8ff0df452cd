use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};
use crate::types::ThreadId;

/// Lifecycle status of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Idle,
    Invoking,
    Errored,
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ThreadStatus::Idle => "idle",
            ThreadStatus::Invoking => "invoking",
            ThreadStatus::Errored => "errored",
        })
    }
}

/// The durable record of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    /// Append-only conversation log, in conversation order.
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub status: ThreadStatus,
    /// Last invocation failure, cleared by the next success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(id: ThreadId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            status: ThreadStatus::Idle,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id.clone(),
            status: self.status,
            message_count: self.messages.len(),
            user_message_count: self.user_message_count(),
            updated_at: self.updated_at,
        }
    }
}

/// Listing row for a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub status: ThreadStatus,
    pub message_count: usize,
    pub user_message_count: usize,
    pub updated_at: DateTime<Utc>,
}
