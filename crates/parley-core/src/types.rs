use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{ParleyError, Result};

static DOCUMENT_NAME: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

static THREAD_ID: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9._-]{1,128}$").expect("static regex"));

/// Identifier of a conversation thread.
///
/// Doubles as the record's file stem and a directory name, so only
/// filename-safe characters are accepted, a leading dot is rejected and `..`
/// may not appear anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThreadId(String);

impl ThreadId {
    /// Allocate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if !THREAD_ID.is_match(raw) || raw.starts_with('.') || raw.contains("..") {
            return Err(ParleyError::InvalidName(format!("thread id {raw:?}")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ThreadId {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ThreadId {
    type Error = ParleyError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ThreadId> for String {
    fn from(id: ThreadId) -> Self {
        id.0
    }
}

/// Check a context document / skill name: alphanumerics, dash, underscore.
pub fn validate_document_name(name: &str) -> Result<()> {
    if DOCUMENT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ParleyError::InvalidName(format!(
            "{name:?} (alphanumeric, dash, underscore only)"
        )))
    }
}
