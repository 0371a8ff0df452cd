use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a process-level failure looked from the outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, when the process was killed.
    pub signal: Option<i32>,
    /// Tail of stderr (or the spawn error), bounded to a few KiB.
    pub detail: String,
}

impl ExitInfo {
    /// Longest stderr excerpt kept in an `ExitInfo`.
    pub const MAX_DETAIL: usize = 4_096;

    pub fn spawn_failed(err: &std::io::Error) -> Self {
        Self {
            code: None,
            signal: None,
            detail: format!("failed to spawn: {err}"),
        }
    }

    /// Keep only the last `MAX_DETAIL` bytes of `detail`, on a char boundary.
    pub fn with_detail(mut self, detail: &str) -> Self {
        let trimmed = detail.trim();
        let mut start = trimmed.len().saturating_sub(Self::MAX_DETAIL);
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        self.detail = trimmed[start..].to_string();
        self
    }
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}")?,
            (None, Some(signal)) => write!(f, "killed by signal {signal}")?,
            (None, None) => write!(f, "no exit status")?,
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Who has to act for a failed request to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; the same request may succeed later.
    TryAgain,
    /// The request itself is wrong.
    FixRequest,
    /// The deployment (config, credentials, files) is wrong.
    FixDeployment,
    /// Unexpected local failure.
    Internal,
}

/// Unified error type for the Parley listener.
#[derive(Error, Debug)]
pub enum ParleyError {
    // ── Threads ────────────────────────────────────────────────
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error("thread is busy: {0}")]
    Busy(String),

    // ── Context ────────────────────────────────────────────────
    #[error("context document not found: {0}")]
    DocumentNotFound(String),

    #[error("context import cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("missing context document: {0}")]
    MissingContext(String),

    // ── Invocation ─────────────────────────────────────────────
    #[error("reasoning process timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("reasoning process failed: {0}")]
    ProcessFailure(ExitInfo),

    // ── Skills / registry ──────────────────────────────────────
    #[error("local context '{0}' already exists, set overwrite to replace it")]
    Conflict(String),

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("registry returned {status}: {body}")]
    RegistryRejected { status: u16, body: String },

    // ── Requests ───────────────────────────────────────────────
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // ── Config ─────────────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ParleyError {
    /// Stable, machine-readable code for outward error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ThreadNotFound(_) | Self::DocumentNotFound(_) => "not_found",
            Self::Busy(_) => "busy",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::MissingContext(_) => "missing_context",
            Self::Timeout { .. } => "timeout",
            Self::ProcessFailure(_) => "process_failure",
            Self::Conflict(_) => "conflict",
            Self::RegistryUnavailable(_) => "registry_unavailable",
            Self::RegistryRejected { .. } => "registry_rejected",
            Self::InvalidName(_) | Self::InvalidRequest(_) => "invalid_request",
            Self::Config(_) => "config",
            Self::Io(_) | Self::Serialization(_) | Self::Other(_) => "internal",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Busy(_)
            | Self::Timeout { .. }
            | Self::ProcessFailure(_)
            | Self::RegistryUnavailable(_)
            | Self::RegistryRejected { .. } => ErrorClass::TryAgain,
            Self::ThreadNotFound(_)
            | Self::DocumentNotFound(_)
            | Self::CycleDetected { .. }
            | Self::MissingContext(_)
            | Self::Conflict(_)
            | Self::InvalidName(_)
            | Self::InvalidRequest(_) => ErrorClass::FixRequest,
            Self::Config(_) => ErrorClass::FixDeployment,
            Self::Io(_) | Self::Serialization(_) | Self::Other(_) => ErrorClass::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::TryAgain
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
