use chrono::Utc;
use parley_core::{
    Message, ParleyError, Result, Thread, ThreadId, ThreadStatus, ThreadSummary, fs,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::lease::{LeaseTable, ThreadLease};

/// File-backed thread store: `<base>/<thread-id>.json` per thread.
///
/// Reads always go to disk, so they observe the last committed record.
/// Every mutation runs under the thread's lease; the public mutators take the
/// lease themselves and fail with `Busy` while someone else holds it.
#[derive(Clone)]
pub struct ThreadStore {
    base_path: PathBuf,
    leases: LeaseTable,
}

impl ThreadStore {
    /// Create a store rooted at `base_path` (created lazily on first write).
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            leases: LeaseTable::default(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn thread_path(&self, id: &ThreadId) -> PathBuf {
        self.base_path.join(format!("{id}.json"))
    }

    // ── Leases ─────────────────────────────────────────────────

    /// Take the thread's lease without waiting. The thread need not exist yet.
    pub fn acquire(&self, id: &ThreadId) -> Result<ThreadLease> {
        self.leases.try_acquire(id)
    }

    /// Whether some caller currently holds the thread's lease.
    pub fn is_busy(&self, id: &ThreadId) -> bool {
        self.leases.is_held(id)
    }

    // ── Reads ──────────────────────────────────────────────────

    pub async fn get(&self, id: &ThreadId) -> Result<Thread> {
        self.load(id)
            .await?
            .ok_or_else(|| ParleyError::ThreadNotFound(id.to_string()))
    }

    /// Summaries of every readable thread, most recently updated first.
    pub async fn list(&self) -> Result<Vec<ThreadSummary>> {
        let mut summaries: Vec<ThreadSummary> = self
            .load_all()
            .await?
            .iter()
            .map(Thread::summary)
            .collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }

    // ── Mutations ──────────────────────────────────────────────

    /// Create a thread with a fresh id, persisted before returning.
    pub async fn create(&self) -> Result<Thread> {
        let id = ThreadId::generate();
        let _lease = self.acquire(&id)?;
        let thread = Thread::new(id);
        self.save(&thread).await?;
        info!(thread_id = %thread.id, "thread created");
        Ok(thread)
    }

    /// Load the leased thread, creating it when no record exists.
    pub async fn open(&self, lease: &ThreadLease) -> Result<Thread> {
        let id = lease.thread_id();
        if let Some(thread) = self.load(id).await? {
            return Ok(thread);
        }
        let thread = Thread::new(id.clone());
        self.save(&thread).await?;
        info!(thread_id = %id, "thread created on first message");
        Ok(thread)
    }

    /// Append one message. Fails with `Busy` while the thread is leased elsewhere.
    pub async fn append(&self, id: &ThreadId, message: Message) -> Result<Thread> {
        let lease = self.acquire(id)?;
        self.append_with(&lease, vec![message]).await
    }

    /// Append messages as a single commit on behalf of the lease holder.
    pub async fn append_with(&self, lease: &ThreadLease, messages: Vec<Message>) -> Result<Thread> {
        self.update(lease, |thread| thread.messages.extend(messages))
            .await
    }

    /// Mark the leased thread as invoking, creating it if needed.
    pub async fn begin_invocation(&self, lease: &ThreadLease) -> Result<Thread> {
        self.open(lease).await?;
        self.update(lease, |thread| thread.status = ThreadStatus::Invoking)
            .await
    }

    /// Record a completed exchange and return the thread to `idle`.
    pub async fn complete_invocation(
        &self,
        lease: &ThreadLease,
        messages: Vec<Message>,
    ) -> Result<Thread> {
        self.update(lease, |thread| {
            thread.messages.extend(messages);
            thread.status = ThreadStatus::Idle;
            thread.last_error = None;
        })
        .await
    }

    /// Mark a failed invocation. The message log is left untouched.
    pub async fn fail_invocation(&self, lease: &ThreadLease, error: &ParleyError) -> Result<Thread> {
        self.set_status(lease, ThreadStatus::Errored, Some(error.to_string()))
            .await
    }

    pub async fn set_status(
        &self,
        lease: &ThreadLease,
        status: ThreadStatus,
        last_error: Option<String>,
    ) -> Result<Thread> {
        self.update(lease, |thread| {
            thread.status = status;
            thread.last_error = last_error;
        })
        .await
    }

    /// Remove a thread's record. Absent threads report `ThreadNotFound`;
    /// a thread with an invocation in flight reports `Busy`.
    pub async fn delete(&self, id: &ThreadId) -> Result<()> {
        let lease = self.acquire(id)?;
        self.delete_with(&lease).await
    }

    /// Remove the record on behalf of the lease holder, who keeps the lease
    /// for any cleanup that must happen before the id is reused.
    pub async fn delete_with(&self, lease: &ThreadLease) -> Result<()> {
        let id = lease.thread_id();
        match tokio::fs::remove_file(self.thread_path(id)).await {
            Ok(()) => {
                info!(thread_id = %id, "thread deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ParleyError::ThreadNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move threads left in `invoking` by a previous process to `errored`.
    pub async fn recover(&self) -> Result<usize> {
        let mut recovered = 0;
        for thread in self.load_all().await? {
            if thread.status != ThreadStatus::Invoking {
                continue;
            }
            let lease = match self.acquire(&thread.id) {
                Ok(lease) => lease,
                Err(_) => continue,
            };
            self.set_status(
                &lease,
                ThreadStatus::Errored,
                Some("invocation interrupted by restart".into()),
            )
            .await?;
            warn!(thread_id = %thread.id, "recovered thread interrupted mid-invocation");
            recovered += 1;
        }
        Ok(recovered)
    }

    // ── Internals ──────────────────────────────────────────────

    async fn update(
        &self,
        lease: &ThreadLease,
        apply: impl FnOnce(&mut Thread),
    ) -> Result<Thread> {
        let id = lease.thread_id();
        let mut thread = self
            .load(id)
            .await?
            .ok_or_else(|| ParleyError::ThreadNotFound(id.to_string()))?;
        apply(&mut thread);
        thread.updated_at = Utc::now();
        self.save(&thread).await?;
        Ok(thread)
    }

    async fn load(&self, id: &ThreadId) -> Result<Option<Thread>> {
        let content = match tokio::fs::read_to_string(self.thread_path(id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, thread: &Thread) -> Result<()> {
        let content = serde_json::to_vec_pretty(thread)?;
        fs::write_atomic(&self.thread_path(&thread.id), &content).await?;
        debug!(
            thread_id = %thread.id,
            messages = thread.messages.len(),
            status = %thread.status,
            "thread committed"
        );
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Thread>> {
        let mut entries = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut threads = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if fs::is_temp_file(&path) || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| ThreadId::parse(s).ok())
            else {
                continue;
            };
            match self.load(&id).await {
                Ok(Some(thread)) => threads.push(thread),
                Ok(None) => {}
                Err(e) => warn!(thread_id = %id, error = %e, "skipping unreadable thread record"),
            }
        }
        Ok(threads)
    }
}
