use chrono::{DateTime, Utc};
use parley_config::AgentConfig;
use parley_core::{
    ContextDocument, DocumentKind, ParleyError, Result, ThreadId, fs, validate_document_name,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the dynamic document describing the current invocation.
pub const STATE: &str = "state";
/// Name of the dynamic document holding recent conversation history.
pub const HISTORY: &str = "history";

/// Listing row for a static document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    /// Whether the root document imports it.
    pub included: bool,
}

/// On-disk layout of the agent's context documents.
///
/// ```text
/// <workdir>/<root>.md                 root document
/// <workdir>/context/<name>.md         static documents
/// <workdir>/dynamic/<thread>/<name>.md  dynamic documents, one dir per thread
/// ```
#[derive(Debug, Clone)]
pub struct ContextStore {
    workdir: PathBuf,
    root_name: String,
}

impl ContextStore {
    pub fn new(workdir: impl Into<PathBuf>, root_name: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            root_name: root_name.into(),
        }
    }

    pub fn from_config(agent: &AgentConfig) -> Self {
        Self::new(&agent.workdir, &agent.root_document)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn root_path(&self) -> PathBuf {
        self.workdir.join(format!("{}.md", self.root_name))
    }

    pub fn context_dir(&self) -> PathBuf {
        self.workdir.join("context")
    }

    /// Directory holding the dynamic documents of one thread.
    pub fn dynamic_dir(&self, thread: &ThreadId) -> PathBuf {
        self.workdir.join("dynamic").join(thread.as_str())
    }

    fn static_path(&self, name: &str) -> PathBuf {
        self.context_dir().join(format!("{name}.md"))
    }

    /// Root and dynamic names cannot be managed as static documents.
    pub fn is_reserved(&self, name: &str) -> bool {
        name == self.root_name || name == STATE || name == HISTORY
    }

    fn check_static_name(&self, name: &str) -> Result<()> {
        validate_document_name(name)?;
        if self.is_reserved(name) {
            return Err(ParleyError::InvalidName(format!("{name:?} is reserved")));
        }
        Ok(())
    }

    // ── Root document ──────────────────────────────────────────

    pub async fn root(&self) -> Result<ContextDocument> {
        read_document(&self.root_path(), &self.root_name, DocumentKind::Root)
            .await?
            .ok_or_else(|| ParleyError::DocumentNotFound(self.root_name.clone()))
    }

    pub async fn put_root(&self, content: &str) -> Result<ContextDocument> {
        fs::write_atomic(&self.root_path(), content.as_bytes()).await?;
        info!(document = %self.root_name, chars = content.len(), "root document updated");
        self.root().await
    }

    // ── Static documents ───────────────────────────────────────

    /// Static documents in name order, flagged with whether the root imports them.
    pub async fn list(&self) -> Result<Vec<DocumentInfo>> {
        let root = read_document(&self.root_path(), &self.root_name, DocumentKind::Root).await?;
        let mut infos = Vec::new();
        for name in self.static_names().await? {
            let meta = tokio::fs::metadata(self.static_path(&name)).await?;
            infos.push(DocumentInfo {
                included: root.as_ref().is_some_and(|r| r.includes(&name)),
                size_bytes: meta.len(),
                modified: meta.modified().map(DateTime::<Utc>::from).unwrap_or_default(),
                name,
            });
        }
        Ok(infos)
    }

    /// Names of every static document, sorted. Reserved names are skipped.
    pub async fn static_names(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.context_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if fs::is_temp_file(&path) || path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_document_name(name).is_ok() && !self.is_reserved(name) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        validate_document_name(name)?;
        Ok(tokio::fs::try_exists(self.static_path(name)).await?)
    }

    pub async fn get(&self, name: &str) -> Result<ContextDocument> {
        validate_document_name(name)?;
        read_document(&self.static_path(name), name, DocumentKind::Static)
            .await?
            .ok_or_else(|| ParleyError::DocumentNotFound(name.to_string()))
    }

    /// Create a new static document. `Conflict` if one already exists.
    pub async fn create(&self, name: &str, content: &str) -> Result<ContextDocument> {
        self.check_static_name(name)?;
        if self.exists(name).await? {
            return Err(ParleyError::Conflict(name.to_string()));
        }
        self.write_static(name, content).await
    }

    /// Create or replace a static document.
    pub async fn put(&self, name: &str, content: &str) -> Result<ContextDocument> {
        self.check_static_name(name)?;
        self.write_static(name, content).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.check_static_name(name)?;
        match tokio::fs::remove_file(self.static_path(name)).await {
            Ok(()) => {
                info!(document = %name, "context document deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ParleyError::DocumentNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_static(&self, name: &str, content: &str) -> Result<ContextDocument> {
        fs::write_atomic(&self.static_path(name), content.as_bytes()).await?;
        info!(document = %name, chars = content.len(), "context document saved");
        self.get(name).await
    }

    // ── Dynamic documents ──────────────────────────────────────

    pub(crate) async fn put_dynamic(&self, thread: &ThreadId, name: &str, content: &str) -> Result<()> {
        let path = self.dynamic_dir(thread).join(format!("{name}.md"));
        fs::write_atomic(&path, content.as_bytes()).await?;
        debug!(thread_id = %thread, document = %name, "dynamic document written");
        Ok(())
    }

    /// Remove a thread's dynamic documents. Absent directories are fine.
    pub async fn clear_dynamic(&self, thread: &ThreadId) -> Result<()> {
        match tokio::fs::remove_dir_all(self.dynamic_dir(thread)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up any document by the name an import marker uses.
    pub(crate) async fn load(
        &self,
        thread: Option<&ThreadId>,
        name: &str,
    ) -> Result<Option<ContextDocument>> {
        if name == self.root_name {
            return read_document(&self.root_path(), name, DocumentKind::Root).await;
        }
        if name == STATE || name == HISTORY {
            let Some(thread) = thread else {
                return Ok(None);
            };
            let path = self.dynamic_dir(thread).join(format!("{name}.md"));
            return read_document(&path, name, DocumentKind::Dynamic).await;
        }
        if validate_document_name(name).is_err() {
            return Ok(None);
        }
        read_document(&self.static_path(name), name, DocumentKind::Static).await
    }
}

async fn read_document(path: &Path, name: &str, kind: DocumentKind) -> Result<Option<ContextDocument>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let last_modified = tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_default();
    Ok(Some(ContextDocument {
        name: name.to_string(),
        kind,
        content,
        last_modified,
    }))
}
