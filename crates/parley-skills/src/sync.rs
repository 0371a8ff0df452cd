use parley_context::ContextStore;
use parley_core::{ContextDocument, ParleyError, Result, validate_document_name};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::registry::{PublishAck, RegistryClient, RemoteSkill};

/// Outcome of publishing every local skill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub published: Vec<String>,
    pub failed: Vec<SyncFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub name: String,
    pub error: String,
}

/// Reconciles local static documents with the remote skill registry.
#[derive(Clone)]
pub struct SkillSync {
    store: ContextStore,
    registry: Arc<dyn RegistryClient>,
    agent_name: String,
}

impl SkillSync {
    pub fn new(
        store: ContextStore,
        registry: Arc<dyn RegistryClient>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            agent_name: agent_name.into(),
        }
    }

    fn check_name(&self, name: &str) -> Result<()> {
        validate_document_name(name)?;
        if self.store.is_reserved(name) {
            return Err(ParleyError::InvalidName(format!("{name:?} is not a skill")));
        }
        Ok(())
    }

    pub async fn available(&self) -> Result<Vec<RemoteSkill>> {
        self.registry.list().await
    }

    /// Fetch a skill into `context/<name>.md`.
    ///
    /// An existing local document is only replaced when `overwrite` is set;
    /// otherwise the pull fails with `Conflict` before contacting the registry.
    pub async fn pull(&self, name: &str, overwrite: bool) -> Result<ContextDocument> {
        self.check_name(name)?;
        if !overwrite && self.store.exists(name).await? {
            return Err(ParleyError::Conflict(name.to_string()));
        }
        let skill = self.registry.fetch(name).await?;
        let doc = self.store.put(name, &skill.content).await?;
        info!(skill = %name, chars = skill.content.len(), overwrite, "skill pulled");
        Ok(doc)
    }

    /// Push the local document `name` to the registry under this agent's name.
    pub async fn publish(&self, name: &str) -> Result<PublishAck> {
        self.check_name(name)?;
        let doc = self.store.get(name).await?;
        let ack = self
            .registry
            .publish(name, &doc.content, &self.agent_name)
            .await?;
        info!(skill = %name, "skill published");
        Ok(ack)
    }

    /// Publish every static document in name order, collecting failures.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for name in self.store.static_names().await? {
            match self.publish(&name).await {
                Ok(_) => report.published.push(name),
                Err(e) => {
                    warn!(skill = %name, error = %e, "skill sync failed");
                    report.failed.push(SyncFailure {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            published = report.published.len(),
            failed = report.failed.len(),
            "skill sync complete"
        );
        Ok(report)
    }
}
