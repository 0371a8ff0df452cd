use parley_config::ParleyConfig;
use parley_core::{ContextDocument, MessageOrigin, ParleyError, Result, Thread, ThreadId};
use std::collections::HashSet;
use tracing::debug;

use crate::render;
use crate::store::{ContextStore, HISTORY, STATE};

/// Builds the context bundle for one invocation.
#[derive(Debug, Clone)]
pub struct ContextComposer {
    store: ContextStore,
    agent_name: String,
    history_limit: usize,
}

impl ContextComposer {
    pub fn new(store: ContextStore, agent_name: impl Into<String>, history_limit: usize) -> Self {
        Self {
            store,
            agent_name: agent_name.into(),
            history_limit,
        }
    }

    pub fn from_config(config: &ParleyConfig) -> Self {
        Self::new(
            ContextStore::from_config(&config.agent),
            &config.agent.name,
            config.context.history_limit,
        )
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Regenerate the thread's `state` and `history` documents.
    pub async fn materialize(&self, thread: &Thread, origin: Option<&MessageOrigin>) -> Result<()> {
        let state = render::state(thread, origin, &self.agent_name, self.store.workdir());
        let history = render::history(thread, self.history_limit, &self.agent_name);
        self.store.put_dynamic(&thread.id, STATE, &state).await?;
        self.store.put_dynamic(&thread.id, HISTORY, &history).await?;
        debug!(
            thread_id = %thread.id,
            history = thread.recent(self.history_limit).len(),
            "dynamic context materialized"
        );
        Ok(())
    }

    /// Walk the root document's imports depth-first, in textual order.
    ///
    /// Each document is returned once, at its first visit. Dynamic documents
    /// come from `thread`'s directory; without a thread they count as missing.
    pub async fn resolve(&self, thread: Option<&ThreadId>) -> Result<Vec<ContextDocument>> {
        let root_name = self.store.root_name().to_string();
        let root = self
            .store
            .load(thread, &root_name)
            .await?
            .ok_or_else(|| ParleyError::MissingContext(root_name.clone()))?;

        let mut visited: HashSet<String> = HashSet::from([root_name.clone()]);
        let mut path: Vec<String> = vec![root_name];
        let mut pending: Vec<(Vec<String>, usize)> = vec![(root.imports(), 0)];
        let mut order = vec![root];

        while let Some((imports, next)) = pending.last_mut() {
            let Some(name) = imports.get(*next).cloned() else {
                pending.pop();
                path.pop();
                continue;
            };
            *next += 1;

            if let Some(start) = path.iter().position(|n| *n == name) {
                let mut cycle = path[start..].to_vec();
                cycle.push(name);
                return Err(ParleyError::CycleDetected { path: cycle });
            }
            if !visited.insert(name.clone()) {
                continue;
            }

            let doc = self
                .store
                .load(thread, &name)
                .await?
                .ok_or_else(|| ParleyError::MissingContext(name.clone()))?;
            pending.push((doc.imports(), 0));
            path.push(name);
            order.push(doc);
        }
        Ok(order)
    }

    /// Materialize the thread's dynamic documents, then resolve and join
    /// every document body with a blank line.
    pub async fn compose(&self, thread: &Thread, origin: Option<&MessageOrigin>) -> Result<String> {
        self.materialize(thread, origin).await?;
        let documents = self.resolve(Some(&thread.id)).await?;
        let composed = documents
            .iter()
            .map(ContextDocument::body)
            .filter(|body| !body.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        debug!(
            thread_id = %thread.id,
            documents = documents.len(),
            bytes = composed.len(),
            "context composed"
        );
        Ok(composed)
    }
}
