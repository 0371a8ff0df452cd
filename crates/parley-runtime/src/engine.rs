use parley_config::ParleyConfig;
use parley_context::ContextComposer;
use parley_core::{Message, MessageOrigin, ParleyError, Result, Thread, ThreadId};
use parley_store::{ThreadLease, ThreadStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::crm::CrmClient;
use crate::supervisor::{AgentReply, InvocationSupervisor};

/// An inbound message.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Target thread; a fresh one is created when absent.
    pub thread_id: Option<ThreadId>,
    pub message: String,
    pub origin: MessageOrigin,
}

impl Delivery {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            thread_id: None,
            message: message.into(),
            origin: MessageOrigin::default(),
        }
    }

    pub fn to_thread(mut self, id: ThreadId) -> Self {
        self.thread_id = Some(id);
        self
    }

    pub fn from_origin(mut self, origin: MessageOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// A committed user message + agent reply.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub thread: Thread,
    pub reply: AgentReply,
}

/// Owns the thread store, the composer and the supervisor, and runs the
/// message flow: lease, compose, invoke, commit, forward.
pub struct Engine {
    config: Arc<ParleyConfig>,
    threads: ThreadStore,
    composer: ContextComposer,
    supervisor: InvocationSupervisor,
    crm: Option<Arc<dyn CrmClient>>,
}

impl Engine {
    pub fn new(config: Arc<ParleyConfig>, crm: Option<Arc<dyn CrmClient>>) -> Self {
        Self {
            threads: ThreadStore::new(config.agent.threads_dir()),
            composer: ContextComposer::from_config(&config),
            supervisor: InvocationSupervisor::from_config(&config),
            crm: crm.filter(|_| config.crm.forward_replies),
            config,
        }
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    pub fn threads(&self) -> &ThreadStore {
        &self.threads
    }

    pub fn composer(&self) -> &ContextComposer {
        &self.composer
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.invoker.timeout_secs)
    }

    /// Take the target thread's lease, allocating an id when none was given.
    fn lease_for(&self, delivery: &Delivery) -> Result<ThreadLease> {
        if delivery.message.trim().is_empty() {
            return Err(ParleyError::InvalidRequest("message required".into()));
        }
        let id = delivery.thread_id.clone().unwrap_or_else(ThreadId::generate);
        self.threads.acquire(&id)
    }

    /// Deliver a message and wait for the committed exchange.
    ///
    /// Fails with `Busy` when the thread already has an invocation in flight.
    pub async fn deliver(&self, delivery: Delivery) -> Result<Exchange> {
        let lease = self.lease_for(&delivery)?;
        self.run(lease, delivery).await
    }

    /// Take the lease now, finish the invocation in the background.
    ///
    /// `Busy` and invalid requests are still reported to the caller; the
    /// eventual reply or failure only reaches the CRM.
    pub fn deliver_detached(self: &Arc<Self>, delivery: Delivery) -> Result<ThreadId> {
        let lease = self.lease_for(&delivery)?;
        let id = lease.thread_id().clone();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let thread_id = lease.thread_id().clone();
            if let Err(e) = engine.run(lease, delivery).await {
                warn!(thread_id = %thread_id, error = %e, "detached delivery failed");
            }
        });
        Ok(id)
    }

    /// Delete a thread's record and its dynamic documents, both under the
    /// thread's lease. `Busy` while an invocation is in flight.
    pub async fn delete_thread(&self, id: &ThreadId) -> Result<()> {
        let lease = self.threads.acquire(id)?;
        self.threads.delete_with(&lease).await?;
        if let Err(e) = self.composer.store().clear_dynamic(id).await {
            warn!(thread_id = %id, error = %e, "failed to remove dynamic context");
        }
        drop(lease);
        Ok(())
    }

    async fn run(&self, lease: ThreadLease, delivery: Delivery) -> Result<Exchange> {
        let id = lease.thread_id().clone();
        info!(
            thread_id = %id,
            sender = %delivery.origin.sender,
            channel = %delivery.origin.channel,
            chars = delivery.message.len(),
            "message received"
        );

        let thread = self.threads.begin_invocation(&lease).await?;
        match self.invoke(&thread, &delivery).await {
            Ok(reply) => {
                let user = Message::user(&delivery.message).with_origin(delivery.origin.clone());
                let agent = Message::agent(&reply.text);
                let thread = self.threads.complete_invocation(&lease, vec![user, agent]).await?;
                drop(lease);
                info!(thread_id = %id, messages = thread.messages.len(), "exchange committed");
                self.forward_reply(&id, &delivery.origin, &reply.text).await;
                Ok(Exchange { thread, reply })
            }
            Err(e) => {
                if let Err(store_err) = self.threads.fail_invocation(&lease, &e).await {
                    error!(thread_id = %id, error = %store_err, "failed to record invocation failure");
                }
                drop(lease);
                self.forward_error(&id, &delivery.origin, &e).await;
                Err(e)
            }
        }
    }

    async fn invoke(&self, thread: &Thread, delivery: &Delivery) -> Result<AgentReply> {
        let context = self
            .composer
            .compose(thread, Some(&delivery.origin))
            .await?;
        self.supervisor
            .invoke(&thread.id, &context, &delivery.message, self.timeout())
            .await
            .into_result()
    }

    async fn forward_reply(&self, id: &ThreadId, origin: &MessageOrigin, reply: &str) {
        if let Some(crm) = &self.crm {
            if let Err(e) = crm.forward_reply(id, origin, reply).await {
                warn!(thread_id = %id, error = %e, "failed to forward reply to CRM");
            }
        }
    }

    async fn forward_error(&self, id: &ThreadId, origin: &MessageOrigin, error: &ParleyError) {
        if let Some(crm) = &self.crm {
            if let Err(e) = crm.forward_error(id, origin, &error.to_string()).await {
                warn!(thread_id = %id, error = %e, "failed to forward error to CRM");
            }
        }
    }
}
