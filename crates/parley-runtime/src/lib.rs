//! # parley-runtime
//!
//! Everything that happens between "a message arrived" and "the reply is on
//! disk":
//!
//! - [`InvocationSupervisor`] owns one run of the external reasoning process:
//!   spawn, feed the composed context, bound it in time, classify the exit.
//! - [`Engine`] drives delivery for a thread: take the lease, compose the
//!   context, invoke, commit the exchange (or record the failure), forward
//!   the outcome to the CRM.
//! - [`CrmClient`] is the CRM collaborator: reply/error forwarding and
//!   startup registration.

pub mod crm;
pub mod engine;
pub mod supervisor;

pub use crm::{CrmClient, HttpCrm, Registration};
pub use engine::{Delivery, Engine, Exchange};
pub use supervisor::{AgentReply, InvocationOutcome, InvocationState, InvocationSupervisor};
