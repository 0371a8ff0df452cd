//! # parley-skills
//!
//! Skills are static context documents shared between agents through the
//! CRM's skill registry. [`SkillSync`] reconciles the local `context/`
//! directory with the registry; the registry itself sits behind the
//! [`RegistryClient`] trait so the HTTP client can be swapped for a fake.
//!
//! Local documents are never overwritten by a pull unless the caller asks
//! for it, and a bulk sync reports per-skill failures instead of stopping
//! at the first one.

pub mod registry;
pub mod sync;

pub use registry::{HttpRegistry, PublishAck, RegistryClient, RemoteSkill};
pub use sync::{SkillSync, SyncFailure, SyncReport};
