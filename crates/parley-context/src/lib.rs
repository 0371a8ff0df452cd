//! # parley-context
//!
//! Context documents handed to the reasoning process. The [`ContextStore`]
//! owns where documents live on disk (root document, authored `context/*.md`,
//! per-thread dynamic documents); the [`ContextComposer`] regenerates the
//! dynamic ones from a thread snapshot and resolves the root document's
//! `@context/<name>.md` imports into a single composed bundle.
//!
//! ## Resolution
//!
//! Imports are followed depth-first in textual order. Every document appears
//! once in the output (first visit wins), so diamonds are fine; a document
//! that imports one of its own ancestors is a cycle and fails resolution.

pub mod composer;
pub mod render;
pub mod store;

pub use composer::ContextComposer;
pub use store::{ContextStore, DocumentInfo, HISTORY, STATE};
