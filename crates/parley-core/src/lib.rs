//! # parley-core
//!
//! Core types and primitives for the Parley agent listener. This crate defines
//! the shared vocabulary used by every other crate in the workspace: the
//! error taxonomy, thread and message records, context documents, and the
//! atomic file-replace helper every persistent component commits through.

pub mod document;
pub mod error;
pub mod fs;
pub mod message;
pub mod thread;
pub mod types;

pub use document::{ContextDocument, DocumentKind};
pub use error::{ErrorClass, ExitInfo, ParleyError, Result};
pub use message::{Message, MessageOrigin, Role};
pub use thread::{Thread, ThreadStatus, ThreadSummary};
pub use types::{ThreadId, validate_document_name};
