//! # parley-store
//!
//! The thread store: one JSON record per conversation thread, committed with
//! write-then-rename so readers only ever see complete records, plus the
//! per-thread lease table that keeps at most one writer (and therefore at
//! most one invocation) active per thread.

pub mod lease;
pub mod store;

pub use lease::ThreadLease;
pub use store::ThreadStore;
