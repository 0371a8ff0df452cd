//! # parley-config
//!
//! Configuration for the Parley listener. Reads `parley.toml`, applies
//! environment overrides, resolves the CRM credential from the environment,
//! and validates the result once at startup. The loaded value is immutable
//! for the life of the process.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    AgentConfig, ConfigWarning, ContextConfig, CrmConfig, Credentials, InvokerConfig,
    LoggingConfig, ParleyConfig, ServerConfig, WarningSeverity,
};
