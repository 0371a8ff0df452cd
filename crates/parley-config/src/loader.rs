use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::{Credentials, ParleyConfig};

/// Loads the Parley configuration once at startup.
pub struct ConfigLoader {
    config: Arc<ParleyConfig>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > PARLEY_CONFIG env > ./parley.toml > ~/.parley/parley.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        let local = PathBuf::from("parley.toml");
        if local.exists() {
            return local;
        }
        dirs::home_dir()
            .map(|home| home.join(".parley").join("parley.toml"))
            .unwrap_or(local)
    }

    /// Load and validate against the process environment.
    pub fn load(path: Option<&Path>) -> parley_core::Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load and validate, reading environment variables through `env`.
    pub fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> parley_core::Result<Self> {
        let loader = Self::read_with_env(path, env)?;
        match loader.config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(parley_core::ParleyError::Config(e));
            }
        }
        Ok(loader)
    }

    /// Parse and apply env overrides without validating.
    pub fn read(path: Option<&Path>) -> parley_core::Result<Self> {
        Self::read_with_env(path, |key| std::env::var(key).ok())
    }

    fn read_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> parley_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let mut config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            ParleyConfig::default()
        };

        // Relative working directories are anchored at the config file.
        if config.agent.workdir.is_relative() {
            if let Some(base) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.agent.workdir = base.join(&config.agent.workdir);
            }
        }

        Ok(Self {
            config: Arc::new(Self::apply_env_overrides(config, &env)),
            config_path,
        })
    }

    fn parse(raw: &str, path: &Path) -> parley_core::Result<ParleyConfig> {
        toml::from_str::<ParleyConfig>(raw).map_err(|e| {
            parley_core::ParleyError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// The loaded configuration. Shared, never mutated after load.
    pub fn get(&self) -> Arc<ParleyConfig> {
        Arc::clone(&self.config)
    }

    /// Path the configuration was read from (or would have been).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (PARLEY_AGENT_NAME, PARLEY_LISTEN, etc.) and
    /// resolve the CRM credential from the variable named by `crm.api_key_env`.
    pub fn apply_env_overrides(
        mut config: ParleyConfig,
        env: &impl Fn(&str) -> Option<String>,
    ) -> ParleyConfig {
        if let Some(v) = env("PARLEY_AGENT_NAME") {
            config.agent.name = v;
        }
        if let Some(v) = env("PARLEY_WORKDIR") {
            config.agent.workdir = PathBuf::from(v);
        }
        if let Some(v) = env("PARLEY_LISTEN") {
            config.server.listen = v;
        }
        if let Some(v) = env("PARLEY_CRM_ENDPOINT") {
            config.crm.endpoint = v;
        }
        if let Some(v) = env("PARLEY_INVOKER_PROGRAM") {
            config.invoker.program = v;
        }
        if let Some(v) = env("PARLEY_LOG_LEVEL") {
            config.logging.level = v;
        }
        config.credentials = Credentials {
            api_key: env(&config.crm.api_key_env).filter(|k| !k.is_empty()),
        };
        config
    }
}
