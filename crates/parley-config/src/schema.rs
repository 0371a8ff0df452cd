use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Agent name shipped in the sample config; refusing it forces a real setup.
pub const UNCONFIGURED: &str = "UNCONFIGURED";

/// Root configuration, maps to `parley.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub crm: CrmConfig,
    pub invoker: InvokerConfig,
    pub context: ContextConfig,
    pub logging: LoggingConfig,
    /// Resolved from the environment at load time; never read from or written to TOML.
    #[serde(skip)]
    pub credentials: Credentials,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name this listener registers under and signs published skills with.
    pub name: String,
    /// Working directory of the reasoning process. Holds the root document,
    /// `context/`, `threads/` and `dynamic/`.
    pub workdir: PathBuf,
    /// Name of the root context document (`<workdir>/<root_document>.md`).
    pub root_document: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: UNCONFIGURED.into(),
            workdir: PathBuf::from("agent"),
            root_document: "CLAUDE".into(),
        }
    }
}

impl AgentConfig {
    pub fn threads_dir(&self) -> PathBuf {
        self.workdir.join("threads")
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Enable permissive CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            cors: false,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.listen.parse().ok()
    }
}

// ── CRM / skill registry ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// Base URL of the CRM service that also hosts the skill registry.
    pub endpoint: String,
    /// Environment variable holding the CRM API key.
    pub api_key_env: String,
    /// Per-request timeout for registry and CRM calls.
    pub request_timeout_secs: u64,
    /// Forward replies and failures to the CRM stream endpoints.
    pub forward_replies: bool,
    /// Register this listener with the CRM on startup.
    pub register_on_start: bool,
    /// Address to advertise on registration. Discovered via `tailscale ip -4` when unset.
    pub advertise_ip: Option<String>,
    pub register_retries: u32,
    pub register_delay_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://crm.actionapi.ca".into(),
            api_key_env: "ACTO".into(),
            request_timeout_secs: 10,
            forward_replies: true,
            register_on_start: true,
            advertise_ip: None,
            register_retries: 5,
            register_delay_secs: 10,
        }
    }
}

// ── Invoker ────────────────────────────────────────────────────

/// How the external reasoning process is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    pub program: String,
    /// Arguments; each `{prompt}` is replaced by the inbound message. When no
    /// argument contains the placeholder the message is appended last.
    pub args: Vec<String>,
    /// Wall-clock bound per invocation.
    pub timeout_secs: u64,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            program: "claude".into(),
            args: vec![
                "-p".into(),
                "{prompt}".into(),
                "--output-format".into(),
                "text".into(),
                "--allowedTools".into(),
                "Bash,Edit,Read,Write,Glob,Grep,WebFetch".into(),
            ],
            timeout_secs: 300,
        }
    }
}

// ── Context ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Messages rendered into the `history` document.
    pub history_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { history_limit: 20 }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Credentials ────────────────────────────────────────────────

/// Secrets resolved from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Forwarded verbatim as `X-API-Key` to the CRM and registry.
    pub api_key: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl ParleyConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent ───
        let name = self.agent.name.trim();
        if name.is_empty() || name == UNCONFIGURED {
            warnings.push(ConfigWarning {
                field: "agent.name".into(),
                message: "agent is not configured".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set [agent] name in parley.toml or PARLEY_AGENT_NAME".into()),
            });
        }
        if parley_core::validate_document_name(&self.agent.root_document).is_err() {
            warnings.push(ConfigWarning {
                field: "agent.root_document".into(),
                message: format!("'{}' is not a valid document name", self.agent.root_document),
                severity: WarningSeverity::Error,
                hint: Some("Use letters, digits, dash or underscore, without '.md'".into()),
            });
        }

        // ── Server ───
        match self.server.socket_addr() {
            None => warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: format!("'{}' is not a socket address", self.server.listen),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '0.0.0.0:8080'".into()),
            }),
            Some(addr) if addr.port() == 0 => warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "port is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("The CRM needs a fixed port to reach this listener".into()),
            }),
            Some(_) => {}
        }

        // ── CRM ───
        if url::Url::parse(&self.crm.endpoint).is_err() {
            warnings.push(ConfigWarning {
                field: "crm.endpoint".into(),
                message: format!("'{}' is not a URL", self.crm.endpoint),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'https://crm.example.com'".into()),
            });
        }
        if self.credentials.api_key.as_deref().is_none_or(str::is_empty) {
            warnings.push(ConfigWarning {
                field: "crm.api_key_env".into(),
                message: format!("environment variable {} is not set", self.crm.api_key_env),
                severity: WarningSeverity::Error,
                hint: Some(format!("export {}=<api key>", self.crm.api_key_env)),
            });
        }

        // ── Invoker ───
        if self.invoker.program.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "invoker.program".into(),
                message: "program is empty".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if self.invoker.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "invoker.timeout_secs".into(),
                message: "timeout is 0, every invocation would time out".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 300".into()),
            });
        }

        // ── Context ───
        if self.context.history_limit == 0 {
            warnings.push(ConfigWarning {
                field: "context.history_limit".into(),
                message: "history document will always be empty".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
