use clap::{Parser, Subcommand};
use parley_config::{ConfigLoader, ParleyConfig};
use parley_core::{ParleyError, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod check;
mod start;

/// Parley: per-agent message listener
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to parley.toml config file
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the listener (HTTP dispatcher + CRM registration)
    Start,
    /// Check that every prerequisite for `start` is in place
    Check,
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version and build info
    Version,
}

impl Cli {
    /// Run the selected command and return the process exit code.
    pub async fn run(self) -> Result<i32> {
        // Validation is left to each command so `check` can report every problem.
        let config_loader = ConfigLoader::read(self.config.as_deref())?;
        let config = config_loader.get();
        self.init_logging(&config);

        match self.command {
            Commands::Start => start::cmd_start(config).await.map(|()| 0),
            Commands::Check => Ok(check::cmd_check(&config, config_loader.path()).await),
            Commands::Config { json } => {
                println!("{}", render_config(&config, json)?);
                Ok(0)
            }
            Commands::Version => {
                cmd_version();
                Ok(0)
            }
        }
    }

    /// Level: --verbose > --quiet > --log-level > RUST_LOG > logging.level.
    fn init_logging(&self, config: &ParleyConfig) {
        let explicit = if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("error")
        } else {
            self.log_level.as_deref()
        };
        let filter = match explicit {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        };

        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
    }
}

/// The effective configuration as TOML or JSON, credential redacted.
fn render_config(config: &ParleyConfig, json: bool) -> Result<String> {
    let credential = config.credentials.api_key.as_ref().map(|_| "<redacted>");
    if json {
        let mut value = serde_json::to_value(config)?;
        value["credentials"] = serde_json::json!({
            "env": config.crm.api_key_env,
            "api_key": credential,
        });
        return Ok(serde_json::to_string_pretty(&value)?);
    }
    let mut text = toml::to_string_pretty(config).map_err(|e| ParleyError::Config(e.to_string()))?;
    text.push_str(&format!(
        "\n# credential ({}): {}\n",
        config.crm.api_key_env,
        credential.unwrap_or("unset")
    ));
    Ok(text)
}

fn cmd_version() {
    println!("parley v{}", env!("CARGO_PKG_VERSION"));
    println!("   Target: {}", std::env::consts::ARCH);
    println!("   OS: {}", std::env::consts::OS);
    #[cfg(debug_assertions)]
    println!("   Profile: debug");
    #[cfg(not(debug_assertions))]
    println!("   Profile: release");
}
