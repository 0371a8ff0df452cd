use console::style;
use parley_config::ParleyConfig;
use parley_context::ContextStore;
use parley_core::{ParleyError, Result};
use parley_runtime::{CrmClient, Engine, HttpCrm, crm::register_with_retries};
use parley_server::AppState;
use parley_skills::{HttpRegistry, RegistryClient, SkillSync};
use std::sync::Arc;
use tracing::{info, warn};

pub(super) async fn cmd_start(config: Arc<ParleyConfig>) -> Result<()> {
    let warnings = config.validate().map_err(ParleyError::Config)?;
    for w in &warnings {
        warn!("{}", w);
    }

    println!("{} v{}", style("parley").bold(), env!("CARGO_PKG_VERSION"));
    println!("   Agent: {}", config.agent.name);
    println!("   Workdir: {}", config.agent.workdir.display());
    println!("   Listen: {}", config.server.listen);

    let crm: Arc<dyn CrmClient> = Arc::new(HttpCrm::from_config(&config)?);
    let registry: Arc<dyn RegistryClient> = Arc::new(HttpRegistry::from_config(&config)?);
    let engine = Arc::new(Engine::new(config.clone(), Some(crm.clone())));

    let recovered = engine.threads().recover().await?;
    if recovered > 0 {
        warn!(threads = recovered, "threads interrupted by the last shutdown marked errored");
    }

    let store = engine.composer().store().clone();
    print_banner(&store).await;

    let skills = SkillSync::new(store, registry, &config.agent.name);

    if config.crm.register_on_start {
        let config = config.clone();
        tokio::spawn(async move {
            register_with_retries(crm, &config).await;
        });
    }

    let state = Arc::new(AppState::new(config, engine, skills));
    parley_server::start_server(state, shutdown_signal()).await
}

/// Root imports and available static documents.
async fn print_banner(store: &ContextStore) {
    match store.root().await {
        Ok(root) => {
            let imports = root.imports();
            println!("   Root: {} ({} imports)", store.root_path().display(), imports.len());
            for name in imports {
                println!("     @context/{name}.md");
            }
        }
        Err(e) => {
            println!("   Root: {}", style(format!("unavailable ({e})")).yellow());
        }
    }
    match store.list().await {
        Ok(docs) => {
            println!("   Context files: {}", docs.len());
            for doc in docs {
                let mark = if doc.included { "*" } else { " " };
                println!("    {mark} {} ({} bytes)", doc.name, doc.size_bytes);
            }
        }
        Err(e) => warn!(error = %e, "failed to list context documents"),
    }
    println!();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
