use console::style;
use parley_config::ParleyConfig;
use parley_context::{ContextStore, HISTORY, STATE};
use std::path::{Path, PathBuf};

/// One line of the prerequisite report.
#[derive(Debug)]
pub(super) struct Check {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Print the report; exit code 1 when anything is missing.
pub(super) async fn cmd_check(config: &ParleyConfig, config_path: &Path) -> i32 {
    println!("{}", style("Parley prerequisite check").bold());
    println!("   Config: {}", config_path.display());
    println!();

    let checks = prerequisites(config).await;
    for check in &checks {
        let mark = if check.ok {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!("  {mark} {:<12} {}", check.name, check.detail);
    }

    let failed = checks.iter().filter(|c| !c.ok).count();
    println!();
    if failed == 0 {
        println!("  {}", style("ready to start").green());
        0
    } else {
        println!("  {}", style(format!("{failed} check(s) failed")).red());
        1
    }
}

pub(super) async fn prerequisites(config: &ParleyConfig) -> Vec<Check> {
    let mut checks = Vec::new();

    checks.push(match config.validate() {
        Ok(warnings) if warnings.is_empty() => Check::pass("config", "valid"),
        Ok(warnings) => Check::pass("config", format!("valid, {} warning(s)", warnings.len())),
        Err(e) => Check::fail("config", e),
    });

    checks.push(match config.credentials.api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            Check::pass("credential", format!("${} is set", config.crm.api_key_env))
        }
        _ => Check::fail("credential", format!("${} is not set", config.crm.api_key_env)),
    });

    checks.push(match find_program(&config.invoker.program) {
        Some(path) => Check::pass("invoker", path.display().to_string()),
        None => Check::fail(
            "invoker",
            format!("'{}' not found on PATH", config.invoker.program),
        ),
    });

    let workdir = &config.agent.workdir;
    if !workdir.is_dir() {
        checks.push(Check::fail(
            "workdir",
            format!("{} is not a directory", workdir.display()),
        ));
        return checks;
    }
    checks.push(Check::pass("workdir", workdir.display().to_string()));
    checks.push(check_root(&ContextStore::from_config(&config.agent)).await);
    checks
}

/// The root document exists and every static document it imports is present.
async fn check_root(store: &ContextStore) -> Check {
    let root = match store.root().await {
        Ok(root) => root,
        Err(_) => {
            return Check::fail(
                "root",
                format!("{} is missing", store.root_path().display()),
            );
        }
    };
    let mut missing = Vec::new();
    for name in root.imports() {
        if name == STATE || name == HISTORY {
            continue;
        }
        if !store.exists(&name).await.unwrap_or(false) {
            missing.push(name);
        }
    }
    if missing.is_empty() {
        Check::pass(
            "root",
            format!("{} ({} imports)", store.root_path().display(), root.imports().len()),
        )
    } else {
        Check::fail("root", format!("missing imports: {}", missing.join(", ")))
    }
}

/// Locate `program` the way `exec` would: as a path when it has a
/// separator, otherwise on `PATH`.
fn find_program(program: &str) -> Option<PathBuf> {
    if program.trim().is_empty() {
        return None;
    }
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}
