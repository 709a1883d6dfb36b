//! Database commands: diff, pull, push, reset.
//!
//! Every command resolves the same context first: discover the project, load
//! `nubase.toml`, pick the environment, expand the connection URL. The
//! connection itself is opened lazily by each command so `--dry-run` paths
//! that never touch the server stay offline where possible.

mod diff;
mod pull;
mod push;
mod reset;

pub use diff::db_diff;
pub use pull::db_pull;
pub use push::db_push;
pub use reset::db_reset;

use std::io::Write;

use anyhow::{Context, Result};

use crate::config::NubaseConfig;
use crate::project::Project;

pub struct CommandContext {
    pub project: Project,
    pub env: String,
    pub url: String,
    pub schemas: Vec<String>,
}

pub fn load_context(env_flag: Option<&str>) -> Result<CommandContext> {
    let project = Project::discover()?;
    let config = NubaseConfig::load(&project.config_path())?;
    let env = config.resolve_environment(env_flag)?;
    let url = config.url(&env)?;
    let schemas = config.schemas();
    tracing::debug!(root = %project.root.display(), env = %env, "resolved project context");
    Ok(CommandContext { project, env, url, schemas })
}

/// Interactive yes/no prompt, defaulting to no.
pub fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush().context("Failed to flush stdout")?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
