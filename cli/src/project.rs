//! Project discovery.
//!
//! A nubase project is any directory containing `nubase/nubase.toml`.
//! Commands work from anywhere inside the project by walking up from the
//! current directory, the same way git finds its repository root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const PROJECT_DIR: &str = "nubase";
pub const CONFIG_FILE: &str = "nubase.toml";

#[derive(Debug, Clone)]
pub struct Project {
    /// Directory containing the `nubase/` folder.
    pub root: PathBuf,
}

impl Project {
    /// Walk up from the current directory until `nubase/nubase.toml` is
    /// found. Also accepts being invoked from inside the `nubase/` folder
    /// itself.
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Self::discover_from(&cwd)
    }

    pub fn discover_from(start: &Path) -> Result<Self> {
        for dir in start.ancestors() {
            if dir.join(PROJECT_DIR).join(CONFIG_FILE).is_file() {
                return Ok(Self { root: dir.to_path_buf() });
            }
            // Invoked from within nubase/ itself.
            if dir.file_name().is_some_and(|n| n == PROJECT_DIR) && dir.join(CONFIG_FILE).is_file()
            {
                let root = dir.parent().unwrap_or(dir).to_path_buf();
                return Ok(Self { root });
            }
        }
        bail!(
            "No nubase project found (looked for {PROJECT_DIR}/{CONFIG_FILE} in {} and its parents)",
            start.display()
        );
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(PROJECT_DIR).join(CONFIG_FILE)
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR).join("migrations")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR).join("snapshots")
    }
}
