//! `nubase migration new` - create an empty timestamped migration file.

use anyhow::Result;
use colored::*;

use crate::files;
use crate::project::Project;

pub fn migration_new(name: &str) -> Result<()> {
    let project = Project::discover()?;
    let body = format!("-- Migration: {name}\n-- Write your SQL below.\n");
    let file = files::write(&project.migrations_dir(), name, &body)?;

    println!("{} Created {}", "✓".green(), file.path.display());
    println!();
    println!("  Edit the file, then run {} to apply it", "nubase db push".cyan());
    Ok(())
}
