//! Migration file store.
//!
//! Migrations are plain `.sql` files under `nubase/migrations/`, named
//! `<14-digit UTC timestamp>_<slug>.sql`. Lexicographic filename order is
//! application order, so listing stays a simple directory scan.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Filename without the `.sql` extension; this is the name recorded in
    /// the ledger.
    pub name: String,
    pub filename: String,
    pub path: PathBuf,
}

impl MigrationFile {
    pub fn read_sql(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

/// List migration files in application order. Non-`.sql` entries are
/// ignored so editors can leave droppings in the directory.
pub fn list(migrations_dir: &Path) -> Result<Vec<MigrationFile>> {
    let entries = match std::fs::read_dir(migrations_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read {}", migrations_dir.display()));
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", migrations_dir.display()))?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "sql") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        files.push(MigrationFile {
            name: stem.to_string(),
            filename: format!("{stem}.sql"),
            path,
        });
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

/// The files not yet recorded as applied, in application order. `all` must
/// come from [`list`] so the sort order is preserved.
pub fn pending(all: Vec<MigrationFile>, applied: &BTreeSet<String>) -> Vec<MigrationFile> {
    all.into_iter().filter(|f| !applied.contains(&f.name)).collect()
}

/// Write a new migration file with a fresh timestamp prefix. If two writes
/// land in the same second the second one gets a numeric suffix rather than
/// clobbering the first.
pub fn write(migrations_dir: &Path, label: &str, sql: &str) -> Result<MigrationFile> {
    std::fs::create_dir_all(migrations_dir)
        .with_context(|| format!("Failed to create {}", migrations_dir.display()))?;

    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let base = format!("{timestamp}_{}", slugify(label));

    let mut name = base.clone();
    let mut attempt = 2;
    while migrations_dir.join(format!("{name}.sql")).exists() {
        name = format!("{base}_{attempt}");
        attempt += 1;
    }

    let filename = format!("{name}.sql");
    let path = migrations_dir.join(&filename);
    std::fs::write(&path, sql).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(MigrationFile { name, filename, path })
}

/// Lowercase alphanumerics with single underscores, trimmed at the edges.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut last_was_separator = true;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            slug.push('_');
            last_was_separator = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() { "migration".to_string() } else { slug }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_labels() {
        assert_eq!(slugify("Add Users Table"), "add_users_table");
        assert_eq!(slugify("fix--weird  spacing!"), "fix_weird_spacing");
        assert_eq!(slugify("___"), "migration");
        assert_eq!(slugify("CamelCase123"), "camelcase123");
    }

    #[test]
    fn missing_directory_lists_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn lists_sql_files_in_timestamp_order() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("20260102030405_second.sql"), "-- b").unwrap();
        std::fs::write(tmp.path().join("20250102030405_first.sql"), "-- a").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(tmp.path().join(".hidden.sql.tmp"), "ignored").unwrap();

        let files = list(tmp.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["20250102030405_first", "20260102030405_second"]);
    }

    fn entry(name: &str) -> MigrationFile {
        MigrationFile {
            name: name.to_string(),
            filename: format!("{name}.sql"),
            path: PathBuf::from(format!("{name}.sql")),
        }
    }

    #[test]
    fn pending_skips_the_applied_prefix() {
        let all = vec![
            entry("20240101000000_a"),
            entry("20240102000000_b"),
            entry("20240103000000_c"),
        ];
        let applied = BTreeSet::from(["20240101000000_a".to_string()]);

        let remaining = pending(all.clone(), &applied);
        let names: Vec<&str> = remaining.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["20240102000000_b", "20240103000000_c"]);

        assert_eq!(pending(all.clone(), &BTreeSet::new()), all);
        let everything: BTreeSet<String> = all.iter().map(|f| f.name.clone()).collect();
        assert!(pending(all, &everything).is_empty());
    }

    #[test]
    fn write_creates_timestamped_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = write(tmp.path(), "Add users", "CREATE TABLE users ();").unwrap();
        assert!(file.filename.ends_with("_add_users.sql"));
        // 14-digit prefix plus separator.
        assert_eq!(&file.name[14..15], "_");
        assert!(file.name[..14].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(file.read_sql().unwrap(), "CREATE TABLE users ();");
    }

    #[test]
    fn same_second_collision_gets_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let first = write(tmp.path(), "x", "-- 1").unwrap();
        // Force a collision regardless of clock granularity.
        let second_path = tmp.path().join(&first.filename);
        assert!(second_path.exists());
        let second = write(tmp.path(), "x", "-- 2").unwrap();
        if second.name.starts_with(&first.name) {
            assert!(second.name.ends_with("_2"));
        }
        assert_ne!(first.filename, second.filename);
    }
}
