//! Schema snapshot persistence.
//!
//! Each environment gets one JSON file under `nubase/snapshots/` holding the
//! last known extracted [`SchemaModel`]. Writes go through a temp file and a
//! rename so an interrupted write never leaves a truncated snapshot behind.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nubase_pg::SchemaModel;

pub fn snapshot_path(snapshots_dir: &Path, env: &str) -> PathBuf {
    snapshots_dir.join(format!("{env}.json"))
}

/// Load the stored snapshot for an environment. A missing file is not an
/// error: it means no snapshot has been taken yet.
pub fn load(snapshots_dir: &Path, env: &str) -> Result<Option<SchemaModel>> {
    let path = snapshot_path(snapshots_dir, env);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let model = serde_json::from_str(&raw)
        .with_context(|| format!("Corrupt snapshot {}", path.display()))?;
    Ok(Some(model))
}

/// Persist a snapshot atomically.
pub fn save(snapshots_dir: &Path, env: &str, model: &SchemaModel) -> Result<PathBuf> {
    std::fs::create_dir_all(snapshots_dir)
        .with_context(|| format!("Failed to create {}", snapshots_dir.display()))?;

    let path = snapshot_path(snapshots_dir, env);
    let tmp = snapshots_dir.join(format!(".{env}.json.tmp"));
    let json = serde_json::to_string_pretty(model).context("Failed to serialize snapshot")?;
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(path)
}
