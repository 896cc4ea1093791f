//! Loading and atomic persistence of the cache file and the index file.
//!
//! Writes go to `<name>.tmp` in the destination directory, are flushed to
//! disk, then renamed over the destination. Readers see either the old file
//! or the new one, never a partial write.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use super::clock::format_rfc3339;
use super::index::render_index;
use super::model::{CacheState, SCHEMA_VERSION};
use crate::Error;

/// Load the cache state at `path`.
///
/// A missing file yields an empty state. A corrupt file or a schema version
/// mismatch is logged and also yields an empty state: a full rebuild is the
/// recovery path, so this never fails.
pub async fn load(path: &Path, now: &DateTime<Utc>) -> CacheState {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheState::empty(now),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read cache file, starting fresh");
            return CacheState::empty(now);
        }
    };

    match decode(&raw) {
        Ok(state) if state.schema_version == SCHEMA_VERSION => state,
        Ok(state) => {
            tracing::warn!(
                path = %path.display(),
                expected = SCHEMA_VERSION,
                actual = state.schema_version,
                "cache schema version mismatch, starting fresh"
            );
            CacheState::empty(now)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to decode cache file, starting fresh");
            CacheState::empty(now)
        }
    }
}

fn decode(raw: &str) -> Result<CacheState, Error> {
    let mut state: CacheState = serde_json::from_str(raw)?;
    state.restamp();
    Ok(state)
}

/// Serialize with sorted object keys so identical states produce identical bytes.
pub fn encode(state: &CacheState) -> Result<String, Error> {
    let value = serde_json::to_value(state)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Stamp `generated_at` and atomically write the cache file.
pub async fn persist(state: &mut CacheState, path: &Path, now: &DateTime<Utc>) -> Result<(), Error> {
    state.generated_at = format_rfc3339(now);
    let encoded = encode(state)?;
    atomic_write(path, encoded.as_bytes()).await
}

/// Atomically write the rendered index entries.
pub async fn write_index(entries: &[String], path: &Path) -> Result<(), Error> {
    atomic_write(path, render_index(entries).as_bytes()).await
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` to a sibling temp file, fsync it, and rename over `path`.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
