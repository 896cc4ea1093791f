//! Files under a root directory.
//!
//! Source ids are `/`-separated paths relative to the root. A file counts as
//! unchanged while both its size and mtime match the record; only then is
//! the read-and-hash skipped. An edit that preserves both is not noticed
//! until one of them moves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use walkdir::WalkDir;

use super::{Discovered, SourceProvider};
use crate::Error;
use crate::cache::hash::hash_text;
use crate::cache::{CacheRecord, CacheState, FileMeta, SourceMeta, SourceType};

/// Provider for every non-hidden file below `root`.
pub struct FileFolderProvider {
    name: String,
    root: PathBuf,
    files: RwLock<BTreeMap<String, PathBuf>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStat {
    size_bytes: u64,
    mtime_ns: i64,
}

impl FileFolderProvider {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), root: root.into(), files: RwLock::new(BTreeMap::new()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn path_of(&self, source_id: &str) -> Option<PathBuf> {
        self.files.read().await.get(source_id).cloned()
    }
}

fn walk(root: &Path) -> BTreeMap<String, PathBuf> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return files;
    }

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "failed to walk file source");
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        match parts {
            Some(parts) => {
                files.insert(parts.join("/"), entry.path().to_path_buf());
            }
            None => tracing::warn!(path = %entry.path().display(), "skipping file source with non-UTF8 name"),
        }
    }
    files
}

async fn stat(path: &Path) -> Option<FileStat> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to stat file source");
            return None;
        }
    };
    let mtime_ns = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX));
    Some(FileStat { size_bytes: metadata.len(), mtime_ns })
}

/// Read a file as UTF-8; non-UTF8 content is skipped with a warning.
async fn read_utf8(path: &Path) -> Option<String> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read file source");
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(_) => {
            tracing::warn!(path = %path.display(), "skipping non-UTF8 file source");
            None
        }
    }
}

#[async_trait::async_trait]
impl SourceProvider for FileFolderProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::File
    }

    async fn discover(&self, _now: &DateTime<Utc>) -> Result<Discovered, Error> {
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let discovered = files.keys().map(|id| (id.clone(), SourceType::File)).collect();
        *self.files.write().await = files;
        Ok(discovered)
    }

    async fn init_record(&self, source_id: &str, now: &DateTime<Utc>) -> Option<CacheRecord> {
        let path = self.path_of(source_id).await?;
        let stat = stat(&path).await?;
        let text = read_utf8(&path).await?;

        let meta = SourceMeta::File {
            file: FileMeta { rel_path: source_id.to_string(), size_bytes: stat.size_bytes, mtime_ns: stat.mtime_ns },
        };
        Some(CacheRecord::pending(hash_text(&text), meta, now))
    }

    async fn refresh(&self, state: &mut CacheState, _now: &DateTime<Utc>) -> Result<bool, Error> {
        let files = self.files.read().await.clone();
        let mut changed = false;

        for (rel_path, path) in files {
            let Some(record) = state.get_mut(&rel_path) else {
                continue;
            };
            let SourceMeta::File { file } = &mut record.meta else {
                continue;
            };
            let Some(current) = stat(&path).await else {
                continue;
            };
            if file.size_bytes == current.size_bytes && file.mtime_ns == current.mtime_ns {
                continue;
            }
            let Some(text) = read_utf8(&path).await else {
                continue;
            };

            *file = FileMeta { rel_path: rel_path.clone(), size_bytes: current.size_bytes, mtime_ns: current.mtime_ns };

            let content_hash = hash_text(&text);
            if content_hash != record.content_hash {
                tracing::debug!(source_id = %rel_path, "file content changed");
                record.content_hash = content_hash;
                record.summary_pending = true;
            }
            changed = true;
        }

        Ok(changed)
    }

    async fn load_text(&self, source_id: &str) -> Option<String> {
        let path = self.path_of(source_id).await?;
        read_utf8(&path).await
    }

    /// Turns backslashes into `/` and strips a leading `/` or root directory.
    fn normalize_id(&self, source_id: &str) -> String {
        let normalized = source_id.trim().replace('\\', "/");
        let normalized = normalized.trim_start_matches('/');

        let root = self.root.to_string_lossy().replace('\\', "/");
        let root = root.trim_matches('/');
        if !root.is_empty()
            && let Some(rest) = normalized.strip_prefix(root).and_then(|r| r.strip_prefix('/'))
        {
            return rest.to_string();
        }
        normalized.to_string()
    }
}
