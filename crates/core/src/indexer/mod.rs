//! Tick orchestration.
//!
//! One tick runs `discover → reconcile → refresh → persist → summarize`
//! while holding the run lock, so ticks never interleave. Summaries are
//! requested concurrently (bounded by the enrichment semaphore) and each
//! result is applied and persisted on its own, after re-checking that the
//! record it was computed for is still the current, pending one.

mod schedule;

pub use schedule::RefreshLoop;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, Semaphore};

use crate::Error;
use crate::cache::clock::{format_rfc3339, utc_now};
use crate::cache::hash::hash_text;
use crate::cache::{CacheState, IndexEntry, SourceType, build_index_entries, parse_index, store};
use crate::enrich::{Enricher, compose_system_prompt};
use crate::provider::SourceProvider;

/// Paths and knobs for one knowledge base.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub cache_path: PathBuf,
    pub index_path: PathBuf,
    /// Prepended to source ids in the index file only.
    pub index_prefix: String,
    pub summarization_prompt: String,
    pub project_introduction: String,
    pub summarization_concurrency: usize,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct TickReport {
    pub discovered: usize,
    pub added: usize,
    pub removed: usize,
    pub refresh_changed: bool,
    pub summarized: usize,
    pub summary_failed: usize,
    pub summary_skipped: usize,
    pub persisted: bool,
}

#[derive(Debug, Default)]
struct Discovery {
    sources: BTreeMap<String, SourceType>,
    owners: HashMap<String, usize>,
    failed: Vec<SourceType>,
}

enum SummaryOutcome {
    Applied,
    Skipped,
    Failed,
    Stale,
    Unsaved,
}

/// Keeps one cache file and its index file in step with a set of providers.
pub struct Indexer {
    config: IndexerConfig,
    providers: Vec<Arc<dyn SourceProvider>>,
    enricher: Arc<dyn Enricher>,
    source_type_order: Vec<SourceType>,
    run_lock: Mutex<()>,
    summary_semaphore: Semaphore,
    owners: RwLock<HashMap<String, usize>>,
}

impl Indexer {
    pub fn new(config: IndexerConfig, providers: Vec<Arc<dyn SourceProvider>>, enricher: Arc<dyn Enricher>) -> Self {
        let mut source_type_order = Vec::new();
        for provider in &providers {
            if !source_type_order.contains(&provider.source_type()) {
                source_type_order.push(provider.source_type());
            }
        }
        let permits = config.summarization_concurrency.max(1);

        Self {
            config,
            providers,
            enricher,
            source_type_order,
            run_lock: Mutex::new(()),
            summary_semaphore: Semaphore::new(permits),
            owners: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Run one full tick. Waits for any tick already in progress.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateSource` when two providers claim the same id,
    /// or an I/O error when the cache or index file cannot be written.
    pub async fn run_once(&self) -> Result<TickReport, Error> {
        let _guard = self.run_lock.lock().await;
        self.run_locked().await
    }

    /// Request a tick after an out-of-band change. Concurrent requests queue
    /// on the run lock; each tick re-derives current truth from discovery.
    pub async fn notify_changed(&self, source_id: &str) -> Result<TickReport, Error> {
        tracing::debug!(source_id, "change notification");
        self.run_once().await
    }

    /// Entries of the current index file; empty when it does not exist yet.
    pub async fn load_index_entries(&self) -> Result<Vec<IndexEntry>, Error> {
        match tokio::fs::read_to_string(&self.config.index_path).await {
            Ok(text) => Ok(parse_index(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Full text of a source, by its id with or without the index prefix.
    ///
    /// Ids are also matched after provider normalization, so `kb:/guides/a.md`
    /// or a path that repeats the sources directory resolve to the same file.
    /// Sources that no tick has seen yet are looked up through discovery.
    pub async fn load_source(&self, source_id: &str) -> Result<String, Error> {
        let trimmed = source_id.trim();
        let id = trimmed.strip_prefix(self.config.index_prefix.as_str()).unwrap_or(trimmed).trim();

        let owner = match self.known_owner(id).await {
            Some(owner) => Some(owner),
            None => self.discover_owner(id).await,
        };
        let (idx, id) = owner.ok_or_else(|| Error::SourceNotFound(source_id.to_string()))?;

        self.providers[idx]
            .load_text(&id)
            .await
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::SourceNotFound(source_id.to_string()))
    }

    async fn known_owner(&self, id: &str) -> Option<(usize, String)> {
        let owners = self.owners.read().await;
        if let Some(idx) = owners.get(id) {
            return Some((*idx, id.to_string()));
        }
        self.providers.iter().enumerate().find_map(|(idx, provider)| {
            let candidate = provider.normalize_id(id);
            (owners.get(&candidate) == Some(&idx)).then_some((idx, candidate))
        })
    }

    async fn discover_owner(&self, id: &str) -> Option<(usize, String)> {
        let now = utc_now();
        for (idx, provider) in self.providers.iter().enumerate() {
            let candidate = provider.normalize_id(id);
            match provider.discover(&now).await {
                Ok(found) if found.contains_key(&candidate) => return Some((idx, candidate)),
                Ok(_) => {}
                Err(e) => tracing::debug!(provider = provider.name(), error = %e, "discovery for source lookup failed"),
            }
        }
        None
    }

    async fn run_locked(&self) -> Result<TickReport, Error> {
        let now = utc_now();
        let mut report = TickReport::default();
        let mut state = store::load(&self.config.cache_path, &now).await;

        let discovery = self.discover(&now).await?;
        report.discovered = discovery.sources.len();

        let mut changed = self.reconcile(&mut state, &discovery, &now, &mut report).await;

        for provider in &self.providers {
            match provider.refresh(&mut state, &now).await {
                Ok(true) => {
                    changed = true;
                    report.refresh_changed = true;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(provider = provider.name(), error = %e, "provider refresh failed"),
            }
        }

        *self.owners.write().await = discovery.owners.clone();

        if changed || !self.config.cache_path.exists() || !self.config.index_path.exists() {
            self.persist(&mut state, &now).await?;
            report.persisted = true;
        }

        self.summarize_pending(state, &discovery.owners, &mut report).await;

        tracing::info!(
            index = %self.config.index_path.display(),
            discovered = report.discovered,
            added = report.added,
            removed = report.removed,
            summarized = report.summarized,
            summary_failed = report.summary_failed,
            "index tick complete"
        );
        Ok(report)
    }

    async fn discover(&self, now: &DateTime<Utc>) -> Result<Discovery, Error> {
        let mut discovery = Discovery::default();
        for (idx, provider) in self.providers.iter().enumerate() {
            let found = match provider.discover(now).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "provider discovery failed");
                    discovery.failed.push(provider.source_type());
                    continue;
                }
            };
            for (source_id, source_type) in found {
                if discovery.sources.contains_key(&source_id) {
                    tracing::error!(source_id = %source_id, provider = provider.name(), "duplicate source id");
                    return Err(Error::DuplicateSource { source_id });
                }
                discovery.sources.insert(source_id.clone(), source_type);
                discovery.owners.insert(source_id, idx);
            }
        }
        Ok(discovery)
    }

    /// Drop records for vanished sources and initialise records for new or
    /// reassigned ones. Records of a provider whose discovery failed are kept.
    async fn reconcile(
        &self, state: &mut CacheState, discovery: &Discovery, now: &DateTime<Utc>, report: &mut TickReport,
    ) -> bool {
        let mut changed = false;

        let vanished: Vec<String> = state
            .sources
            .iter()
            .filter(|(id, record)| {
                !discovery.sources.contains_key(*id) && !discovery.failed.contains(&record.source_type())
            })
            .map(|(id, _)| id.clone())
            .collect();
        for source_id in vanished {
            tracing::info!(source_id = %source_id, "source removed");
            state.remove(&source_id);
            report.removed += 1;
            changed = true;
        }

        let to_init: Vec<(&String, usize)> = discovery
            .sources
            .iter()
            .filter(|(id, source_type)| state.get(id).is_none_or(|r| r.source_type() != **source_type))
            .filter_map(|(id, _)| discovery.owners.get(id).map(|idx| (id, *idx)))
            .collect();

        let initialised = join_all(to_init.into_iter().map(|(source_id, idx)| async move {
            (source_id, self.providers[idx].init_record(source_id, now).await)
        }))
        .await;

        for (source_id, record) in initialised {
            match record {
                Some(record) => {
                    tracing::info!(source_id = %source_id, source_type = %record.source_type(), "source added");
                    state.insert(source_id.clone(), record);
                    report.added += 1;
                    changed = true;
                }
                None => tracing::debug!(source_id = %source_id, "source content not captured, retrying later"),
            }
        }

        changed
    }

    async fn summarize_pending(&self, state: CacheState, owners: &HashMap<String, usize>, report: &mut TickReport) {
        let pending = state.pending();
        if pending.is_empty() {
            return;
        }

        let state = Mutex::new(state);
        let state = &state;
        let tasks = pending.into_iter().filter_map(|(source_id, generation)| {
            let provider = owners.get(&source_id).and_then(|idx| self.providers.get(*idx))?;
            Some(self.summarize_one(state, source_id, generation, provider.as_ref()))
        });

        for outcome in join_all(tasks).await {
            match outcome {
                SummaryOutcome::Applied => report.summarized += 1,
                SummaryOutcome::Failed | SummaryOutcome::Unsaved => report.summary_failed += 1,
                SummaryOutcome::Skipped | SummaryOutcome::Stale => report.summary_skipped += 1,
            }
        }
    }

    async fn summarize_one(
        &self, state: &Mutex<CacheState>, source_id: String, generation: u64, provider: &dyn SourceProvider,
    ) -> SummaryOutcome {
        let (summary, content_hash) = {
            let Ok(_permit) = self.summary_semaphore.acquire().await else {
                return SummaryOutcome::Skipped;
            };

            let text = match provider.load_text(&source_id).await {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    tracing::debug!(source_id = %source_id, "no text available, leaving summary pending");
                    return SummaryOutcome::Skipped;
                }
            };

            let system_prompt =
                compose_system_prompt(&self.config.summarization_prompt, &self.config.project_introduction);
            match self.enricher.invoke(&system_prompt, &text).await {
                Ok(summary) if !summary.trim().is_empty() => (summary.trim().to_string(), hash_text(&text)),
                Ok(_) => {
                    tracing::warn!(source_id = %source_id, "enrichment returned an empty summary");
                    return SummaryOutcome::Failed;
                }
                Err(e) => {
                    tracing::warn!(source_id = %source_id, error = %e, "summarization failed");
                    return SummaryOutcome::Failed;
                }
            }
        };

        let mut state = state.lock().await;
        let finished_at = utc_now();
        match state.get_mut(&source_id) {
            Some(record) if record.generation() == generation && record.summary_pending => {
                record.summary_text = summary;
                record.content_hash = content_hash;
                record.last_indexed_at = format_rfc3339(&finished_at);
                record.summary_pending = false;
            }
            _ => {
                tracing::debug!(source_id = %source_id, "record changed during summarization, discarding result");
                return SummaryOutcome::Stale;
            }
        }

        if let Err(e) = self.persist(&mut state, &finished_at).await {
            tracing::error!(source_id = %source_id, error = %e, "failed to persist summary");
            return SummaryOutcome::Unsaved;
        }
        tracing::debug!(source_id = %source_id, "summary updated");
        SummaryOutcome::Applied
    }

    /// Write the cache file and rebuild the index file from it.
    async fn persist(&self, state: &mut CacheState, now: &DateTime<Utc>) -> Result<(), Error> {
        store::persist(state, &self.config.cache_path, now).await?;
        let entries = build_index_entries(state, &self.source_type_order, &self.config.index_prefix);
        store::write_index(&entries, &self.config.index_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheRecord, FileMeta, SourceMeta};
    use crate::provider::Discovered;
    use tokio::sync::Notify;

    struct StaticProvider;

    #[async_trait::async_trait]
    impl SourceProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        fn source_type(&self) -> SourceType {
            SourceType::File
        }

        async fn discover(&self, _now: &DateTime<Utc>) -> Result<Discovered, Error> {
            Ok(Discovered::from([("a.txt".to_string(), SourceType::File)]))
        }

        async fn init_record(&self, _source_id: &str, _now: &DateTime<Utc>) -> Option<CacheRecord> {
            None
        }

        async fn refresh(&self, _state: &mut CacheState, _now: &DateTime<Utc>) -> Result<bool, Error> {
            Ok(false)
        }

        async fn load_text(&self, _source_id: &str) -> Option<String> {
            Some("Hello".into())
        }
    }

    /// Parks inside `invoke` until released.
    #[derive(Default)]
    struct GatedEnricher {
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl Enricher for GatedEnricher {
        async fn invoke(&self, _system_prompt: &str, user_content: &str) -> Result<String, Error> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(format!("About: {user_content}"))
        }
    }

    fn pending_record(content: &str) -> CacheRecord {
        let meta = SourceMeta::File { file: FileMeta { rel_path: "a.txt".into(), size_bytes: 5, mtime_ns: 1 } };
        CacheRecord::pending(hash_text(content), meta, &utc_now())
    }

    fn indexer(root: &std::path::Path, enricher: Arc<dyn Enricher>) -> Indexer {
        let config = IndexerConfig {
            cache_path: root.join("index-cache.json"),
            index_path: root.join("index.txt"),
            index_prefix: String::new(),
            summarization_prompt: "Summarize.".into(),
            project_introduction: String::new(),
            summarization_concurrency: 1,
        };
        Indexer::new(config, vec![Arc::new(StaticProvider)], enricher)
    }

    #[tokio::test]
    async fn test_summary_for_replaced_record_is_discarded() {
        let dir = tempfile::TempDir::new().unwrap();
        let enricher = Arc::new(GatedEnricher::default());
        let indexer = indexer(dir.path(), enricher.clone());

        let mut state = CacheState::empty(&utc_now());
        let generation = state.insert("a.txt", pending_record("Hello"));
        let state = Mutex::new(state);

        let replace = async {
            enricher.entered.notified().await;
            state.lock().await.insert("a.txt", pending_record("Hello again"));
            enricher.release.notify_one();
        };
        let (outcome, ()) =
            tokio::join!(indexer.summarize_one(&state, "a.txt".into(), generation, &StaticProvider), replace);

        assert!(matches!(outcome, SummaryOutcome::Stale));
        let state = state.into_inner();
        let record = state.get("a.txt").unwrap();
        assert!(record.summary_pending);
        assert!(record.summary_text.is_empty());
        assert_eq!(record.content_hash, hash_text("Hello again"));
        assert!(!dir.path().join("index.txt").exists());
    }

    #[tokio::test]
    async fn test_unsaved_summary_counts_as_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("blocker"), "not a directory").unwrap();

        struct Echo;

        #[async_trait::async_trait]
        impl Enricher for Echo {
            async fn invoke(&self, _system_prompt: &str, user_content: &str) -> Result<String, Error> {
                Ok(format!("About: {user_content}"))
            }
        }

        let indexer = indexer(&dir.path().join("blocker"), Arc::new(Echo));
        let mut state = CacheState::empty(&utc_now());
        state.insert("a.txt", pending_record("Hello"));
        let owners = HashMap::from([("a.txt".to_string(), 0)]);

        let mut report = TickReport::default();
        indexer.summarize_pending(state, &owners, &mut report).await;

        assert_eq!(report.summarized, 0);
        assert_eq!(report.summary_failed, 1);
    }
}
