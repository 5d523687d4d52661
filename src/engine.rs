//! `Index` (component G, `UpdateEngine`): orchestrates one `update` —
//! decide the content hash, read-or-compute the indexer output, diff
//! against the previous keyset, apply the diff to the primary inverted
//! index, and persist the forward/snapshot bookkeeping. Generalizes the
//! teacher's top-level `KvsEngine` entry points (`get`/`set`/`remove`)
//! into the five-operation surface spec section 6 names.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::codec::{self, JsonExternalizer, KeyBound, ValueBound};
use crate::config::IndexConfig;
use crate::contents_map::{ContentsMap, IndexedData, IndexingTrace, SnapshotMap};
use crate::error::Result;
use crate::forward_map::{ForwardMap, InMemoryStaging, KeySet};
use crate::hash_cache::{ContentHashCache, FileContent, PersistentHashEnumerator};
use crate::index_storage::{IndexStorage, MemoryIndexStorage, PersistentIndexStorage, ValueContainer};
use crate::lock::LockManager;
use crate::persistent_map::{PersistentMap, SledPersistentMap};
use crate::rebuild::IndexRebuildManager;
use crate::{HashId, InputId};

/// The primary inverted index, wrapped for in-memory buffering
/// (component B plus its `MemoryIndexStorage` decorator).
pub type Storage<K, V> = MemoryIndexStorage<K, V, PersistentIndexStorage<K, V>>;

/// The user-supplied indexer: transforms one input's content into a
/// key/value map. Must be deterministic (section 6).
pub type IndexerFn<K, V> = dyn Fn(&FileContent) -> Result<BTreeMap<K, V>> + Send + Sync;

/// The previous keyset for an input, produced either eagerly
/// (`SimpleUpdate`) or lazily on first access during commit
/// (`OptimizedUpdate`, section 4.G step 8 / section 9 design notes).
enum OldKeys<K> {
    Eager(HashSet<K>),
    Lazy(Box<dyn FnOnce() -> Result<HashSet<K>> + Send>),
}

impl<K> OldKeys<K> {
    fn resolve(self) -> Result<HashSet<K>> {
        match self {
            OldKeys::Eager(set) => Ok(set),
            OldKeys::Lazy(producer) => producer(),
        }
    }
}

struct PreparedUpdate<K, V> {
    new_data: BTreeMap<K, V>,
    old_keys: OldKeys<K>,
    hash_id: Option<HashId>,
    physical: bool,
}

fn strip_nulls<K: Ord, V>(data: IndexedData<K, V>) -> BTreeMap<K, V> {
    data.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect()
}

fn wrap_as_indexed<K, V>(data: &BTreeMap<K, V>) -> IndexedData<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    data.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect()
}

fn old_keys_from_snapshot<K, V>(snapshot_map: &SnapshotMap, contents_map: &ContentsMap<K, V>, input_id: InputId) -> Result<HashSet<K>>
where
    K: KeyBound + Ord,
    V: ValueBound + PartialEq,
{
    let Some(hash_id) = snapshot_map.get(input_id)? else {
        return Ok(HashSet::new());
    };
    match contents_map.get(hash_id)? {
        Some(indexed) => Ok(indexed.keys().cloned().collect()),
        None => Ok(HashSet::new()),
    }
}

/// A durable, incrementally updated map-reduce file index.
pub struct Index<K, V> {
    config: IndexConfig,
    lock: LockManager,
    hash_cache: Option<ContentHashCache>,
    contents_map: Option<Arc<ContentsMap<K, V>>>,
    snapshot_map: Option<Arc<SnapshotMap>>,
    forward_map: Option<Arc<ForwardMap<K>>>,
    indexing_trace: Option<IndexingTrace>,
    staging: Arc<InMemoryStaging<K>>,
    storage: Arc<Storage<K, V>>,
    rebuild_manager: Arc<dyn IndexRebuildManager>,
    indexer: Arc<IndexerFn<K, V>>,
}

impl<K, V> Index<K, V>
where
    K: KeyBound + Ord,
    V: ValueBound + PartialEq,
{
    /// Open (or create) an index rooted at `config.root()`. `indexer`
    /// computes the key/value map for one input's content; it is only
    /// ever invoked for inputs that need re-indexing (section 4.A/4.G).
    pub fn open(config: IndexConfig, indexer: Arc<IndexerFn<K, V>>, rebuild_manager: Arc<dyn IndexRebuildManager>) -> Result<Self> {
        let storage_map: Arc<dyn PersistentMap<K, ValueContainer<V>>> = Arc::new(SledPersistentMap::open(config.index_storage_path())?);
        let storage = Arc::new(MemoryIndexStorage::new(Arc::new(PersistentIndexStorage::new(storage_map))));

        let staging = Arc::new(InMemoryStaging::new());

        let mut hash_cache = None;
        let mut contents_map = None;
        let mut snapshot_map = None;
        let mut indexing_trace = None;
        let mut forward_map = None;

        if config.has_snapshot_mapping() {
            let hash_map: Arc<dyn PersistentMap<[u8; 32], HashId>> = Arc::new(SledPersistentMap::open(config.hash_enumerator_path())?);
            hash_cache = Some(ContentHashCache::new(Arc::new(PersistentHashEnumerator::new(hash_map)?)));

            let contents_inner: Arc<dyn PersistentMap<HashId, Vec<u8>>> = Arc::new(SledPersistentMap::open(config.contents_map_path())?);
            contents_map = Some(Arc::new(ContentsMap::new(contents_inner)));

            let snapshot_inner: Arc<dyn PersistentMap<InputId, HashId>> = Arc::new(SledPersistentMap::open(config.snapshot_map_path())?);
            snapshot_map = Some(Arc::new(SnapshotMap::new(snapshot_inner)));

            let trace_inner: Arc<dyn PersistentMap<HashId, String>> = Arc::new(SledPersistentMap::open(config.indexing_trace_path())?);
            indexing_trace = Some(IndexingTrace::new(trace_inner));
        } else {
            let forward_inner: Arc<dyn PersistentMap<InputId, KeySet<K>>> = Arc::new(SledPersistentMap::open(config.forward_map_path())?);
            let wrapper = Arc::new(ForwardMap::new(forward_inner, staging.clone()));
            storage.add_listener(wrapper.clone());
            forward_map = Some(wrapper);
        }

        // Registered last so that, when a `ForwardMap` listener is also
        // present, its promotion of staged entries to disk always runs
        // before this listener's end-of-session drain (see
        // `InMemoryStaging::buffering_state_changed`).
        storage.add_listener(staging.clone());

        Ok(Self {
            config,
            lock: LockManager::new(),
            hash_cache,
            contents_map,
            snapshot_map,
            forward_map,
            indexing_trace,
            staging,
            storage,
            rebuild_manager,
            indexer,
        })
    }

    /// Transform and commit `content` (or remove `input_id` entirely
    /// when `content` is `None`). Returns `Ok(true)` on success,
    /// `Ok(false)` if the commit phase failed and a rebuild was
    /// requested, or `Err(IndexError::Cancelled)` if `cancellation` was
    /// tripped during preparation.
    pub fn update(&self, input_id: InputId, content: Option<FileContent>, cancellation: &CancellationToken) -> Result<bool> {
        cancellation.check_point()?;
        let prepared = self.prepare(input_id, content.as_ref(), cancellation)?;
        cancellation.check_point()?;

        let _write = self.lock.write();
        match self.commit(input_id, prepared) {
            Ok(()) => Ok(true),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                tracing::error!(input_id, error = %err, "update commit failed; requesting rebuild");
                self.rebuild_manager.request_rebuild(&format!("update({input_id}) commit failed: {err}"));
                Ok(false)
            }
        }
    }

    fn prepare(&self, input_id: InputId, content: Option<&FileContent>, cancellation: &CancellationToken) -> Result<PreparedUpdate<K, V>> {
        let physical = content.map_or(true, FileContent::is_physical);

        let mut hash_id = None;
        let mut have_persistent_data = false;
        let mut skipped_reading_but_may_have_it = false;
        let mut data = None;

        if physical {
            if let (Some(contents_map), Some(hash_cache), Some(content)) = (&self.contents_map, &self.hash_cache, content) {
                let hid = hash_cache.hash(content)?;
                hash_id = Some(hid);
                if self.config.reads_saved_data() {
                    if !contents_map.is_busy_reading() {
                        if let Some(indexed) = contents_map.get(hid)? {
                            data = Some(strip_nulls(indexed));
                            have_persistent_data = true;
                        }
                    } else {
                        skipped_reading_but_may_have_it = true;
                    }
                }
            }
        }

        let data = match data {
            Some(data) => data,
            None => match content {
                Some(content) => (self.indexer)(content)?,
                None => BTreeMap::new(),
            },
        };

        if let (Some(hid), Some(contents_map)) = (hash_id, &self.contents_map) {
            if !have_persistent_data {
                let already_recorded = skipped_reading_but_may_have_it && contents_map.contains_key(hid)?;
                if !already_recorded {
                    contents_map.put(hid, &wrap_as_indexed(&data))?;
                }
            }
        }

        if self.config.has_extra_sanity() {
            self.run_extra_sanity_checks(input_id, content, hash_id, have_persistent_data, &data)?;
        }

        cancellation.check_point()?;

        let old_keys = match (&self.contents_map, &self.snapshot_map) {
            (Some(contents_map), Some(snapshot_map)) => {
                if physical {
                    let contents_map = contents_map.clone();
                    let snapshot_map = snapshot_map.clone();
                    OldKeys::Lazy(Box::new(move || old_keys_from_snapshot(&snapshot_map, &contents_map, input_id)))
                } else {
                    match self.staging.get(input_id) {
                        Some(keys) if self.staging.is_buffering() => OldKeys::Eager(keys.unwrap_or_default()),
                        _ => {
                            // No ForwardMap instance exists under snapshot
                            // mapping, so a non-physical update that has not
                            // been touched this buffering session has no
                            // in-memory source of truth either; fall back
                            // to the same snapshot-driven path physical
                            // updates use. Mirrors the corner spec section
                            // 9 flags as not to be guessed at.
                            let contents_map = contents_map.clone();
                            let snapshot_map = snapshot_map.clone();
                            OldKeys::Lazy(Box::new(move || old_keys_from_snapshot(&snapshot_map, &contents_map, input_id)))
                        }
                    }
                }
            }
            _ => match &self.forward_map {
                Some(forward_map) => OldKeys::Eager(forward_map.get(input_id)?.unwrap_or_default()),
                None => OldKeys::Eager(HashSet::new()),
            },
        };

        Ok(PreparedUpdate {
            new_data: data,
            old_keys,
            hash_id,
            physical,
        })
    }

    fn run_extra_sanity_checks(
        &self,
        input_id: InputId,
        content: Option<&FileContent>,
        hash_id: Option<HashId>,
        have_persistent_data: bool,
        data: &BTreeMap<K, V>,
    ) -> Result<()> {
        if have_persistent_data {
            if let Some(content) = content {
                let fresh = (self.indexer)(content)?;
                if &fresh != data {
                    tracing::warn!(input_id, "indexer output diverged from cached contents-map entry");
                    if let (Some(trace), Some(hash_id)) = (&self.indexing_trace, hash_id) {
                        trace.put(hash_id, "indexer output diverged from cached contents-map entry")?;
                    }
                }
            }
        }
        for (key, value) in data {
            let key_bytes = codec::encode(&JsonExternalizer, key)?;
            let decoded_key: K = codec::decode(&JsonExternalizer, &key_bytes)?;
            if &decoded_key != key {
                tracing::warn!(input_id, "key externalizer round trip did not reproduce the original key");
            }
            let value_bytes = codec::encode(&JsonExternalizer, value)?;
            let decoded_value: V = codec::decode(&JsonExternalizer, &value_bytes)?;
            if &decoded_value != value {
                tracing::warn!(input_id, "value externalizer round trip did not reproduce the original value");
            }
        }
        Ok(())
    }

    fn commit(&self, input_id: InputId, prepared: PreparedUpdate<K, V>) -> Result<()> {
        let old_keys = prepared.old_keys.resolve()?;
        let new_keys: HashSet<K> = prepared.new_data.keys().cloned().collect();

        let removed: Vec<K> = old_keys.difference(&new_keys).cloned().collect();
        let retained: Vec<K> = old_keys.intersection(&new_keys).cloned().collect();
        let added: Vec<K> = new_keys.difference(&old_keys).cloned().collect();

        for key in removed.iter().chain(retained.iter()) {
            self.storage.remove_all_values(key, input_id)?;
        }
        for key in added.iter().chain(retained.iter()) {
            let value = prepared
                .new_data
                .get(key)
                .expect("added/retained key must be present in the freshly computed data")
                .clone();
            self.storage.add_value(key, input_id, value)?;
        }

        if self.storage.is_buffering() {
            if new_keys.is_empty() {
                self.staging.remove(input_id);
            } else {
                self.staging.put(input_id, new_keys);
            }
        } else if let (Some(snapshot_map), true) = (&self.snapshot_map, prepared.physical) {
            if let Some(hash_id) = prepared.hash_id {
                snapshot_map.put(input_id, hash_id)?;
            }
        } else if let Some(forward_map) = &self.forward_map {
            if new_keys.is_empty() {
                forward_map.remove(input_id)?;
            } else {
                forward_map.put(input_id, new_keys)?;
            }
        }

        Ok(())
    }

    /// The current inverted-index entry for `key` (never an error for
    /// an absent key — returns an empty container).
    pub fn get_data(&self, key: &K) -> Result<ValueContainer<V>> {
        let _read = self.lock.read();
        self.storage.read(key)
    }

    /// Visit every key in the index, subject to `input_filter`.
    /// Returns `false` if `visitor` asked to stop early.
    pub fn process_all_keys(&self, visitor: &mut dyn FnMut(&K) -> bool, input_filter: Option<&dyn Fn(InputId) -> bool>) -> Result<bool> {
        let _read = self.lock.read();
        self.storage.process_keys(visitor, input_filter)
    }

    /// Force every dirty persistent map, then the primary index, to
    /// durable storage.
    pub fn flush(&self) -> Result<()> {
        let _read = self.lock.read();
        let result = self.flush_components();
        if let Err(err) = &result {
            tracing::error!(error = %err, "flush failed");
        }
        result
    }

    fn flush_components(&self) -> Result<()> {
        if let Some(contents_map) = &self.contents_map {
            contents_map.flush()?;
        }
        if let Some(snapshot_map) = &self.snapshot_map {
            snapshot_map.flush()?;
        }
        if let Some(forward_map) = &self.forward_map {
            forward_map.flush()?;
        }
        if let Some(trace) = &self.indexing_trace {
            trace.flush()?;
        }
        self.storage.flush()
    }

    /// A low-memory signal handler: flush, and request a rebuild if it
    /// fails (section 4.I).
    pub fn on_low_memory(&self) {
        if let Err(err) = self.flush() {
            tracing::warn!(error = %err, "low-memory flush failed; requesting rebuild");
            self.rebuild_manager.request_rebuild(&format!("low-memory flush failed: {err}"));
        }
    }

    /// Delete and recreate every backing file, empty. Individual map
    /// failures are logged and swallowed so every map still gets a
    /// best-effort reset (section 7).
    pub fn clear(&self) {
        let _write = self.lock.write();
        let log_failure = |what: &str, result: Result<()>| {
            if let Err(err) = result {
                tracing::error!(what, error = %err, "clear failed for component");
            }
        };
        log_failure("index-storage", self.storage.clear());
        if let Some(m) = &self.contents_map {
            log_failure("contents-map", m.clear());
        }
        if let Some(m) = &self.snapshot_map {
            log_failure("snapshot-map", m.clear());
        }
        if let Some(m) = &self.forward_map {
            log_failure("forward-map", m.clear());
        }
        if let Some(m) = &self.indexing_trace {
            log_failure("indexing-trace", m.clear());
        }
        self.staging.clear();
    }

    /// Terminal: release every backing resource. No further operations
    /// are valid afterward. Each close is independent (section 4.I).
    pub fn dispose(&self) {
        let _write = self.lock.write();
        let log_failure = |what: &str, result: Result<()>| {
            if let Err(err) = result {
                tracing::error!(what, error = %err, "close failed during dispose");
            }
        };
        log_failure("index-storage", self.storage.close());
        if let Some(m) = &self.contents_map {
            log_failure("contents-map", m.close());
        }
        if let Some(m) = &self.snapshot_map {
            log_failure("snapshot-map", m.close());
        }
        if let Some(m) = &self.forward_map {
            log_failure("forward-map", m.close());
        }
        if let Some(m) = &self.indexing_trace {
            log_failure("indexing-trace", m.close());
        }
    }

    /// Begin a buffering session: subsequent `update`s are held in
    /// memory until [`Index::end_buffering`] is called.
    pub fn begin_buffering(&self) -> Result<()> {
        let _write = self.lock.write();
        self.storage.set_buffering(true)
    }

    /// End the current buffering session. If `commit` is `false`, all
    /// mutations made during the session are discarded instead of
    /// being persisted.
    pub fn end_buffering(&self, commit: bool) -> Result<()> {
        let _write = self.lock.write();
        if !commit {
            self.storage.discard_buffer();
        }
        self.storage.set_buffering(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebuild::{NoopRebuildManager, RecordingRebuildManager};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct CapturingWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturingWriter {
        type Writer = CapturingWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn tokenizing_indexer() -> Arc<IndexerFn<String, String>> {
        Arc::new(|content: &FileContent| {
            let text = std::str::from_utf8(content.bytes()).unwrap_or_default();
            Ok(text
                .split_whitespace()
                .map(|token| (token.to_owned(), token.to_uppercase()))
                .collect())
        })
    }

    fn index(dir: &std::path::Path) -> Index<String, String> {
        let config = IndexConfig::new(dir);
        Index::open(config, tokenizing_indexer(), Arc::new(NoopRebuildManager)).unwrap()
    }

    fn content(text: &str) -> FileContent {
        FileContent::physical(text.as_bytes().to_vec(), "utf-8", "text")
    }

    #[test]
    fn scenario_basic_update_populates_inverted_index() {
        let dir = tempdir().unwrap();
        let idx = index(dir.path());
        let token = CancellationToken::new();

        assert!(idx.update(7, Some(content("a b c")), &token).unwrap());

        assert_eq!(idx.get_data(&"a".to_owned()).unwrap().get(7), Some(&"A".to_owned()));
        assert_eq!(idx.get_data(&"b".to_owned()).unwrap().get(7), Some(&"B".to_owned()));
        assert_eq!(idx.get_data(&"c".to_owned()).unwrap().get(7), Some(&"C".to_owned()));
    }

    #[test]
    fn scenario_diffing_drops_stale_keys_and_adds_new_ones() {
        let dir = tempdir().unwrap();
        let idx = index(dir.path());
        let token = CancellationToken::new();

        idx.update(7, Some(content("a b c")), &token).unwrap();
        idx.update(7, Some(content("b c d")), &token).unwrap();

        assert!(idx.get_data(&"a".to_owned()).unwrap().is_empty());
        assert_eq!(idx.get_data(&"b".to_owned()).unwrap().get(7), Some(&"B".to_owned()));
        assert_eq!(idx.get_data(&"d".to_owned()).unwrap().get(7), Some(&"D".to_owned()));
    }

    #[test]
    fn scenario_identical_content_shares_one_contents_map_entry() {
        let dir = tempdir().unwrap();
        let idx = index(dir.path());
        let token = CancellationToken::new();

        idx.update(7, Some(content("a b")), &token).unwrap();
        idx.update(8, Some(content("a b")), &token).unwrap();

        let container = idx.get_data(&"a".to_owned()).unwrap();
        assert_eq!(container.get(7), Some(&"A".to_owned()));
        assert_eq!(container.get(8), Some(&"A".to_owned()));
    }

    #[test]
    fn scenario_clear_empties_everything() {
        let dir = tempdir().unwrap();
        let idx = index(dir.path());
        let token = CancellationToken::new();

        idx.update(7, Some(content("x")), &token).unwrap();
        idx.clear();

        assert!(idx.get_data(&"x".to_owned()).unwrap().is_empty());
    }

    #[test]
    fn scenario_buffering_is_invisible_until_committed_and_revertible_on_discard() {
        let dir = tempdir().unwrap();
        let idx = index(dir.path());
        let token = CancellationToken::new();

        idx.begin_buffering().unwrap();
        idx.update(7, Some(content("a")), &token).unwrap();
        assert_eq!(idx.get_data(&"a".to_owned()).unwrap().get(7), Some(&"A".to_owned()));
        idx.end_buffering(false).unwrap();

        assert!(idx.get_data(&"a".to_owned()).unwrap().is_empty());
    }

    #[test]
    fn scenario_cancellation_during_preparation_raises_cancelled_and_mutates_nothing() {
        let dir = tempdir().unwrap();
        let idx = index(dir.path());
        let token = CancellationToken::new();
        token.cancel();

        let result = idx.update(7, Some(content("a")), &token);
        assert!(matches!(result, Err(crate::error::IndexError::Cancelled)));
        assert!(idx.get_data(&"a".to_owned()).unwrap().is_empty());
    }

    #[test]
    fn removal_update_clears_all_values_for_the_input() {
        let dir = tempdir().unwrap();
        let idx = index(dir.path());
        let token = CancellationToken::new();

        idx.update(7, Some(content("a b")), &token).unwrap();
        idx.update(7, None, &token).unwrap();

        assert!(idx.get_data(&"a".to_owned()).unwrap().is_empty());
        assert!(idx.get_data(&"b".to_owned()).unwrap().is_empty());
    }

    #[test]
    fn rebuild_manager_is_wired_up_but_quiet_on_a_clean_run() {
        let dir = tempdir().unwrap();
        let config = IndexConfig::new(dir.path());
        let rebuild_manager = Arc::new(RecordingRebuildManager::new());
        let idx = Index::open(config, tokenizing_indexer(), rebuild_manager.clone()).unwrap();
        let token = CancellationToken::new();

        idx.update(7, Some(content("a")), &token).unwrap();
        assert!(!rebuild_manager.was_requested());
    }

    #[test]
    fn extra_sanity_mode_logs_when_the_indexer_output_diverges_from_the_cache() {
        let dir = tempdir().unwrap();
        let writer = CapturingWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        // A non-deterministic indexer to provoke the divergence warning:
        // real indexers must be deterministic (section 6), so this is
        // the only way to exercise the cross-check without waiting on a
        // naturally flaky one.
        let calls = Arc::new(AtomicUsize::new(0));
        let flaky_calls = calls.clone();
        let flaky_indexer: Arc<IndexerFn<String, String>> = Arc::new(move |_content: &FileContent| {
            let call = flaky_calls.fetch_add(1, Ordering::SeqCst);
            let mut map = BTreeMap::new();
            map.insert("a".to_owned(), if call == 0 { "A".to_owned() } else { "Z".to_owned() });
            Ok(map)
        });

        let config = IndexConfig::new(dir.path()).extra_sanity(true);
        let idx = Index::open(config, flaky_indexer, Arc::new(NoopRebuildManager)).unwrap();
        let token = CancellationToken::new();

        tracing::subscriber::with_default(subscriber, || {
            idx.update(7, Some(content("a")), &token).unwrap();
            // Second input, same content: hits the contents-map cache
            // and re-runs the indexer only for the extra-sanity check.
            idx.update(8, Some(content("a")), &token).unwrap();
        });

        let logged = String::from_utf8(writer.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("indexer output diverged from cached contents-map entry"));
    }

    #[test]
    fn without_snapshot_mapping_forward_map_drives_diffing() {
        let dir = tempdir().unwrap();
        let config = IndexConfig::new(dir.path()).snapshot_mapping(false);
        let idx = Index::open(config, tokenizing_indexer(), Arc::new(NoopRebuildManager)).unwrap();
        let token = CancellationToken::new();

        idx.update(7, Some(content("a b")), &token).unwrap();
        idx.update(7, Some(content("b c")), &token).unwrap();

        assert!(idx.get_data(&"a".to_owned()).unwrap().is_empty());
        assert_eq!(idx.get_data(&"c".to_owned()).unwrap().get(7), Some(&"C".to_owned()));
    }
}
