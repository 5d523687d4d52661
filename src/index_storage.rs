//! `IndexStorage`: the primary inverted index (component B). Like
//! `PersistentMap`, spec.md treats it as an external collaborator; this
//! module gives it a concrete trait, a `PersistentIndexStorage`
//! backend layered on top of a `PersistentMap<K, ValueContainer<V>>`,
//! and the `MemoryIndexStorage` buffering wrapper section 4.B names.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::codec::{KeyBound, ValueBound};
use crate::error::Result;
use crate::persistent_map::PersistentMap;
use crate::InputId;

/// The inverted-index payload for one key: the set of `(inputId,
/// value)` pairs currently contributing that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueContainer<V> {
    entries: BTreeMap<InputId, V>,
}

impl<V> Default for ValueContainer<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> ValueContainer<V> {
    /// True if no input contributes this key.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(inputId, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (InputId, &V)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    /// The value this container holds for `input_id`, if any.
    pub fn get(&self, input_id: InputId) -> Option<&V> {
        self.entries.get(&input_id)
    }

    /// The number of inputs contributing this key.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<V> PartialEq for ValueContainer<V>
where
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// The primary inverted index: `Key -> ValueContainer<Value>`.
pub trait IndexStorage<K, V>: Send + Sync {
    /// Record that `input_id` contributes `value` for `key`.
    fn add_value(&self, key: &K, input_id: InputId, value: V) -> Result<()>;
    /// Remove any value `input_id` previously contributed for `key`.
    fn remove_all_values(&self, key: &K, input_id: InputId) -> Result<()>;
    /// Read the current container for `key` (never an error for an
    /// absent key — returns an empty container).
    fn read(&self, key: &K) -> Result<ValueContainer<V>>;
    /// Visit every key in the index, subject to `input_filter` (only
    /// keys with at least one input passing the filter are visited,
    /// when set). Returns `false` if `visitor` asked to stop early.
    fn process_keys(
        &self,
        visitor: &mut dyn FnMut(&K) -> bool,
        input_filter: Option<&dyn Fn(InputId) -> bool>,
    ) -> Result<bool>;
    /// Force buffered writes to durable storage.
    fn flush(&self) -> Result<()>;
    /// Delete and recreate the backing store, empty.
    fn clear(&self) -> Result<()>;
    /// Release resources; the storage may not be used afterward.
    fn close(&self) -> Result<()>;
}

/// `IndexStorage` layered directly on a `PersistentMap<K,
/// ValueContainer<V>>`.
pub struct PersistentIndexStorage<K, V> {
    map: Arc<dyn PersistentMap<K, ValueContainer<V>>>,
}

impl<K, V> PersistentIndexStorage<K, V>
where
    K: KeyBound,
    V: ValueBound,
{
    /// Wrap an already-open persistent map as the primary index.
    pub fn new(map: Arc<dyn PersistentMap<K, ValueContainer<V>>>) -> Self {
        Self { map }
    }
}

impl<K, V> IndexStorage<K, V> for PersistentIndexStorage<K, V>
where
    K: KeyBound,
    V: ValueBound,
{
    fn add_value(&self, key: &K, input_id: InputId, value: V) -> Result<()> {
        let mut container = self.map.get(key)?.unwrap_or_default();
        container.entries.insert(input_id, value);
        self.map.put(key, &container)
    }

    fn remove_all_values(&self, key: &K, input_id: InputId) -> Result<()> {
        if let Some(mut container) = self.map.get(key)? {
            container.entries.remove(&input_id);
            if container.is_empty() {
                self.map.remove(key)?;
            } else {
                self.map.put(key, &container)?;
            }
        }
        Ok(())
    }

    fn read(&self, key: &K) -> Result<ValueContainer<V>> {
        Ok(self.map.get(key)?.unwrap_or_default())
    }

    fn process_keys(
        &self,
        visitor: &mut dyn FnMut(&K) -> bool,
        input_filter: Option<&dyn Fn(InputId) -> bool>,
    ) -> Result<bool> {
        let map = &self.map;
        let mut keep_going = true;
        map.for_each_key(&mut |key: &K| {
            let passes = match input_filter {
                None => true,
                Some(filter) => match map.get(key) {
                    Ok(Some(container)) => container.entries.keys().any(|id| filter(*id)),
                    _ => false,
                },
            };
            if passes {
                keep_going = visitor(key);
            }
            keep_going
        })?;
        Ok(keep_going)
    }

    fn flush(&self) -> Result<()> {
        self.map.force()
    }

    fn clear(&self) -> Result<()> {
        self.map.clear()
    }

    fn close(&self) -> Result<()> {
        self.map.close()
    }
}

/// Notified by `MemoryIndexStorage` when buffering starts/stops, so a
/// `ForwardMap` wrapper can route its own writes to a matching
/// in-memory side-table (section 4.F).
pub trait BufferingListener: Send + Sync {
    /// Buffering was just turned on (`true`) or off (`false`).
    fn buffering_state_changed(&self, buffering: bool);
    /// A buffered session was discarded; any shadow state keyed off
    /// that session should be dropped too.
    fn memory_storage_cleared(&self);
}

/// Wraps an `IndexStorage` with an in-memory staging overlay that can
/// be active ("buffering mode") or inactive. While buffering, mutations
/// are kept in an overlay map and are invisible to readers of the
/// wrapped storage until the overlay is committed; they can also be
/// discarded as a unit (section 3 invariant I4).
pub struct MemoryIndexStorage<K, V, S> {
    inner: Arc<S>,
    buffering: Mutex<bool>,
    // `None` entry in the overlay means "all values for this key have
    // been removed for this session" without yet touching `inner`.
    overlay: RwLock<std::collections::HashMap<K, ValueContainer<V>>>,
    listeners: Mutex<Vec<Arc<dyn BufferingListener>>>,
}

impl<K, V, S> MemoryIndexStorage<K, V, S>
where
    K: KeyBound,
    V: ValueBound,
    S: IndexStorage<K, V>,
{
    /// Wrap `inner`, starting outside buffering mode.
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            buffering: Mutex::new(false),
            overlay: RwLock::new(std::collections::HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener to be notified of buffering transitions.
    pub fn add_listener(&self, listener: Arc<dyn BufferingListener>) {
        self.listeners.lock().push(listener);
    }

    /// Whether the storage is currently buffering mutations in memory.
    pub fn is_buffering(&self) -> bool {
        *self.buffering.lock()
    }

    /// Turn buffering on or off. Turning it off commits the overlay
    /// into the wrapped storage; to discard a buffered session instead,
    /// call `discard_buffer` before turning buffering off.
    pub fn set_buffering(&self, buffering: bool) -> Result<()> {
        let mut flag = self.buffering.lock();
        if *flag == buffering {
            return Ok(());
        }
        if *flag && !buffering {
            self.commit_overlay()?;
        }
        *flag = buffering;
        for listener in self.listeners.lock().iter() {
            listener.buffering_state_changed(buffering);
        }
        Ok(())
    }

    /// Discard the in-memory overlay without persisting it, and notify
    /// listeners so any shadow state (e.g. a buffered ForwardMap
    /// side-table) is dropped too.
    pub fn discard_buffer(&self) {
        self.overlay.write().clear();
        for listener in self.listeners.lock().iter() {
            listener.memory_storage_cleared();
        }
    }

    fn commit_overlay(&self) -> Result<()> {
        let overlay = std::mem::take(&mut *self.overlay.write());
        for (key, container) in overlay {
            let existing = self.inner.read(&key)?;
            for input_id in existing.entries.keys() {
                if !container.entries.contains_key(input_id) {
                    self.inner.remove_all_values(&key, *input_id)?;
                }
            }
            for (input_id, value) in container.entries {
                self.inner.add_value(&key, input_id, value)?;
            }
        }
        Ok(())
    }

    fn overlay_baseline(&self, key: &K) -> Result<ValueContainer<V>> {
        if let Some(container) = self.overlay.read().get(key) {
            return Ok(container.clone());
        }
        self.inner.read(key)
    }
}

impl<K, V, S> IndexStorage<K, V> for MemoryIndexStorage<K, V, S>
where
    K: KeyBound,
    V: ValueBound,
    S: IndexStorage<K, V>,
{
    fn add_value(&self, key: &K, input_id: InputId, value: V) -> Result<()> {
        if self.is_buffering() {
            let mut container = self.overlay_baseline(key)?;
            container.entries.insert(input_id, value);
            self.overlay.write().insert(key.clone(), container);
            Ok(())
        } else {
            self.inner.add_value(key, input_id, value)
        }
    }

    fn remove_all_values(&self, key: &K, input_id: InputId) -> Result<()> {
        if self.is_buffering() {
            let mut container = self.overlay_baseline(key)?;
            container.entries.remove(&input_id);
            self.overlay.write().insert(key.clone(), container);
            Ok(())
        } else {
            self.inner.remove_all_values(key, input_id)
        }
    }

    fn read(&self, key: &K) -> Result<ValueContainer<V>> {
        if self.is_buffering() {
            self.overlay_baseline(key)
        } else {
            self.inner.read(key)
        }
    }

    fn process_keys(
        &self,
        visitor: &mut dyn FnMut(&K) -> bool,
        input_filter: Option<&dyn Fn(InputId) -> bool>,
    ) -> Result<bool> {
        if !self.is_buffering() {
            return self.inner.process_keys(visitor, input_filter);
        }
        let overlay = self.overlay.read().clone();
        let mut keep_going = true;
        for (key, container) in overlay.iter() {
            let passes = match input_filter {
                None => true,
                Some(filter) => container.entries.keys().any(|id| filter(*id)),
            };
            if passes && !container.is_empty() {
                keep_going = visitor(key);
                if !keep_going {
                    break;
                }
            }
        }
        if keep_going {
            let overlay_keys: std::collections::HashSet<K> = overlay.keys().cloned().collect();
            keep_going = self.inner.process_keys(
                &mut |key| {
                    if overlay_keys.contains(key) {
                        true
                    } else {
                        visitor(key)
                    }
                },
                input_filter,
            )?;
        }
        Ok(keep_going)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn clear(&self) -> Result<()> {
        self.overlay.write().clear();
        self.inner.clear()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent_map::SledPersistentMap;
    use tempfile::tempdir;

    fn storage(dir: &std::path::Path) -> PersistentIndexStorage<String, String> {
        let map: Arc<dyn PersistentMap<String, ValueContainer<String>>> =
            Arc::new(SledPersistentMap::open(dir.join("idx")).unwrap());
        PersistentIndexStorage::new(map)
    }

    #[test]
    fn add_and_read_value() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.add_value(&"a".to_owned(), 7, "A".to_owned()).unwrap();
        let container = storage.read(&"a".to_owned()).unwrap();
        assert_eq!(container.get(7), Some(&"A".to_owned()));
    }

    #[test]
    fn remove_all_values_empties_container() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.add_value(&"a".to_owned(), 7, "A".to_owned()).unwrap();
        storage.remove_all_values(&"a".to_owned(), 7).unwrap();
        assert!(storage.read(&"a".to_owned()).unwrap().is_empty());
    }

    #[test]
    fn buffering_isolates_mutations_until_committed() {
        let dir = tempdir().unwrap();
        let inner = Arc::new(storage(dir.path()));
        let buffered = MemoryIndexStorage::new(inner.clone());

        buffered.set_buffering(true).unwrap();
        buffered.add_value(&"a".to_owned(), 7, "A".to_owned()).unwrap();

        assert!(inner.read(&"a".to_owned()).unwrap().is_empty());
        assert!(!buffered.read(&"a".to_owned()).unwrap().is_empty());

        buffered.set_buffering(false).unwrap();
        assert_eq!(inner.read(&"a".to_owned()).unwrap().get(7), Some(&"A".to_owned()));
    }

    #[test]
    fn committed_buffer_reconciles_removals_against_the_wrapped_storage() {
        let dir = tempdir().unwrap();
        let inner = Arc::new(storage(dir.path()));
        inner.add_value(&"a".to_owned(), 7, "X".to_owned()).unwrap();

        let buffered = MemoryIndexStorage::new(inner.clone());
        buffered.set_buffering(true).unwrap();
        buffered.remove_all_values(&"a".to_owned(), 7).unwrap();
        buffered.add_value(&"a".to_owned(), 8, "Y".to_owned()).unwrap();

        assert_eq!(buffered.read(&"a".to_owned()).unwrap().get(7), None);
        assert_eq!(buffered.read(&"a".to_owned()).unwrap().get(8), Some(&"Y".to_owned()));

        buffered.set_buffering(false).unwrap();

        let committed = inner.read(&"a".to_owned()).unwrap();
        assert_eq!(committed.get(7), None);
        assert_eq!(committed.get(8), Some(&"Y".to_owned()));
    }

    #[test]
    fn discarded_buffer_never_reaches_inner_storage() {
        let dir = tempdir().unwrap();
        let inner = Arc::new(storage(dir.path()));
        let buffered = MemoryIndexStorage::new(inner.clone());

        buffered.set_buffering(true).unwrap();
        buffered.add_value(&"a".to_owned(), 7, "A".to_owned()).unwrap();
        buffered.discard_buffer();
        buffered.set_buffering(false).unwrap();

        assert!(inner.read(&"a".to_owned()).unwrap().is_empty());
    }
}
