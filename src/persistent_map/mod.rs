//! `PersistentMap`: the durable key-value map collaborator spec.md
//! treats as external (component A). This module gives it a concrete
//! trait plus two backends, generalizing the teacher's `KvsEngine`
//! trait and its `Bitcask`/`sled` implementations from a fixed
//! `String -> String` map to an arbitrary `K -> V` one.

mod log_map;
mod sled_map;

pub use log_map::LogStructuredMap;
pub use sled_map::SledPersistentMap;

use crate::error::Result;

/// Durable key -> value map. One instance backs each of the forward
/// map, the snapshot map, and the contents map; the primary inverted
/// index (`IndexStorage`) is built on top of one too (section 4.B).
///
/// Implementations must be safe to share behind an `Arc` and to call
/// concurrently: at most one `put`/`remove` runs at a time (the engine
/// serializes writers via its own lock), but `get` may run concurrently
/// with a `put`/`remove` from another thread, and `is_busy_reading` must
/// be queryable without blocking.
pub trait PersistentMap<K, V>: Send + Sync {
    /// Look up `key`. Returns `Ok(None)` if absent.
    fn get(&self, key: &K) -> Result<Option<V>>;
    /// Insert or overwrite the value for `key`.
    fn put(&self, key: &K, value: &V) -> Result<()>;
    /// Remove `key`. A no-op (not an error) if absent.
    fn remove(&self, key: &K) -> Result<()>;
    /// Whether `key` is present, without paying for a full `get`.
    fn contains_key(&self, key: &K) -> Result<bool>;
    /// Force any buffered writes to durable storage.
    fn force(&self) -> Result<()>;
    /// Whether there are writes since the last `force` that have not
    /// yet been made durable.
    fn is_dirty(&self) -> bool;
    /// Non-blocking predicate: true while a writer-side operation is
    /// in flight that a concurrent `get` could block behind. Callers
    /// that want to avoid blocking (section 4.G step 2) should check
    /// this before calling `get` and degrade to recomputing instead.
    fn is_busy_reading(&self) -> bool;
    /// Release any open file handles. Safe to call from `dispose`;
    /// further operations after `close` are not guaranteed to work
    /// until the map is reopened via `clear`.
    fn close(&self) -> Result<()>;
    /// Close, delete all backing files, and reopen an empty instance
    /// in place (section 4.I `clear`).
    fn clear(&self) -> Result<()>;
    /// Visit every key currently in the map. `visit` returns `false`
    /// to stop early; `for_each_key` then also returns `false`.
    fn for_each_key(&self, visit: &mut dyn FnMut(&K) -> bool) -> Result<bool>;
}
