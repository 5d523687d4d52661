#![deny(missing_docs)]
//! A durable, incrementally updated map-reduce file index core.
//!
//! An [`Index`](engine::Index) keeps a key -> value inverted index in
//! sync with a set of inputs (typically files) by re-running a pluggable
//! indexer only over the inputs that actually changed, deduplicating
//! identical content via a [`ContentHashCache`](hash_cache::ContentHashCache)
//! so that, e.g., renaming a file without touching its bytes costs one
//! cheap lookup rather than a full re-index.

pub mod cancellation;
pub mod codec;
pub mod config;
pub mod contents_map;
pub mod engine;
pub mod error;
pub mod forward_map;
pub mod hash_cache;
pub mod index_storage;
pub mod lock;
pub mod persistent_map;
pub mod rebuild;

pub use cancellation::CancellationToken;
pub use codec::{Externalizer, JsonExternalizer, KeyBound, ValueBound};
pub use config::IndexConfig;
pub use engine::Index;
pub use error::{IndexError, Result};
pub use hash_cache::{ContentHashCache, FileContent, HashEnumerator};
pub use index_storage::{IndexStorage, MemoryIndexStorage, PersistentIndexStorage, ValueContainer};
pub use persistent_map::{LogStructuredMap, PersistentMap, SledPersistentMap};
pub use rebuild::{IndexRebuildManager, NoopRebuildManager, RecordingRebuildManager};

/// Identifies one input (e.g. a file) stably across updates.
pub type InputId = u32;

/// Identifies one distinct piece of content by its hash, independent of
/// which input(s) currently hold it.
pub type HashId = u32;

/// The `HashId` meaning "no content has been hashed yet" / "not a
/// physical update". Never assigned to real content by a `HashEnumerator`.
pub const NULL_MAPPING: HashId = 0;
