//! Index configuration, mirroring the way the teacher's
//! `get_kvstore_data_dir`/`get_sled_data_dir` free functions pick
//! default data directories, generalized into a builder with the same
//! defaulting style.

use std::path::{Path, PathBuf};

/// Construction-time configuration for an [`Index`](crate::engine::Index).
#[derive(Debug, Clone)]
pub struct IndexConfig {
    root: PathBuf,
    snapshot_mapping: bool,
    extra_sanity: bool,
    read_saved_data: bool,
}

impl IndexConfig {
    /// Start a builder rooted at `root` (all backing files are created
    /// under this directory). Snapshot mapping is on, extra-sanity
    /// mode is off, and reading saved data is on by default.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            snapshot_mapping: true,
            extra_sanity: false,
            read_saved_data: true,
        }
    }

    /// Enable or disable the SnapshotMap/ContentsMap content-hash
    /// dedup path (section 4.G). When disabled, the engine falls back
    /// to the plain ForwardMap diffing path.
    pub fn snapshot_mapping(mut self, enabled: bool) -> Self {
        self.snapshot_mapping = enabled;
        self
    }

    /// Enable or disable extra-sanity mode (section 6): cross-checking
    /// indexer determinism and externalizer round trips. Off by
    /// default since it roughly doubles the cost of every update.
    pub fn extra_sanity(mut self, enabled: bool) -> Self {
        self.extra_sanity = enabled;
        self
    }

    /// Enable or disable reading previously saved `ContentsMap` data
    /// (section 4.G step 2). Disabling forces the indexer to run on
    /// every update even when content is unchanged; useful for tests
    /// that want to count indexer invocations without dedup kicking in.
    pub fn read_saved_data(mut self, enabled: bool) -> Self {
        self.read_saved_data = enabled;
        self
    }

    /// The root directory backing this index.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The path of the forward map's backing store.
    pub fn forward_map_path(&self) -> PathBuf {
        self.root.join("forward-map")
    }

    /// The path of the snapshot map's backing store
    /// (`<index-root>/fileIdToHashId` in section 6).
    pub fn snapshot_map_path(&self) -> PathBuf {
        self.root.join("fileIdToHashId")
    }

    /// The path of the contents map's backing store
    /// (`<persistent-root>/values` in section 6).
    pub fn contents_map_path(&self) -> PathBuf {
        self.root.join("values")
    }

    /// The path of the content-hash enumerator's backing store.
    pub fn hash_enumerator_path(&self) -> PathBuf {
        self.root.join("content-hashes")
    }

    /// The path of the primary inverted index's backing store.
    pub fn index_storage_path(&self) -> PathBuf {
        self.root.join("index-storage")
    }

    /// The path of the optional indexing trace
    /// (`<index-root>/indextrace` in section 6).
    pub fn indexing_trace_path(&self) -> PathBuf {
        self.root.join("indextrace")
    }

    /// Whether snapshot mapping is enabled.
    pub fn has_snapshot_mapping(&self) -> bool {
        self.snapshot_mapping
    }

    /// Whether extra-sanity mode is enabled.
    pub fn has_extra_sanity(&self) -> bool {
        self.extra_sanity
    }

    /// Whether reading previously saved contents-map data is enabled.
    pub fn reads_saved_data(&self) -> bool {
        self.read_saved_data
    }
}

/// Default index root, mirroring the teacher's
/// `get_kvstore_data_dir`/`get_sled_data_dir` pattern of rooting data
/// under `<cwd>/data/<name>`.
pub fn default_index_dir(name: &str) -> PathBuf {
    let mut dir = std::env::current_dir().expect("current directory must be readable");
    dir.push("data");
    dir.push(name);
    dir
}
