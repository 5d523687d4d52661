//! Black-box tests against the public API only, covering the testable
//! properties that the in-module unit tests don't already exercise:
//! externalizer round-tripping, update idempotence, and content-hash
//! dedup of the indexer itself.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mrindex::{CancellationToken, Externalizer, FileContent, Index, IndexConfig, JsonExternalizer, NoopRebuildManager};
use tempfile::tempdir;

fn tokenize(content: &FileContent) -> mrindex::Result<BTreeMap<String, String>> {
    let text = std::str::from_utf8(content.bytes()).unwrap_or_default();
    Ok(text.split_whitespace().map(|t| (t.to_owned(), t.to_uppercase())).collect())
}

fn content(text: &str) -> FileContent {
    FileContent::physical(text.as_bytes().to_vec(), "utf-8", "text")
}

fn indexer() -> Arc<mrindex::engine::IndexerFn<String, String>> {
    Arc::new(tokenize)
}

#[test]
fn externalizer_round_trips_indexer_output() {
    let data: BTreeMap<String, String> = tokenize(&content("a b a")).unwrap();
    let ext = JsonExternalizer;

    let mut bytes = Vec::new();
    ext.save(&mut bytes, &data).unwrap();
    let decoded: BTreeMap<String, String> = ext.read(&mut bytes.as_slice()).unwrap();

    assert_eq!(decoded, data);
}

#[test]
fn repeated_update_with_unchanged_content_is_idempotent() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::new(dir.path());
    let idx = Index::open(config, indexer(), Arc::new(NoopRebuildManager)).unwrap();
    let token = CancellationToken::new();

    idx.update(7, Some(content("a b")), &token).unwrap();
    let first = idx.get_data(&"a".to_owned()).unwrap();

    idx.update(7, Some(content("a b")), &token).unwrap();
    let second = idx.get_data(&"a".to_owned()).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.get(7), Some(&"A".to_owned()));
}

#[test]
fn identical_content_across_inputs_invokes_the_indexer_at_most_once() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::new(dir.path());
    let calls = Arc::new(AtomicUsize::new(0));
    let counting_calls = calls.clone();
    let counting_indexer: Arc<mrindex::engine::IndexerFn<String, String>> = Arc::new(move |c: &FileContent| {
        counting_calls.fetch_add(1, Ordering::SeqCst);
        tokenize(c)
    });
    let idx = Index::open(config, counting_indexer, Arc::new(NoopRebuildManager)).unwrap();
    let token = CancellationToken::new();

    idx.update(7, Some(content("a b")), &token).unwrap();
    idx.update(8, Some(content("a b")), &token).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let container = idx.get_data(&"a".to_owned()).unwrap();
    assert_eq!(container.get(7), Some(&"A".to_owned()));
    assert_eq!(container.get(8), Some(&"A".to_owned()));
}

#[test]
fn diff_correctness_after_two_updates_only_new_keys_remain() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::new(dir.path());
    let idx = Index::open(config, indexer(), Arc::new(NoopRebuildManager)).unwrap();
    let token = CancellationToken::new();

    idx.update(1, Some(content("a b c")), &token).unwrap();
    idx.update(1, Some(content("c d")), &token).unwrap();

    for absent in ["a", "b"] {
        assert!(idx.get_data(&absent.to_owned()).unwrap().is_empty());
    }
    assert_eq!(idx.get_data(&"c".to_owned()).unwrap().get(1), Some(&"C".to_owned()));
    assert_eq!(idx.get_data(&"d".to_owned()).unwrap().get(1), Some(&"D".to_owned()));
}

#[test]
fn clear_recreates_backing_files_empty_and_the_index_stays_usable() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::new(dir.path());
    let idx = Index::open(config, indexer(), Arc::new(NoopRebuildManager)).unwrap();
    let token = CancellationToken::new();

    idx.update(1, Some(content("a")), &token).unwrap();
    idx.clear();
    assert!(idx.get_data(&"a".to_owned()).unwrap().is_empty());

    idx.update(1, Some(content("b")), &token).unwrap();
    assert_eq!(idx.get_data(&"b".to_owned()).unwrap().get(1), Some(&"B".to_owned()));
}
