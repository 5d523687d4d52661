//! `SnapshotMap`, `ContentsMap`, and `IndexingTrace` (component E):
//! the content-addressed indexer-output cache keyed by content hash.
//! `ContentsMap` hand-rolls the exact wire format spec section 4.E
//! describes; `SnapshotMap`/`IndexingTrace` are thin typed wrappers
//! over `PersistentMap`, the same shape as the teacher's `KvsEngine`
//! wrapping in `KvsClient`.

use std::collections::BTreeMap;
use std::io::Read;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::{self, JsonExternalizer, KeyBound, ValueBound};
use crate::error::{IndexError, Result};
use crate::persistent_map::PersistentMap;
use crate::{HashId, InputId};

/// A mapping `Key -> Value` (or `Key -> null`) produced by the indexer
/// for one input, as stored in the `ContentsMap` (section 3, section
/// 4.E). `None` values are the "may encode null" case the wire format
/// groups first.
pub type IndexedData<K, V> = BTreeMap<K, Option<V>>;

/// `InputId -> HashId`, present only when snapshot mapping is enabled.
pub struct SnapshotMap {
    inner: Arc<dyn PersistentMap<InputId, HashId>>,
}

impl SnapshotMap {
    /// Wrap an already-open persistent map.
    pub fn new(inner: Arc<dyn PersistentMap<InputId, HashId>>) -> Self {
        Self { inner }
    }

    /// The `HashId` last recorded for `input_id`, if any.
    pub fn get(&self, input_id: InputId) -> Result<Option<HashId>> {
        self.inner.get(&input_id)
    }

    /// Record `hash_id` as the current content identity of `input_id`.
    pub fn put(&self, input_id: InputId, hash_id: HashId) -> Result<()> {
        self.inner.put(&input_id, &hash_id)
    }

    /// Forget `input_id`.
    pub fn remove(&self, input_id: InputId) -> Result<()> {
        self.inner.remove(&input_id)
    }

    /// Force buffered writes to durable storage.
    pub fn flush(&self) -> Result<()> {
        self.inner.force()
    }

    /// Delete and recreate the backing store, empty.
    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    /// Release the backing store's resources.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// `HashId -> String`, an optional diagnostic record of why each hash
/// was indexed the way it was. Never consulted by the update protocol
/// itself.
pub struct IndexingTrace {
    inner: Arc<dyn PersistentMap<HashId, String>>,
}

impl IndexingTrace {
    /// Wrap an already-open persistent map.
    pub fn new(inner: Arc<dyn PersistentMap<HashId, String>>) -> Self {
        Self { inner }
    }

    /// The trace recorded for `hash_id`, if any.
    pub fn get(&self, hash_id: HashId) -> Result<Option<String>> {
        self.inner.get(&hash_id)
    }

    /// Record `trace` for `hash_id`, overwriting any previous entry.
    pub fn put(&self, hash_id: HashId, trace: &str) -> Result<()> {
        self.inner.put(&hash_id, &trace.to_owned())
    }

    /// Force buffered writes to durable storage.
    pub fn flush(&self) -> Result<()> {
        self.inner.force()
    }

    /// Delete and recreate the backing store, empty.
    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    /// Release the backing store's resources.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// `HashId -> SerializedIndexedData`: the content-addressed cache of
/// indexer output. Two inputs with the same content hash share one
/// entry (invariant I3).
pub struct ContentsMap<K, V> {
    inner: Arc<dyn PersistentMap<HashId, Vec<u8>>>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> ContentsMap<K, V>
where
    K: KeyBound + Ord,
    V: ValueBound + PartialEq,
{
    /// Wrap an already-open persistent map.
    pub fn new(inner: Arc<dyn PersistentMap<HashId, Vec<u8>>>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Read and decode the indexer output cached for `hash_id`.
    pub fn get(&self, hash_id: HashId) -> Result<Option<IndexedData<K, V>>> {
        match self.inner.get(&hash_id)? {
            Some(bytes) => Ok(Some(decode_indexed_data(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and store `data` for `hash_id`.
    pub fn put(&self, hash_id: HashId, data: &IndexedData<K, V>) -> Result<()> {
        let bytes = encode_indexed_data(data)?;
        self.inner.put(&hash_id, &bytes)
    }

    /// Whether `hash_id` already has a cached entry, without paying for
    /// a full decode (section 4.G step 4's racy pre-check).
    pub fn contains_key(&self, hash_id: HashId) -> Result<bool> {
        self.inner.contains_key(&hash_id)
    }

    /// Non-blocking: true while a write is in flight that a `get`
    /// could block behind (section 4.G step 2's "is busy" predicate).
    pub fn is_busy_reading(&self) -> bool {
        self.inner.is_busy_reading()
    }

    /// Force buffered writes to durable storage.
    pub fn flush(&self) -> Result<()> {
        self.inner.force()
    }

    /// Delete and recreate the backing store, empty.
    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    /// Release the backing store's resources.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

fn write_varint(out: &mut Vec<u8>, value: u64) {
    let mut groups = Vec::new();
    if value == 0 {
        groups.push(0u8);
    } else {
        let mut remaining = value;
        while remaining > 0 {
            groups.push((remaining & 0x7f) as u8);
            remaining >>= 7;
        }
        groups.reverse();
    }
    let last = groups.len() - 1;
    for (i, group) in groups.into_iter().enumerate() {
        out.push(if i == last { group } else { group | 0x80 });
    }
}

fn read_varint(input: &mut dyn Read) -> Result<Option<u64>> {
    let mut value: u64 = 0;
    let mut got_any = false;
    loop {
        let mut byte = [0u8; 1];
        match input.read(&mut byte)? {
            0 if !got_any => return Ok(None),
            0 => return Err(IndexError::CorruptRecord("truncated varint".to_owned())),
            _ => {}
        }
        got_any = true;
        value = (value << 7) | (byte[0] & 0x7f) as u64;
        if byte[0] & 0x80 == 0 {
            return Ok(Some(value));
        }
    }
}

fn write_block(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn read_block(input: &mut dyn Read) -> Result<Vec<u8>> {
    let len = read_varint(input)?.ok_or_else(|| IndexError::CorruptRecord("expected length-prefixed block".to_owned()))?;
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encode `data` per section 4.E: group keys by identical value, emit
/// one record per distinct value (null-value group first if present),
/// `pairCount` counting `(key, value)` pairs rather than groups.
fn encode_indexed_data<K, V>(data: &IndexedData<K, V>) -> Result<Vec<u8>>
where
    K: KeyBound + Ord,
    V: ValueBound + PartialEq,
{
    let mut null_keys: Vec<K> = Vec::new();
    let mut groups: Vec<(V, Vec<K>)> = Vec::new();
    let mut pair_count: u64 = 0;

    for (key, value) in data {
        pair_count += 1;
        match value {
            None => null_keys.push(key.clone()),
            Some(v) => match groups.iter_mut().find(|(gv, _)| *gv == *v) {
                Some((_, keys)) => keys.push(key.clone()),
                None => groups.push((v.clone(), vec![key.clone()])),
            },
        }
    }

    let mut out = Vec::new();
    write_varint(&mut out, pair_count);

    if !null_keys.is_empty() {
        write_block(&mut out, &codec::encode(&JsonExternalizer, &None::<V>)?);
        write_block(&mut out, &codec::encode(&JsonExternalizer, &null_keys)?);
    }
    for (value, keys) in groups {
        write_block(&mut out, &codec::encode(&JsonExternalizer, &Some(value))?);
        write_block(&mut out, &codec::encode(&JsonExternalizer, &keys)?);
    }
    Ok(out)
}

/// Decode bytes written by [`encode_indexed_data`], distributing each
/// value across its key list.
fn decode_indexed_data<K, V>(bytes: &[u8]) -> Result<IndexedData<K, V>>
where
    K: KeyBound + Ord,
    V: ValueBound,
{
    let mut cursor = bytes;
    let pair_count = read_varint(&mut cursor)?.unwrap_or(0);

    let mut data = IndexedData::new();
    loop {
        let value_bytes = match read_block_or_eof(&mut cursor)? {
            Some(bytes) => bytes,
            None => break,
        };
        let value: Option<V> = codec::decode(&JsonExternalizer, &value_bytes)?;
        let keys_bytes = read_block(&mut cursor)?;
        let keys: Vec<K> = codec::decode(&JsonExternalizer, &keys_bytes)?;
        for key in keys {
            data.insert(key, value.clone());
        }
    }

    if data.len() as u64 != pair_count {
        return Err(IndexError::CorruptRecord(format!(
            "contents-map record declared {pair_count} pairs but decoded {}",
            data.len()
        )));
    }
    Ok(data)
}

fn read_block_or_eof(input: &mut &[u8]) -> Result<Option<Vec<u8>>> {
    if input.is_empty() {
        return Ok(None);
    }
    Ok(Some(read_block(input)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent_map::SledPersistentMap;
    use tempfile::tempdir;

    fn contents_map(dir: &std::path::Path) -> ContentsMap<String, String> {
        let inner: Arc<dyn PersistentMap<HashId, Vec<u8>>> =
            Arc::new(SledPersistentMap::open(dir.join("values")).unwrap());
        ContentsMap::new(inner)
    }

    #[test]
    fn round_trips_simple_map() {
        let mut data: IndexedData<String, String> = IndexedData::new();
        data.insert("a".to_owned(), Some("A".to_owned()));
        data.insert("b".to_owned(), Some("B".to_owned()));
        data.insert("c".to_owned(), Some("A".to_owned()));

        let bytes = encode_indexed_data(&data).unwrap();
        let decoded: IndexedData<String, String> = decode_indexed_data(&bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn null_values_round_trip_and_group_first() {
        let mut data: IndexedData<String, String> = IndexedData::new();
        data.insert("a".to_owned(), Some("A".to_owned()));
        data.insert("z".to_owned(), None);

        let bytes = encode_indexed_data(&data).unwrap();
        // The null group's value block is written first; decode it
        // directly to check ordering rather than relying on the full
        // round trip alone.
        let mut cursor = &bytes[..];
        let _pair_count = read_varint(&mut cursor).unwrap();
        let value_bytes = read_block(&mut cursor).unwrap();
        let value: Option<String> = codec::decode(&JsonExternalizer, &value_bytes).unwrap();
        assert_eq!(value, None);

        let decoded: IndexedData<String, String> = decode_indexed_data(&bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn empty_map_round_trips() {
        let data: IndexedData<String, String> = IndexedData::new();
        let bytes = encode_indexed_data(&data).unwrap();
        let decoded: IndexedData<String, String> = decode_indexed_data(&bytes).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn contents_map_put_get_round_trip() {
        let dir = tempdir().unwrap();
        let map = contents_map(dir.path());
        let mut data: IndexedData<String, String> = IndexedData::new();
        data.insert("a".to_owned(), Some("A".to_owned()));

        assert!(!map.contains_key(42).unwrap());
        map.put(42, &data).unwrap();
        assert!(map.contains_key(42).unwrap());
        assert_eq!(map.get(42).unwrap(), Some(data));
    }
}
