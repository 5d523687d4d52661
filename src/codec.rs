//! Externalizers: the save/read contracts user types must satisfy to be
//! stored in a `PersistentMap` or diffed by the update engine.
//!
//! Grounded on the teacher's use of `serde_json` to (de)serialize `Cmd`
//! values directly into the log (`engines/bitcask.rs`); we keep that
//! default codec but express it behind an explicit trait so a caller
//! can swap in a tighter binary format without touching the engine.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{IndexError, Result};

/// Bound every `Key` type must satisfy: total equality, a stable hash,
/// and a round-trippable serialized form.
pub trait KeyBound: Clone + Eq + std::hash::Hash + Serialize + DeserializeOwned + Send + Sync + 'static {}
impl<T> KeyBound for T where
    T: Clone + Eq + std::hash::Hash + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Bound every `Value` type must satisfy.
pub trait ValueBound: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}
impl<T> ValueBound for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Save/read round trip for a single value. Implementations must
/// satisfy `read(save(v)) == v` for any `v` — the update engine's
/// extra-sanity mode verifies this directly (section 6).
pub trait Externalizer<T>: Send + Sync {
    /// Encode `value` onto `out`.
    fn save(&self, out: &mut dyn Write, value: &T) -> Result<()>;
    /// Decode a value previously written by `save`.
    fn read(&self, input: &mut dyn Read) -> Result<T>;
}

/// The default externalizer: JSON via `serde_json`, matching the
/// teacher's choice of `serde_json::to_writer`/`from_reader` for its
/// on-disk command log.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExternalizer;

impl<T> Externalizer<T> for JsonExternalizer
where
    T: Serialize + DeserializeOwned,
{
    fn save(&self, out: &mut dyn Write, value: &T) -> Result<()> {
        serde_json::to_writer(out, value).map_err(IndexError::Serde)
    }

    fn read(&self, input: &mut dyn Read) -> Result<T> {
        serde_json::from_reader(input).map_err(IndexError::Serde)
    }
}

/// Encode a value to an owned byte vector using an externalizer.
pub fn encode<T>(ext: &dyn Externalizer<T>, value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ext.save(&mut buf, value)?;
    Ok(buf)
}

/// Decode a value from a byte slice using an externalizer.
pub fn decode<T>(ext: &dyn Externalizer<T>, bytes: &[u8]) -> Result<T> {
    let mut cursor = bytes;
    ext.read(&mut cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_externalizer_round_trips() {
        let ext = JsonExternalizer;
        let encoded = encode::<String>(&ext, &"hello".to_owned()).unwrap();
        let decoded: String = decode(&ext, &encoded).unwrap();
        assert_eq!(decoded, "hello");
    }
}
