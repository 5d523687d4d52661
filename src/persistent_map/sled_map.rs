//! `sled`-backed `PersistentMap`, generalizing the teacher's
//! `SledKvsEngine` (`engines/sled.rs`) from `String -> String` to an
//! arbitrary, serde-serializable `K -> V`.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::codec::{self, JsonExternalizer, KeyBound, ValueBound};
use crate::error::Result;

use super::PersistentMap;

/// A `PersistentMap` backed by a `sled::Db` opened at `root`.
pub struct SledPersistentMap<K, V> {
    root: PathBuf,
    db: RwLock<sled::Db>,
    dirty: AtomicBool,
    writers_in_flight: AtomicUsize,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> SledPersistentMap<K, V>
where
    K: KeyBound,
    V: ValueBound,
{
    /// Open (or create) a sled database at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let db = sled::open(&root)?;
        Ok(Self {
            root,
            db: RwLock::new(db),
            dirty: AtomicBool::new(false),
            writers_in_flight: AtomicUsize::new(0),
            _marker: PhantomData,
        })
    }

    fn key_bytes(key: &K) -> Result<Vec<u8>> {
        codec::encode(&JsonExternalizer, key)
    }
}

impl<K, V> PersistentMap<K, V> for SledPersistentMap<K, V>
where
    K: KeyBound,
    V: ValueBound,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        let key_bytes = Self::key_bytes(key)?;
        let db = self.db.read();
        match db.get(&key_bytes)? {
            Some(bytes) => Ok(Some(codec::decode(&JsonExternalizer, &bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        self.writers_in_flight.fetch_add(1, Ordering::SeqCst);
        let result = (|| {
            let key_bytes = Self::key_bytes(key)?;
            let value_bytes = codec::encode(&JsonExternalizer, value)?;
            let db = self.db.read();
            db.insert(key_bytes, value_bytes)?;
            self.dirty.store(true, Ordering::SeqCst);
            Ok(())
        })();
        self.writers_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn remove(&self, key: &K) -> Result<()> {
        self.writers_in_flight.fetch_add(1, Ordering::SeqCst);
        let result = (|| {
            let key_bytes = Self::key_bytes(key)?;
            let db = self.db.read();
            db.remove(key_bytes)?;
            self.dirty.store(true, Ordering::SeqCst);
            Ok(())
        })();
        self.writers_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn contains_key(&self, key: &K) -> Result<bool> {
        let key_bytes = Self::key_bytes(key)?;
        Ok(self.db.read().contains_key(key_bytes)?)
    }

    fn force(&self) -> Result<()> {
        self.db.read().flush()?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn is_busy_reading(&self) -> bool {
        self.writers_in_flight.load(Ordering::SeqCst) > 0
    }

    fn close(&self) -> Result<()> {
        self.db.read().flush()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut db = self.db.write();
        db.flush()?;
        // Dropping the old handle releases sled's file lock before we
        // delete the directory and reopen a fresh, empty instance.
        let fresh = sled::Config::new().temporary(false).path(&self.root);
        drop(std::mem::replace(&mut *db, fresh.open()?));
        std::fs::remove_dir_all(&self.root).or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        std::fs::create_dir_all(&self.root)?;
        *db = sled::open(&self.root)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn for_each_key(&self, visit: &mut dyn FnMut(&K) -> bool) -> Result<bool> {
        let db = self.db.read();
        for entry in db.iter() {
            let (key_bytes, _) = entry?;
            let key: K = codec::decode(&JsonExternalizer, &key_bytes)?;
            if !visit(&key) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_remove_round_trip() {
        let dir = tempdir().unwrap();
        let map: SledPersistentMap<String, i64> =
            SledPersistentMap::open(dir.path().join("map")).unwrap();

        assert_eq!(map.get(&"a".to_owned()).unwrap(), None);
        map.put(&"a".to_owned(), &42).unwrap();
        assert_eq!(map.get(&"a".to_owned()).unwrap(), Some(42));
        assert!(map.is_dirty());
        map.force().unwrap();
        assert!(!map.is_dirty());

        map.remove(&"a".to_owned()).unwrap();
        assert_eq!(map.get(&"a".to_owned()).unwrap(), None);
    }

    #[test]
    fn clear_reopens_empty() {
        let dir = tempdir().unwrap();
        let map: SledPersistentMap<String, i64> =
            SledPersistentMap::open(dir.path().join("map")).unwrap();
        map.put(&"k".to_owned(), &1).unwrap();
        map.clear().unwrap();
        assert_eq!(map.get(&"k".to_owned()).unwrap(), None);
        // still usable after clear
        map.put(&"k2".to_owned(), &2).unwrap();
        assert_eq!(map.get(&"k2".to_owned()).unwrap(), Some(2));
    }
}
