//! Log-structured `PersistentMap`, generalizing the teacher's
//! `Bitcask` engine (`engines/bitcask.rs`) from `String -> String` to an
//! arbitrary `K -> V`: an append-only command log plus an in-memory
//! index of log positions, compacted once stale bytes cross a
//! threshold. Kept as the second `PersistentMap` backend alongside
//! `SledPersistentMap`, mirroring the teacher's own two-engine split.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use tracing::info;

use crate::codec::{KeyBound, ValueBound};
use crate::error::{IndexError, Result};

use super::PersistentMap;

const COMPACTION_THRESHOLD: u64 = 1024 * 1024;

/// A `PersistentMap` backed by an append-only log of `set`/`remove`
/// commands, with an in-memory index of `(file, offset, len)` per key.
pub struct LogStructuredMap<K, V> {
    root: PathBuf,
    index: DashMap<K, CmdPos>,
    readers: Mutex<HashMap<u64, BufReaderWithPos<File>>>,
    writer: Mutex<WriterState>,
    dirty: AtomicBool,
    writers_in_flight: AtomicUsize,
    _marker: PhantomData<V>,
}

struct WriterState {
    cur_fid: u64,
    cur_writer: BufWriterWithPos<File>,
    uncompacted: u64,
}

impl<K, V> LogStructuredMap<K, V>
where
    K: KeyBound,
    V: ValueBound,
{
    /// Open (or create) a log-structured map rooted at `root`,
    /// replaying every existing log file to rebuild the in-memory
    /// index (mirrors `Bitcask::open`).
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let index = DashMap::new();
        let mut readers = HashMap::new();
        let mut uncompacted = 0;

        for &fid in &sorted_fids(&root)? {
            let mut reader = new_log_reader(&root, fid)?;
            uncompacted += Self::load(fid, &mut reader, &index)?;
            readers.insert(fid, reader);
        }

        let cur_fid = sorted_fids(&root)?.into_iter().max().unwrap_or(0) + 1;
        let cur_writer = new_log_writer(&root, cur_fid)?;

        Ok(Self {
            root,
            index,
            readers: Mutex::new(readers),
            writer: Mutex::new(WriterState {
                cur_fid,
                cur_writer,
                uncompacted,
            }),
            dirty: AtomicBool::new(false),
            writers_in_flight: AtomicUsize::new(0),
            _marker: PhantomData,
        })
    }

    fn load(fid: u64, reader: &mut BufReaderWithPos<File>, index: &DashMap<K, CmdPos>) -> Result<u64> {
        let mut pos = reader.seek(SeekFrom::Start(0))?;
        let mut uncompacted = 0;
        let mut stream = Deserializer::from_reader(reader).into_iter::<Cmd<K, V>>();

        while let Some(cmd) = stream.next() {
            let new_pos = stream.byte_offset() as u64;
            match cmd? {
                Cmd::Set { key, .. } => {
                    if let Some(old) = index.insert(key, (fid, pos..new_pos).into()) {
                        uncompacted += old.len;
                    }
                }
                Cmd::Rm { key } => {
                    if let Some((_, old)) = index.remove(&key) {
                        uncompacted += old.len;
                    }
                    uncompacted += new_pos - pos;
                }
            }
            pos = new_pos;
        }

        Ok(uncompacted)
    }

    fn read_and<R>(&self, cmd_pos: &CmdPos, f: impl FnOnce(io::Take<&mut BufReaderWithPos<File>>) -> Result<R>) -> Result<R> {
        let mut readers = self.readers.lock();
        if let std::collections::hash_map::Entry::Vacant(entry) = readers.entry(cmd_pos.fid) {
            entry.insert(new_log_reader(&self.root, cmd_pos.fid)?);
        }
        let reader = readers
            .get_mut(&cmd_pos.fid)
            .ok_or_else(|| IndexError::CorruptRecord(format!("missing log segment {}", cmd_pos.fid)))?;
        reader.seek(SeekFrom::Start(cmd_pos.pos))?;
        let taken = reader.take(cmd_pos.len);
        f(taken)
    }

    fn compact(&self, writer: &mut WriterState) -> Result<()> {
        let compaction_fid = writer.cur_fid + 1;
        writer.cur_fid += 2;
        writer.cur_writer = new_log_writer(&self.root, writer.cur_fid)?;

        let mut compaction_writer = new_log_writer(&self.root, compaction_fid)?;
        let mut new_pos = 0u64;

        for mut entry in self.index.iter_mut() {
            let cmd_pos = entry.value_mut();
            let len = self.read_and(cmd_pos, |mut r| Ok(io::copy(&mut r, &mut compaction_writer)?))?;
            *cmd_pos = CmdPos {
                fid: compaction_fid,
                pos: new_pos,
                len,
            };
            new_pos += len;
        }
        compaction_writer.flush()?;
        self.readers.lock().retain(|&fid, _| fid >= compaction_fid);

        for stale_fid in sorted_fids(&self.root)?.into_iter().filter(|&fid| fid < compaction_fid) {
            if let Err(e) = fs::remove_file(log_path(&self.root, stale_fid)) {
                tracing::warn!(fid = stale_fid, error = %e, "stale log segment could not be deleted");
            }
        }
        writer.uncompacted = 0;
        info!(compaction_fid, "log compaction finished");
        Ok(())
    }
}

impl<K, V> PersistentMap<K, V> for LogStructuredMap<K, V>
where
    K: KeyBound,
    V: ValueBound,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        match self.index.get(key) {
            Some(cmd_pos) => self.read_and(&cmd_pos, |r| match serde_json::from_reader::<_, Cmd<K, V>>(r)? {
                Cmd::Set { value, .. } => Ok(Some(value)),
                Cmd::Rm { .. } => Err(IndexError::CorruptRecord("rm command at set position".into())),
            }),
            None => Ok(None),
        }
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        self.writers_in_flight.fetch_add(1, Ordering::SeqCst);
        let mut writer = self.writer.lock();
        let cmd = Cmd::Set {
            key: key.clone(),
            value: value.clone(),
        };
        let pos = writer.cur_writer.pos;
        serde_json::to_writer(&mut writer.cur_writer, &cmd)?;
        writer.cur_writer.flush()?;
        let new_pos = writer.cur_writer.pos;

        if let Some(old) = self.index.insert(key.clone(), (writer.cur_fid, pos..new_pos).into()) {
            writer.uncompacted += old.len;
        }

        let result = if writer.uncompacted > COMPACTION_THRESHOLD {
            self.compact(&mut writer)
        } else {
            Ok(())
        };
        self.dirty.store(true, Ordering::SeqCst);
        self.writers_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn remove(&self, key: &K) -> Result<()> {
        self.writers_in_flight.fetch_add(1, Ordering::SeqCst);
        let mut writer = self.writer.lock();
        let result = (|| {
            if self.index.contains_key(key) {
                let cmd = Cmd::<K, V>::Rm { key: key.clone() };
                let pos = writer.cur_writer.pos;
                serde_json::to_writer(&mut writer.cur_writer, &cmd)?;
                writer.cur_writer.flush()?;
                let new_pos = writer.cur_writer.pos;

                if let Some((_, old)) = self.index.remove(key) {
                    writer.uncompacted += old.len;
                }
                writer.uncompacted += new_pos - pos;

                if writer.uncompacted > COMPACTION_THRESHOLD {
                    self.compact(&mut writer)?;
                }
            }
            Ok(())
        })();
        self.dirty.store(true, Ordering::SeqCst);
        self.writers_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.index.contains_key(key))
    }

    fn force(&self) -> Result<()> {
        self.writer.lock().cur_writer.flush()?;
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
        self.writer.lock().cur_writer.flush()?;
        self.readers.lock().clear();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.close()?;
        self.index.clear();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().extension() == Some(OsStr::new("log")) {
                fs::remove_file(entry.path())?;
            }
        }
        let mut writer = self.writer.lock();
        writer.cur_fid = 1;
        writer.cur_writer = new_log_writer(&self.root, 1)?;
        writer.uncompacted = 0;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn for_each_key(&self, visit: &mut dyn FnMut(&K) -> bool) -> Result<bool> {
        for entry in self.index.iter() {
            if !visit(entry.key()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn sorted_fids(root: &Path) -> Result<Vec<u64>> {
    let mut fids: Vec<u64> = fs::read_dir(root)?
        .flat_map(|res| -> Result<_> { Ok(res?.path()) })
        .filter(|path| path.is_file() && path.extension() == Some(OsStr::new("log")))
        .flat_map(|path| {
            path.file_name()
                .and_then(OsStr::to_str)
                .map(|s| s.trim_end_matches(".log").to_owned())
        })
        .flat_map(|s| s.parse::<u64>())
        .collect();
    fids.sort_unstable();
    Ok(fids)
}

fn log_path(root: &Path, fid: u64) -> PathBuf {
    root.join(format!("{}.log", fid))
}

fn new_log_reader(root: &Path, fid: u64) -> Result<BufReaderWithPos<File>> {
    BufReaderWithPos::new(File::open(log_path(root, fid))?)
}

fn new_log_writer(root: &Path, fid: u64) -> Result<BufWriterWithPos<File>> {
    let path = log_path(root, fid);
    BufWriterWithPos::new(
        OpenOptions::new()
            .create(true)
            .write(true)
            .append(true)
            .open(path)?,
    )
}

#[derive(Debug, Serialize, Deserialize)]
enum Cmd<K, V> {
    Set { key: K, value: V },
    Rm { key: K },
}

#[derive(Debug, Clone, Copy)]
struct CmdPos {
    fid: u64,
    pos: u64,
    len: u64,
}

impl From<(u64, Range<u64>)> for CmdPos {
    fn from((fid, range): (u64, Range<u64>)) -> Self {
        CmdPos {
            fid,
            pos: range.start,
            len: range.end - range.start,
        }
    }
}

struct BufReaderWithPos<R: Read + Seek> {
    reader: BufReader<R>,
    pos: u64,
}

impl<R: Read + Seek> BufReaderWithPos<R> {
    fn new(mut inner: R) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self {
            reader: BufReader::new(inner),
            pos,
        })
    }
}

impl<R: Read + Seek> Read for BufReaderWithPos<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for BufReaderWithPos<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.reader.seek(pos)?;
        Ok(self.pos)
    }
}

struct BufWriterWithPos<W: Write + Seek> {
    writer: BufWriter<W>,
    pos: u64,
}

impl<W: Write + Seek> BufWriterWithPos<W> {
    fn new(mut inner: W) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self {
            writer: BufWriter::new(inner),
            pos,
        })
    }
}

impl<W: Write + Seek> Write for BufWriterWithPos<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
