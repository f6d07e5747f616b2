//! Indexed record store with soft deletion and binary persistence.
//!
//! Single source of truth for all collection state. One mutex guards the
//! whole table: every public operation takes it for its full duration, so
//! whole-table scans (`scan`, `save`) see a consistent snapshot. File I/O
//! happens outside the lock.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::codec::{self, Record};
use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Index of an entry. Assigned from 1 upwards and never reused.
pub type Index = u64;

/// A stored item plus its soft-delete marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    item: T,
    removed: bool,
}

impl<T> Entry<T> {
    pub fn item(&self) -> &T {
        &self.item
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

struct Inner<T> {
    entries: BTreeMap<Index, Entry<T>>,
    last_index: Index,
    file_name: PathBuf,
}

impl<T> Inner<T> {
    fn insert(&mut self, item: T, removed: bool) -> Index {
        self.last_index += 1;
        self.entries
            .insert(self.last_index, Entry { item, removed });
        self.last_index
    }
}

/// Ordered view over all entries, handed to [`CollectionStore::scan`].
pub struct Scan<'a, T> {
    iter: btree_map::Iter<'a, Index, Entry<T>>,
}

impl<'a, T> Iterator for Scan<'a, T> {
    type Item = (Index, &'a Entry<T>);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(index, entry)| (*index, entry))
    }
}

/// The collection store. Shared between tasks behind an `Arc`.
pub struct CollectionStore<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Record> CollectionStore<T> {
    /// Create an empty store bound to `file_name` for [`save`](Self::save).
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                last_index: 0,
                file_name: file_name.into(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    /// Number of indices ever assigned, removed entries included.
    pub fn size(&self) -> u64 {
        self.inner.lock().entries.len() as u64
    }

    /// The item at `index`, whether or not it is removed.
    pub fn get(&self, index: Index) -> Option<T> {
        self.inner
            .lock()
            .entries
            .get(&index)
            .map(|entry| entry.item.clone())
    }

    /// True if `index` is soft-removed or was never assigned.
    pub fn is_removed(&self, index: Index) -> bool {
        self.inner
            .lock()
            .entries
            .get(&index)
            .is_none_or(|entry| entry.removed)
    }

    /// Insert a live item and return its new index.
    pub fn add(&self, item: T) -> Index {
        self.add_entry(item, false)
    }

    pub fn add_entry(&self, item: T, removed: bool) -> Index {
        self.inner.lock().insert(item, removed)
    }

    /// Soft-remove `index`. Returns false if it was never assigned.
    pub fn remove(&self, index: Index) -> bool {
        match self.inner.lock().entries.get_mut(&index) {
            Some(entry) => {
                entry.removed = true;
                true
            }
            None => false,
        }
    }

    /// Replace the item at `index`, keeping its removed flag.
    pub fn update(&self, index: Index, item: T) -> bool {
        match self.inner.lock().entries.get_mut(&index) {
            Some(entry) => {
                entry.item = item;
                true
            }
            None => false,
        }
    }

    /// Mutate the item at `index` in place under the store lock.
    ///
    /// Unlike a `get` followed by `update`, no other operation can slip in
    /// between the read and the write.
    pub fn modify(&self, index: Index, f: impl FnOnce(&mut T)) -> bool {
        match self.inner.lock().entries.get_mut(&index) {
            Some(entry) => {
                f(&mut entry.item);
                true
            }
            None => false,
        }
    }

    /// Run `f` over every entry in index order while holding the lock once.
    ///
    /// `f` must not call back into the store.
    pub fn scan<R>(&self, f: impl FnOnce(Scan<'_, T>) -> R) -> R {
        let inner = self.inner.lock();
        f(Scan {
            iter: inner.entries.iter(),
        })
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// The file [`save`](Self::save) writes to.
    pub fn file_name(&self) -> PathBuf {
        self.inner.lock().file_name.clone()
    }

    /// Replace all state with the contents of `path`.
    ///
    /// Entries are re-indexed from 1 in file order and `path` becomes the
    /// bound file. On any error the current entries and binding are kept,
    /// so a mistyped path cannot redirect the next save.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let result = File::open(path)
            .map_err(Error::from)
            .and_then(|file| decode_entries::<T, _>(&mut BufReader::new(file)));
        record_persistence("load", &result);
        let decoded = result?;

        let count = decoded.len();
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.last_index = 0;
        for (item, removed) in decoded {
            inner.insert(item, removed);
        }
        inner.file_name = path.to_path_buf();
        drop(inner);

        info!(path = %path.display(), entries = count, "collection loaded");
        Ok(())
    }

    /// Like [`load`](Self::load), but a missing file is not an error: the
    /// current entries are kept and `path` is bound for the next save.
    ///
    /// Returns whether a file was read.
    pub fn load_or_empty(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        match self.load(path) {
            Ok(()) => Ok(true),
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "data file not found, starting empty");
                self.inner.lock().file_name = path.to_path_buf();
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Write every entry, in index order, to the bound file.
    pub fn save(&self) -> Result<()> {
        let (path, bytes) = {
            let inner = self.inner.lock();
            (inner.file_name.clone(), encode_entries(&inner.entries))
        };

        let result = bytes.and_then(|bytes| write_file(&path, &bytes));
        record_persistence("save", &result);
        result?;

        debug!(path = %path.display(), "collection saved");
        Ok(())
    }

    /// Bind `path` as the backing file, then save to it.
    pub fn save_as(&self, path: impl AsRef<Path>) -> Result<()> {
        self.inner.lock().file_name = path.as_ref().to_path_buf();
        self.save()
    }
}

// ---------------------------------------------------------------------------
// Encoding: count:u64 then (removed:u8, item) per entry
// ---------------------------------------------------------------------------

fn encode_entries<T: Record>(entries: &BTreeMap<Index, Entry<T>>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    codec::write_u64(&mut buf, entries.len() as u64)?;
    for entry in entries.values() {
        codec::write_u8(&mut buf, u8::from(entry.removed))?;
        entry.item.write_to(&mut buf)?;
    }
    Ok(buf)
}

fn decode_entries<T: Record, R: Read>(r: &mut R) -> Result<Vec<(T, bool)>> {
    let count = codec::read_u64(r)?;
    let mut entries = Vec::new();
    for n in 0..count {
        let removed = match codec::read_u8(r)? {
            0 => false,
            1 => true,
            other => {
                return Err(Error::Decode(format!(
                    "entry {n}: removed flag must be 0 or 1, found {other}"
                )));
            }
        };
        entries.push((T::read_from(r)?, removed));
    }

    let mut rest = [0u8; 1];
    if r.read(&mut rest)? != 0 {
        return Err(Error::Decode(format!(
            "unexpected data after the last of {count} entries"
        )));
    }
    Ok(entries)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

fn record_persistence<V>(operation: &'static str, result: &Result<V>) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    metrics::persistence_operations().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("result", outcome),
        ],
    );
}
