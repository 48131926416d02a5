//! Nullable store: thread-safe in-memory key-value storage.
//!
//! Also the backend used when a node is configured without a store path.

use std::collections::BTreeMap;
use std::io::Write;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use tangle_store::{backup, KeyValueStore, StoreError};

#[derive(Default)]
struct Entries {
    map: BTreeMap<Vec<u8>, (u64, Vec<u8>)>,
    last_seq: u64,
    /// Key writes still allowed before every write fails; `None` is unlimited.
    write_budget: Option<u64>,
}

impl Entries {
    /// Charge `writes` key writes against the budget, all or nothing.
    fn charge(&mut self, writes: u64) -> Result<(), StoreError> {
        match self.write_budget {
            None => Ok(()),
            Some(left) if left >= writes => {
                self.write_budget = Some(left - writes);
                Ok(())
            }
            Some(_) => Err(StoreError::Backend("writes disabled on null store".into())),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.last_seq += 1;
        let seq = self.last_seq;
        self.map.insert(key.to_vec(), (seq, value.to_vec()));
    }
}

/// An in-memory [`KeyValueStore`] with per-entry write sequences, so
/// incremental backups behave like the LMDB backend.
#[derive(Default)]
pub struct NullStore {
    entries: Mutex<Entries>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`delete` fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.set_write_budget(fail.then_some(0));
    }

    /// Allow `budget` more key writes, then fail every write. A batch counts
    /// one write per key and fails whole when the budget cannot cover it.
    pub fn set_write_budget(&self, budget: Option<u64>) {
        if let Ok(mut entries) = self.lock() {
            entries.write_budget = budget;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("null store lock poisoned".into()))
    }
}

impl KeyValueStore for NullStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.map.get(key).map(|(_, v)| v.clone()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.charge(1)?;
        entries.put(key, value);
        Ok(())
    }

    fn set_batch(&self, batch: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.charge(batch.len() as u64)?;
        for (key, value) in batch {
            entries.put(key, value);
        }
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.charge(1)?;
        entries.map.remove(key);
        Ok(())
    }

    fn for_each_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        // Snapshot first so the callback may write back into this store.
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = self
            .lock()?
            .map
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, (_, v))| (k.clone(), v.clone()))
            .collect();
        for (k, v) in &snapshot {
            f(k, v)?;
        }
        Ok(())
    }

    fn backup(&self, writer: &mut dyn Write, since: u64) -> Result<u64, StoreError> {
        let entries = self.lock()?;
        backup::write_header(writer)?;
        for (key, (seq, value)) in &entries.map {
            if *seq >= since {
                backup::write_record(writer, key, value)?;
            }
        }
        Ok(entries.last_seq + 1)
    }
}
