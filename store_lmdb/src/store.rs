//! LMDB implementation of [`KeyValueStore`].
//!
//! Every value is stored behind an 8-byte little-endian write sequence so an
//! incremental backup can skip entries unchanged since the previous one. The
//! last sequence handed out lives in the meta database.

use std::io::Write;
use std::path::Path;

use heed::RwTxn;
use tangle_store::{backup, KeyValueStore, StoreError};

use crate::environment::{LmdbEnvironment, DEFAULT_MAP_SIZE};
use crate::LmdbError;

const LAST_SEQ_KEY: &[u8] = b"last_seq";
const SEQ_LEN: usize = 8;

pub struct LmdbStore {
    env: LmdbEnvironment,
}

impl LmdbStore {
    pub fn open(path: &Path) -> Result<Self, LmdbError> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        Ok(Self {
            env: LmdbEnvironment::open(path, map_size)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.env.path()
    }

    fn last_seq(&self, txn: &heed::RoTxn) -> Result<u64, LmdbError> {
        match self.env.meta_db.get(txn, LAST_SEQ_KEY)? {
            Some(bytes) => decode_seq(bytes),
            None => Ok(0),
        }
    }

    fn next_seq(&self, wtxn: &mut RwTxn) -> Result<u64, LmdbError> {
        let seq = self.last_seq(wtxn)? + 1;
        self.env.meta_db.put(wtxn, LAST_SEQ_KEY, &seq.to_le_bytes())?;
        Ok(seq)
    }

    fn put(&self, wtxn: &mut RwTxn, key: &[u8], value: &[u8]) -> Result<(), LmdbError> {
        let seq = self.next_seq(wtxn)?;
        let mut stored = Vec::with_capacity(SEQ_LEN + value.len());
        stored.extend_from_slice(&seq.to_le_bytes());
        stored.extend_from_slice(value);
        self.env.entries_db.put(wtxn, key, &stored)?;
        Ok(())
    }

    /// Entries under `prefix`, read through a cursor positioned on the prefix.
    fn entries_with_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LmdbError> {
        let rtxn = self.env.env.read_txn()?;
        let mut result = Vec::new();
        for entry in self.env.entries_db.prefix_iter(&rtxn, prefix)? {
            let (key, raw) = entry?;
            let (_, value) = split_value(raw)?;
            result.push((key.to_vec(), value.to_vec()));
        }
        Ok(result)
    }
}

fn decode_seq(bytes: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; SEQ_LEN] = bytes
        .try_into()
        .map_err(|_| LmdbError::Corruption(format!("sequence of {} bytes", bytes.len())))?;
    Ok(u64::from_le_bytes(arr))
}

fn split_value(raw: &[u8]) -> Result<(u64, &[u8]), LmdbError> {
    if raw.len() < SEQ_LEN {
        return Err(LmdbError::Corruption(format!("entry of {} bytes lacks its sequence", raw.len())));
    }
    let (seq, value) = raw.split_at(SEQ_LEN);
    Ok((decode_seq(seq)?, value))
}

impl KeyValueStore for LmdbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        let Some(raw) = self.env.entries_db.get(&rtxn, key).map_err(LmdbError::from)? else {
            return Ok(None);
        };
        let (_, value) = split_value(raw)?;
        Ok(Some(value.to_vec()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.env.write_txn().map_err(LmdbError::from)?;
        self.put(&mut wtxn, key, value)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn set_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StoreError> {
        // Dropping an uncommitted write transaction aborts it.
        let mut wtxn = self.env.env.write_txn().map_err(LmdbError::from)?;
        for (key, value) in entries {
            self.put(&mut wtxn, key, value)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.env.write_txn().map_err(LmdbError::from)?;
        self.env
            .entries_db
            .delete(&mut wtxn, key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn for_each_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        // The read transaction is closed before the callback runs so it may write.
        for (key, value) in self.entries_with_prefix(prefix)? {
            f(&key, &value)?;
        }
        Ok(())
    }

    fn backup(&self, writer: &mut dyn Write, since: u64) -> Result<u64, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        let last_seq = self.last_seq(&rtxn)?;
        backup::write_header(writer)?;
        let mut written = 0usize;
        for entry in self.env.entries_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, raw) = entry.map_err(LmdbError::from)?;
            let (seq, value) = split_value(raw)?;
            if seq >= since {
                backup::write_record(writer, key, value)?;
                written += 1;
            }
        }
        tracing::debug!(path = %self.path().display(), since, written, "lmdb backup written");
        Ok(last_seq + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, LmdbStore) {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open_with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
        (dir, store)
    }

    #[test]
    fn set_get_delete() {
        let (_dir, store) = open();
        assert_eq!(store.get(b"k").unwrap(), None);
        store.set(b"k", b"v1").unwrap();
        store.set(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
        store.delete(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn empty_value_round_trips() {
        let (_dir, store) = open();
        store.set(b"k", b"").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn for_each_visits_all() {
        let (_dir, store) = open();
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();
        let mut keys = Vec::new();
        store
            .for_each(&mut |k, _| {
                keys.push(k.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn prefix_scan_and_batch() {
        let (_dir, store) = open();
        store
            .set_batch(&[
                (b"fund:a".to_vec(), b"1".to_vec()),
                (b"vrx:a".to_vec(), b"2".to_vec()),
                (b"fund:b".to_vec(), b"3".to_vec()),
            ])
            .unwrap();
        let mut seen = Vec::new();
        store
            .for_each_prefix(b"fund:", &mut |k, v| {
                seen.push((k.to_vec(), v.to_vec()));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![(b"fund:a".to_vec(), b"1".to_vec()), (b"fund:b".to_vec(), b"3".to_vec())]
        );

        let mut full = Vec::new();
        store.backup(&mut full, 0).unwrap();
        assert_eq!(backup::read_records(&mut full.as_slice()).unwrap().len(), 3);
    }

    #[test]
    fn incremental_backup() {
        let (_dir, store) = open();
        store.set(b"a", b"1").unwrap();
        let mut full = Vec::new();
        let next = store.backup(&mut full, 0).unwrap();
        assert_eq!(backup::read_records(&mut full.as_slice()).unwrap().len(), 1);

        store.set(b"b", b"2").unwrap();
        let mut inc = Vec::new();
        let after = store.backup(&mut inc, next).unwrap();
        assert!(after > next);
        assert_eq!(
            backup::read_records(&mut inc.as_slice()).unwrap(),
            vec![(b"b".to_vec(), b"2".to_vec())]
        );
    }

    #[test]
    fn reopen_keeps_data_and_sequence() {
        let dir = TempDir::new().unwrap();
        let next = {
            let store = LmdbStore::open_with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
            store.set(b"k", b"v").unwrap();
            store.backup(&mut Vec::new(), 0).unwrap()
        };
        let store = LmdbStore::open_with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        let mut inc = Vec::new();
        assert_eq!(store.backup(&mut inc, next).unwrap(), next);
        assert!(backup::read_records(&mut inc.as_slice()).unwrap().is_empty());
    }
}
