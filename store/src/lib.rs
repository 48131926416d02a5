//! Abstract storage trait for the tangle ledger.
//!
//! The ledger keeps three keyed stores (trusted nodes, transaction to vertex
//! index, vertex archive). Each is an opaque byte-keyed map; backends
//! implement [`KeyValueStore`] and the rest of the codebase depends only on
//! the trait.

pub mod backup;
pub mod error;

pub use error::StoreError;

use std::io::Write;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or overwrite `key`.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`; removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Insert or overwrite every pair as one unit: either all of them land
    /// or, on error, none do.
    fn set_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StoreError>;

    /// Visit the entries whose key starts with `prefix`, in key order. The
    /// callback may abort the scan by returning an error, which is passed
    /// through.
    fn for_each_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    /// Write every entry modified at or after sequence `since` to `writer`
    /// and return the sequence to pass to the next incremental backup.
    fn backup(&self, writer: &mut dyn Write, since: u64) -> Result<u64, StoreError>;

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    fn for_each(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError>) -> Result<(), StoreError> {
        self.for_each_prefix(&[], f)
    }
}
