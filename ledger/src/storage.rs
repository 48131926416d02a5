//! Typed access to the three persistent stores behind an accounting book.
//!
//! * trusted nodes: signer address -> empty
//! * transaction index: transaction hash -> vertex hash
//! * vertex archive: `vrx:` + vertex hash -> vertex, `fund:` + address -> net funds

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tangle_nullables::NullStore;
use tangle_store::{KeyValueStore, StoreError};
use tangle_store_lmdb::LmdbStore;
use tangle_types::{Address, TxHash, VertexHash};

use crate::checkpoint::PrecalculatedFunds;
use crate::config::LedgerConfig;
use crate::vertex::Vertex;
use crate::LedgerError;

pub const VERTEX_PREFIX: &[u8] = b"vrx:";
pub const FUNDS_PREFIX: &[u8] = b"fund:";

fn prefixed(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + key.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(key);
    out
}

/// Open a store at `path`, or an in-memory one when the path is empty.
pub fn open_store(path: &str) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    if path.is_empty() {
        return Ok(Arc::new(NullStore::new()));
    }
    let path = Path::new(path);
    fs::create_dir_all(path)?;
    Ok(Arc::new(LmdbStore::open(path)?))
}

#[derive(Clone)]
pub struct LedgerStores {
    trusted: Arc<dyn KeyValueStore>,
    trx_index: Arc<dyn KeyValueStore>,
    vertices: Arc<dyn KeyValueStore>,
}

impl LedgerStores {
    pub fn new(
        trusted: Arc<dyn KeyValueStore>,
        trx_index: Arc<dyn KeyValueStore>,
        vertices: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            trusted,
            trx_index,
            vertices,
        }
    }

    pub fn open(config: &LedgerConfig) -> Result<Self, StoreError> {
        Ok(Self::new(
            open_store(&config.trusted_nodes_db_path)?,
            open_store(&config.trxs_to_vertices_db_path)?,
            open_store(&config.vertices_db_path)?,
        ))
    }

    /// Purely in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(NullStore::new()),
            Arc::new(NullStore::new()),
            Arc::new(NullStore::new()),
        )
    }

    // ── Trusted nodes ──────────────────────────────────────────────────

    pub fn is_trusted(&self, address: &Address) -> Result<bool, StoreError> {
        self.trusted.contains(address.as_bytes())
    }

    pub fn add_trusted(&self, address: &Address) -> Result<(), StoreError> {
        self.trusted.set(address.as_bytes(), &[])
    }

    pub fn remove_trusted(&self, address: &Address) -> Result<(), StoreError> {
        self.trusted.delete(address.as_bytes())
    }

    // ── Transaction index ──────────────────────────────────────────────

    pub fn map_trx(&self, trx: &TxHash, vertex: &VertexHash) -> Result<(), StoreError> {
        self.trx_index.set(trx.as_bytes(), vertex.as_bytes())
    }

    pub fn unmap_trx(&self, trx: &TxHash) -> Result<(), StoreError> {
        self.trx_index.delete(trx.as_bytes())
    }

    pub fn is_trx_mapped(&self, trx: &TxHash) -> Result<bool, StoreError> {
        self.trx_index.contains(trx.as_bytes())
    }

    pub fn vertex_of_trx(&self, trx: &TxHash) -> Result<Option<VertexHash>, StoreError> {
        match self.trx_index.get(trx.as_bytes())? {
            None => Ok(None),
            Some(bytes) => VertexHash::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::Corruption(format!("index entry for {trx} is {} bytes", bytes.len()))),
        }
    }

    // ── Vertex archive ─────────────────────────────────────────────────

    pub fn archive_vertex(&self, vertex: &Vertex) -> Result<(), LedgerError> {
        self.vertices
            .set(&prefixed(VERTEX_PREFIX, vertex.hash.as_bytes()), &vertex.encode()?)?;
        Ok(())
    }

    pub fn archived_vertex(&self, hash: &VertexHash) -> Result<Option<Vertex>, LedgerError> {
        self.vertices
            .get(&prefixed(VERTEX_PREFIX, hash.as_bytes()))?
            .map(|bytes| Vertex::decode(&bytes))
            .transpose()
    }

    pub fn is_archived(&self, hash: &VertexHash) -> Result<bool, StoreError> {
        self.vertices.contains(&prefixed(VERTEX_PREFIX, hash.as_bytes()))
    }

    pub fn funds(&self, address: &Address) -> Result<PrecalculatedFunds, LedgerError> {
        match self.vertices.get(&prefixed(FUNDS_PREFIX, address.as_bytes()))? {
            None => Ok(PrecalculatedFunds::default()),
            Some(bytes) => Ok(PrecalculatedFunds::decode(&bytes)?),
        }
    }

    /// Replace the nets of every listed address in one atomic write.
    pub fn save_all_funds<'a>(
        &self,
        funds: impl IntoIterator<Item = (&'a Address, &'a PrecalculatedFunds)>,
    ) -> Result<(), LedgerError> {
        let batch = funds
            .into_iter()
            .map(|(address, net)| -> Result<_, LedgerError> {
                Ok((prefixed(FUNDS_PREFIX, address.as_bytes()), net.encode()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.vertices.set_batch(&batch)?;
        Ok(())
    }

    /// Every persisted checkpoint net, without touching archived vertices.
    pub fn all_funds(&self) -> Result<Vec<(Address, PrecalculatedFunds)>, LedgerError> {
        let mut out = Vec::new();
        self.vertices.for_each_prefix(FUNDS_PREFIX, &mut |key, value| {
            let Some(raw) = key.strip_prefix(FUNDS_PREFIX) else {
                return Ok(());
            };
            let address = std::str::from_utf8(raw)
                .map_err(|e| StoreError::Corruption(format!("funds key: {e}")))?;
            let funds = PrecalculatedFunds::decode(value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            out.push((Address::new(address), funds));
            Ok(())
        })?;
        Ok(out)
    }

    /// Write the archive entries changed since `since` to
    /// `<dir>/vertex_db_backup_<since>.bak`; returns the next sequence.
    pub fn backup_archive(&self, dir: &Path, since: u64) -> Result<(PathBuf, u64), LedgerError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("vertex_db_backup_{since}.bak"));
        let mut writer = BufWriter::new(File::create(&path)?);
        let next = self.vertices.backup(&mut writer, since)?;
        writer.flush()?;
        Ok((path, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_crypto::{Signer, Wallet};
    use tangle_store::backup::read_records;
    use tangle_transactions::Transaction;
    use tangle_types::Melange;

    fn sample_vertex() -> Vertex {
        let issuer = Wallet::from_seed(&[3; 32]);
        let receiver = Wallet::from_seed(&[4; 32]);
        let tx = Transaction::new("s", Melange::new(1, 0), vec![], receiver.address(), &issuer).unwrap();
        Vertex::new(tx, VertexHash::ZERO, VertexHash::ZERO, 0, &issuer)
    }

    #[test]
    fn trx_index_round_trip() {
        let stores = LedgerStores::in_memory();
        let v = sample_vertex();
        assert!(!stores.is_trx_mapped(&v.transaction.hash).unwrap());
        stores.map_trx(&v.transaction.hash, &v.hash).unwrap();
        assert_eq!(stores.vertex_of_trx(&v.transaction.hash).unwrap(), Some(v.hash));
        stores.unmap_trx(&v.transaction.hash).unwrap();
        assert_eq!(stores.vertex_of_trx(&v.transaction.hash).unwrap(), None);
    }

    #[test]
    fn archive_and_funds_share_a_store() {
        let stores = LedgerStores::in_memory();
        let v = sample_vertex();
        stores.archive_vertex(&v).unwrap();
        assert!(stores.is_archived(&v.hash).unwrap());
        assert_eq!(stores.archived_vertex(&v.hash).unwrap(), Some(v.clone()));

        let funds = PrecalculatedFunds {
            credit: Melange::new(5, 0),
            debit: Melange::ZERO,
        };
        stores.save_all_funds([(&v.transaction.receiver, &funds)]).unwrap();
        assert_eq!(stores.funds(&v.transaction.receiver).unwrap(), funds);
        assert_eq!(stores.funds(&v.transaction.issuer).unwrap(), PrecalculatedFunds::default());
        assert_eq!(stores.all_funds().unwrap(), vec![(v.transaction.receiver.clone(), funds)]);
    }

    #[test]
    fn failed_batch_keeps_previous_nets() {
        let vertices = Arc::new(NullStore::new());
        let stores = LedgerStores::new(Arc::new(NullStore::new()), Arc::new(NullStore::new()), vertices.clone());
        let (a, b) = (Wallet::from_seed(&[5; 32]).address(), Wallet::from_seed(&[6; 32]).address());
        let old = PrecalculatedFunds { credit: Melange::new(1, 0), debit: Melange::ZERO };
        let new = PrecalculatedFunds { credit: Melange::new(2, 0), debit: Melange::ZERO };
        stores.save_all_funds([(&a, &old), (&b, &old)]).unwrap();

        vertices.set_write_budget(Some(1));
        assert!(stores.save_all_funds([(&a, &new), (&b, &new)]).is_err());
        assert_eq!(stores.funds(&a).unwrap(), old);
        assert_eq!(stores.funds(&b).unwrap(), old);

        vertices.set_write_budget(None);
        stores.save_all_funds([(&a, &new), (&b, &new)]).unwrap();
        assert_eq!(stores.all_funds().unwrap().len(), 2);
        assert_eq!(stores.funds(&b).unwrap(), new);
    }

    #[test]
    fn trusted_nodes() {
        let stores = LedgerStores::in_memory();
        let node = Wallet::from_seed(&[9; 32]).address();
        stores.add_trusted(&node).unwrap();
        assert!(stores.is_trusted(&node).unwrap());
        stores.remove_trusted(&node).unwrap();
        assert!(!stores.is_trusted(&node).unwrap());
    }

    #[test]
    fn backup_is_incremental() {
        let dir = tempfile::tempdir().unwrap();
        let stores = LedgerStores::in_memory();
        stores.archive_vertex(&sample_vertex()).unwrap();
        let (first, next) = stores.backup_archive(dir.path(), 0).unwrap();
        assert!(first.ends_with("vertex_db_backup_0.bak"));
        assert_eq!(read_records(&mut File::open(&first).unwrap()).unwrap().len(), 1);

        stores.archive_vertex(&sample_vertex()).unwrap();
        let (second, _) = stores.backup_archive(dir.path(), next).unwrap();
        assert_eq!(read_records(&mut File::open(&second).unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn lmdb_store_opens_for_non_empty_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trx");
        let store = open_store(path.to_str().unwrap()).unwrap();
        store.set(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
