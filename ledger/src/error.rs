use tangle_store::StoreError;
use tangle_transactions::TransactionError;
use tangle_types::MelangeError;
use thiserror::Error;

use crate::graph::{GraphError, WalkCancelled};

#[derive(Debug, Error)]
pub enum LedgerError {
    // ── Process control ────────────────────────────────────────────────
    #[error("dag is not loaded")]
    DagNotLoaded,

    #[error("dag is already loaded")]
    DagAlreadyLoaded,

    // ── Rejected input ─────────────────────────────────────────────────
    #[error("leaf rejected: {0}")]
    LeafRejected(String),

    #[error("new leaf rejected: {0}")]
    NewLeafRejected(String),

    #[error("leaf already exists")]
    LeafAlreadyExists,

    #[error("transaction in vertex already exists")]
    TrxAlreadyMapped,

    #[error("vertex already exists")]
    VertexAlreadyExists,

    #[error("double spending or insufficient funds")]
    InsufficientFunds,

    #[error("leaf weight {weight} below admission threshold (current {current}, throughput {throughput})")]
    WeightBelowThreshold { weight: u64, current: u64, throughput: u64 },

    #[error("issuer cannot transfer funds via owned node")]
    SelfDealing,

    #[error("issuer cannot be the genesis wallet")]
    GenesisAsSpender,

    #[error("genesis vertex rejected: {0}")]
    GenesisRejected(String),

    // ── Lookups ────────────────────────────────────────────────────────
    #[error("transaction not found")]
    TrxNotFound,

    #[error("vertex not found")]
    VertexNotFound,

    // ── Cancellation ───────────────────────────────────────────────────
    #[error("operation cancelled")]
    Cancelled,

    // ── Unexpected / internal ──────────────────────────────────────────
    #[error("unexpected failure: {0}")]
    Unexpected(String),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("melange error: {0}")]
    Melange(#[from] MelangeError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<WalkCancelled> for LedgerError {
    fn from(_: WalkCancelled) -> Self {
        LedgerError::Cancelled
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl LedgerError {
    /// The input was bad; the offending vertex or transaction is dropped.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            LedgerError::LeafRejected(_)
                | LedgerError::NewLeafRejected(_)
                | LedgerError::LeafAlreadyExists
                | LedgerError::TrxAlreadyMapped
                | LedgerError::VertexAlreadyExists
                | LedgerError::InsufficientFunds
                | LedgerError::WeightBelowThreshold { .. }
                | LedgerError::SelfDealing
                | LedgerError::GenesisAsSpender
                | LedgerError::GenesisRejected(_)
                | LedgerError::Transaction(_)
        )
    }

    /// Bootstrap state errors callers branch on.
    pub fn is_process_control(&self) -> bool {
        matches!(self, LedgerError::DagNotLoaded | LedgerError::DagAlreadyLoaded)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LedgerError::Cancelled)
    }

    /// A bug or storage corruption rather than bad input.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            LedgerError::Unexpected(_)
                | LedgerError::Graph(_)
                | LedgerError::Store(_)
                | LedgerError::Melange(_)
                | LedgerError::Io(_)
                | LedgerError::Serialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        let samples = [
            LedgerError::DagNotLoaded,
            LedgerError::InsufficientFunds,
            LedgerError::Cancelled,
            LedgerError::Unexpected("x".into()),
            LedgerError::Store(StoreError::Backend("down".into())),
        ];
        for e in &samples {
            let kinds = [
                e.is_rejected_input(),
                e.is_process_control(),
                e.is_cancelled(),
                e.is_unexpected(),
            ];
            assert_eq!(kinds.iter().filter(|k| **k).count(), 1, "{e}");
        }
    }

    #[test]
    fn walk_cancellation_maps_to_cancelled() {
        assert!(LedgerError::from(WalkCancelled).is_cancelled());
    }
}
