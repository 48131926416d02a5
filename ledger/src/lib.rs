//! DAG ledger engine.
//!
//! Vertices, each wrapping one signed transaction, form a directed acyclic
//! graph whose tips new vertices attach to. The [`AccountingBook`] owns the
//! graph and guards it against double spends by replaying a spender's
//! history at admission time; old history is periodically archived into
//! per-address checkpoints.

pub mod accountant;
pub mod balance;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod graph;
pub mod replier;
pub mod storage;
pub mod vertex;

pub use accountant::AccountingBook;
pub use balance::Balance;
pub use checkpoint::{can_truncate, FundsMap, HashAtDepth, PrecalculatedFunds};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use graph::{AncestorsWalk, Graph, GraphError, WalkCancelled};
pub use replier::{Replier, ReplierError};
pub use storage::{open_store, LedgerStores};
pub use vertex::{next_weight, Vertex};
