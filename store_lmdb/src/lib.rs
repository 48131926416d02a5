//! LMDB storage backend for the tangle ledger.
//!
//! Implements [`tangle_store::KeyValueStore`] using the `heed` LMDB bindings.
//! Each store lives in its own environment directory.

pub mod environment;
pub mod error;
pub mod store;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use store::LmdbStore;
