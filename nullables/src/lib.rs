//! Nullable infrastructure.
//!
//! Test-friendly and storage-less stand-ins for the external dependencies of
//! the ledger. They never touch the filesystem and can be told to fail on
//! demand so error paths are reachable from tests.

pub mod store;

pub use store::NullStore;
