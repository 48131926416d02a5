//! Fundamental types for the tangle ledger.
//!
//! Everything shared by the other crates lives here: vertex and transaction
//! hashes, wallet addresses, timestamps, key material and the two-limb
//! [`Melange`] currency amount.

pub mod address;
pub mod hash;
pub mod keys;
pub mod melange;
pub mod time;

pub use address::Address;
pub use hash::{TxHash, VertexHash};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use melange::{Melange, MelangeError, SUPPLEMENTARY_UNIT};
pub use time::Timestamp;
