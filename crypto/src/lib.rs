//! Cryptographic primitives for the tangle ledger.
//!
//! - **Ed25519** for signing and signature verification
//! - **Blake2b-256** for transaction and vertex digests
//! - Address derivation with `tngl_` prefix and a hex checksum
//!
//! The ledger never touches keys directly. It consumes the [`Signer`] and
//! [`SignatureVerifier`] capabilities; [`Wallet`] and [`Ed25519Verifier`] are
//! the stock implementations.

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;
pub mod wallet;

pub use address::{decode_address, derive_address, validate_address};
pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
pub use wallet::{Ed25519Verifier, Wallet};

use tangle_types::{Address, Signature};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("digest does not match message")]
    DigestMismatch,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

/// Signing capability.
///
/// `sign` returns the Blake2b-256 digest of `message` together with a
/// signature over that digest.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> ([u8; 32], Signature);
    fn address(&self) -> Address;
}

/// Verification capability, the counterpart of [`Signer`].
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        message: &[u8],
        signature: &Signature,
        digest: &[u8; 32],
        address: &Address,
    ) -> Result<(), CryptoError>;
}
