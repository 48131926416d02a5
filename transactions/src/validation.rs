//! Stateless transaction checks: validity window and signatures.
//!
//! Balance sufficiency is a ledger concern and is not checked here.

use std::time::Duration;

use tangle_crypto::SignatureVerifier;
use tangle_types::Timestamp;

use crate::error::TransactionError;
use crate::Transaction;

/// How long after creation a transaction may still be co-signed.
pub const EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A transaction may be co-signed only between its creation and [`EXPIRATION`].
pub fn check_validity_window(created_at: Timestamp, now: Timestamp) -> Result<(), TransactionError> {
    if created_at > now {
        return Err(TransactionError::FutureTimestamp);
    }
    if created_at.saturating_add(EXPIRATION) < now {
        return Err(TransactionError::Expired);
    }
    Ok(())
}

pub fn verify_issuer(tx: &Transaction, verifier: &dyn SignatureVerifier) -> Result<(), TransactionError> {
    verifier.verify(&tx.message(), &tx.issuer_signature, tx.hash.as_bytes(), &tx.issuer)?;
    Ok(())
}

pub fn verify_issuer_receiver(
    tx: &Transaction,
    verifier: &dyn SignatureVerifier,
) -> Result<(), TransactionError> {
    let receiver_signature = tx
        .receiver_signature
        .as_ref()
        .ok_or(TransactionError::MissingReceiverSignature)?;
    let message = tx.message();
    verifier.verify(&message, &tx.issuer_signature, tx.hash.as_bytes(), &tx.issuer)?;
    verifier.verify(&message, receiver_signature, tx.hash.as_bytes(), &tx.receiver)?;
    Ok(())
}
