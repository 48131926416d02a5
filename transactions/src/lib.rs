//! Transactions carried by tangle vertices.
//!
//! A transaction is signed once by its issuer at construction. The receiver
//! may later add a co-signature over the same canonical message; a contract
//! (non-empty `data`) needs both before a vertex carrying it is accepted.

pub mod error;
pub mod validation;

pub use error::TransactionError;

use serde::{Deserialize, Serialize};
use tangle_crypto::{validate_address, SignatureVerifier, Signer};
use tangle_types::{Address, Melange, Signature, Timestamp, TxHash};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub created_at: Timestamp,
    pub issuer: Address,
    pub receiver: Address,
    pub subject: String,
    pub data: Vec<u8>,
    pub issuer_signature: Signature,
    pub receiver_signature: Option<Signature>,
    pub hash: TxHash,
    pub spice: Melange,
}

impl Transaction {
    /// Create a transaction signed by `issuer`, stamped with the current time.
    pub fn new(
        subject: impl Into<String>,
        spice: Melange,
        data: Vec<u8>,
        receiver: Address,
        issuer: &dyn Signer,
    ) -> Result<Self, TransactionError> {
        Self::new_at(Timestamp::now(), subject, spice, data, receiver, issuer)
    }

    pub fn new_at(
        created_at: Timestamp,
        subject: impl Into<String>,
        spice: Melange,
        data: Vec<u8>,
        receiver: Address,
        issuer: &dyn Signer,
    ) -> Result<Self, TransactionError> {
        let subject = subject.into();
        if subject.is_empty() {
            return Err(TransactionError::EmptySubject);
        }
        if !validate_address(receiver.as_str()) {
            return Err(TransactionError::InvalidReceiverAddress(receiver.to_string()));
        }

        let mut tx = Self {
            created_at,
            issuer: issuer.address(),
            receiver,
            subject,
            data,
            issuer_signature: Signature::EMPTY,
            receiver_signature: None,
            hash: TxHash::ZERO,
            spice,
        };
        let (digest, signature) = issuer.sign(&tx.message());
        tx.hash = TxHash::new(digest);
        tx.issuer_signature = signature;
        Ok(tx)
    }

    /// Canonical byte encoding covered by both signatures:
    /// subject and data each behind a u64 LE length, issuer, receiver,
    /// created_at (LE micros), spice limbs (LE).
    pub fn message(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(
            self.subject.len() + self.data.len() + self.issuer.as_str().len() + self.receiver.as_str().len() + 40,
        );
        message.extend_from_slice(&(self.subject.len() as u64).to_le_bytes());
        message.extend_from_slice(self.subject.as_bytes());
        message.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        message.extend_from_slice(&self.data);
        message.extend_from_slice(self.issuer.as_bytes());
        message.extend_from_slice(self.receiver.as_bytes());
        message.extend_from_slice(&self.created_at.to_le_bytes());
        message.extend_from_slice(&self.spice.currency().to_le_bytes());
        message.extend_from_slice(&self.spice.supplementary().to_le_bytes());
        message
    }

    /// Co-sign as the receiver, after checking the validity window and the
    /// issuer's signature. Returns the (unchanged) transaction hash.
    pub fn sign_as_receiver(
        &mut self,
        receiver: &dyn Signer,
        verifier: &dyn SignatureVerifier,
    ) -> Result<TxHash, TransactionError> {
        self.sign_as_receiver_at(Timestamp::now(), receiver, verifier)
    }

    pub fn sign_as_receiver_at(
        &mut self,
        now: Timestamp,
        receiver: &dyn Signer,
        verifier: &dyn SignatureVerifier,
    ) -> Result<TxHash, TransactionError> {
        validation::check_validity_window(self.created_at, now)?;

        let signer = receiver.address();
        if signer != self.receiver {
            return Err(TransactionError::ReceiverMismatch {
                signer: signer.to_string(),
                receiver: self.receiver.to_string(),
            });
        }

        let message = self.message();
        verifier.verify(&message, &self.issuer_signature, self.hash.as_bytes(), &self.issuer)?;

        let (digest, signature) = receiver.sign(&message);
        if digest != *self.hash.as_bytes() {
            return Err(TransactionError::HashMismatch);
        }
        self.receiver_signature = Some(signature);
        Ok(self.hash)
    }

    pub fn verify_issuer(&self, verifier: &dyn SignatureVerifier) -> Result<(), TransactionError> {
        validation::verify_issuer(self, verifier)
    }

    pub fn verify_issuer_receiver(&self, verifier: &dyn SignatureVerifier) -> Result<(), TransactionError> {
        validation::verify_issuer_receiver(self, verifier)
    }

    pub fn is_spice_transfer(&self) -> bool {
        !self.spice.is_empty()
    }

    pub fn is_contract(&self) -> bool {
        !self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_crypto::{Ed25519Verifier, Wallet};

    fn wallets() -> (Wallet, Wallet) {
        (Wallet::from_seed(&[1u8; 32]), Wallet::from_seed(&[2u8; 32]))
    }

    #[test]
    fn new_signs_as_issuer() {
        let (issuer, receiver) = wallets();
        let tx = Transaction::new("pay", Melange::new(5, 0), vec![], receiver.address(), &issuer).unwrap();
        assert_eq!(tx.issuer, issuer.address());
        assert!(!tx.hash.is_zero());
        assert!(tx.is_spice_transfer());
        assert!(!tx.is_contract());
        tx.verify_issuer(&Ed25519Verifier).unwrap();
        assert!(matches!(
            tx.verify_issuer_receiver(&Ed25519Verifier),
            Err(TransactionError::MissingReceiverSignature)
        ));
    }

    #[test]
    fn rejects_empty_subject_and_bad_receiver() {
        let (issuer, receiver) = wallets();
        assert!(matches!(
            Transaction::new("", Melange::ZERO, vec![], receiver.address(), &issuer),
            Err(TransactionError::EmptySubject)
        ));
        assert!(matches!(
            Transaction::new("s", Melange::ZERO, vec![], Address::from("tngl_short"), &issuer),
            Err(TransactionError::InvalidReceiverAddress(_))
        ));
    }

    #[test]
    fn message_covers_spice() {
        let (issuer, receiver) = wallets();
        let mut tx = Transaction::new("pay", Melange::new(5, 0), vec![], receiver.address(), &issuer).unwrap();
        tx.spice = Melange::new(500, 0);
        assert!(tx.verify_issuer(&Ed25519Verifier).is_err());
    }

    #[test]
    fn moving_data_into_subject_breaks_issuer_signature() {
        let (issuer, receiver) = wallets();
        let tx = Transaction::new("deal", Melange::ZERO, b"terms".to_vec(), receiver.address(), &issuer).unwrap();
        let mut resplit = tx.clone();
        resplit.subject = "dealterms".into();
        resplit.data = Vec::new();
        assert!(!resplit.is_contract());
        assert_ne!(resplit.message(), tx.message());
        assert!(resplit.verify_issuer(&Ed25519Verifier).is_err());
    }

    #[test]
    fn receiver_co_signs_contract() {
        let (issuer, receiver) = wallets();
        let mut tx = Transaction::new("deal", Melange::ZERO, b"terms".to_vec(), receiver.address(), &issuer).unwrap();
        assert!(tx.is_contract());
        let hash = tx.sign_as_receiver(&receiver, &Ed25519Verifier).unwrap();
        assert_eq!(hash, tx.hash);
        tx.verify_issuer_receiver(&Ed25519Verifier).unwrap();
    }

    #[test]
    fn only_the_receiver_may_co_sign() {
        let (issuer, receiver) = wallets();
        let stranger = Wallet::from_seed(&[3u8; 32]);
        let mut tx = Transaction::new("deal", Melange::ZERO, b"x".to_vec(), receiver.address(), &issuer).unwrap();
        assert!(matches!(
            tx.sign_as_receiver(&stranger, &Ed25519Verifier),
            Err(TransactionError::ReceiverMismatch { .. })
        ));
        assert!(tx.receiver_signature.is_none());
    }

    #[test]
    fn expired_and_future_rejected() {
        let (issuer, receiver) = wallets();
        let created = Timestamp::from_micros(10_000_000);
        let mut tx =
            Transaction::new_at(created, "deal", Melange::ZERO, b"x".to_vec(), receiver.address(), &issuer).unwrap();
        let late = created.saturating_add(validation::EXPIRATION + std::time::Duration::from_secs(1));
        assert!(matches!(
            tx.sign_as_receiver_at(late, &receiver, &Ed25519Verifier),
            Err(TransactionError::Expired)
        ));
        assert!(matches!(
            tx.sign_as_receiver_at(Timestamp::from_micros(1), &receiver, &Ed25519Verifier),
            Err(TransactionError::FutureTimestamp)
        ));
    }

    #[test]
    fn tampered_issuer_signature_blocks_co_signing() {
        let (issuer, receiver) = wallets();
        let mut tx = Transaction::new("deal", Melange::ZERO, b"x".to_vec(), receiver.address(), &issuer).unwrap();
        tx.subject = "other deal".into();
        assert!(matches!(
            tx.sign_as_receiver(&receiver, &Ed25519Verifier),
            Err(TransactionError::InvalidSignature(_))
        ));
    }

    #[test]
    fn bincode_round_trip() {
        let (issuer, receiver) = wallets();
        let tx = Transaction::new("pay", Melange::new(1, 2), vec![9], receiver.address(), &issuer).unwrap();
        let bytes = bincode::serialize(&tx).unwrap();
        let back: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, tx);
    }
}
