use tangle_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("subject cannot be empty")]
    EmptySubject,

    #[error("receiver address is invalid: {0}")]
    InvalidReceiverAddress(String),

    #[error("transaction has a future time")]
    FutureTimestamp,

    #[error("transaction has expired")]
    Expired,

    #[error("signature not valid or data corrupted: {0}")]
    InvalidSignature(#[from] CryptoError),

    #[error("co-signing produced a digest different from the transaction hash")]
    HashMismatch,

    #[error("signer {signer} is not the receiver {receiver}")]
    ReceiverMismatch { signer: String, receiver: String },

    #[error("transaction is missing the receiver signature")]
    MissingReceiverSignature,
}
