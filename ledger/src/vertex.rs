//! Vertex: one signed node of the ledger DAG, wrapping a single transaction.

use serde::{Deserialize, Serialize};
use tangle_crypto::{SignatureVerifier, Signer};
use tangle_transactions::Transaction;
use tangle_types::{Address, Signature, Timestamp, VertexHash};

use crate::LedgerError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub created_at: Timestamp,
    /// Address of the node that embedded the transaction.
    pub signer: Address,
    pub signature: Signature,
    pub transaction: Transaction,
    pub hash: VertexHash,
    pub left_parent: VertexHash,
    pub right_parent: VertexHash,
    pub weight: u64,
}

impl Vertex {
    /// Wrap `transaction` and sign the result as the embedding node.
    pub fn new(
        transaction: Transaction,
        left_parent: VertexHash,
        right_parent: VertexHash,
        weight: u64,
        signer: &dyn Signer,
    ) -> Self {
        let mut vertex = Self {
            created_at: Timestamp::now(),
            signer: signer.address(),
            signature: Signature::EMPTY,
            transaction,
            hash: VertexHash::ZERO,
            left_parent,
            right_parent,
            weight,
        };
        let (digest, signature) = signer.sign(&vertex.signed_payload());
        vertex.hash = VertexHash::new(digest);
        vertex.signature = signature;
        vertex
    }

    /// created_at (LE micros) | transaction hash | left parent | right parent | weight (LE)
    fn signed_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(8 + 32 * 3 + 8);
        payload.extend_from_slice(&self.created_at.to_le_bytes());
        payload.extend_from_slice(self.transaction.hash.as_bytes());
        payload.extend_from_slice(self.left_parent.as_bytes());
        payload.extend_from_slice(self.right_parent.as_bytes());
        payload.extend_from_slice(&self.weight.to_le_bytes());
        payload
    }

    /// Check the transaction signatures (both for a contract, issuer only
    /// otherwise) and then the vertex signature itself.
    pub fn verify(&self, verifier: &dyn SignatureVerifier) -> Result<(), LedgerError> {
        if self.transaction.is_contract() {
            self.transaction.verify_issuer_receiver(verifier)?;
        } else {
            self.transaction.verify_issuer(verifier)?;
        }
        verifier
            .verify(&self.signed_payload(), &self.signature, self.hash.as_bytes(), &self.signer)
            .map_err(|e| LedgerError::LeafRejected(format!("vertex signature: {e}")))
    }

    /// Both parent slots, in declaration order.
    pub fn parents(&self) -> [VertexHash; 2] {
        [self.left_parent, self.right_parent]
    }

    /// Parents with the duplicate slot removed.
    pub fn distinct_parents(&self) -> impl Iterator<Item = VertexHash> {
        let [left, right] = self.parents();
        std::iter::once(left).chain((right != left).then_some(right))
    }

    /// Genesis shape: no parents at all.
    pub fn has_no_parents(&self) -> bool {
        self.left_parent.is_zero() && self.right_parent.is_zero()
    }

    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Weight of a vertex attached to parents of the given weights.
pub fn next_weight(left: u64, right: u64) -> u64 {
    left.max(right).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_crypto::{Ed25519Verifier, Wallet};
    use tangle_types::Melange;

    fn transaction(data: Vec<u8>) -> (Wallet, Wallet, Transaction) {
        let issuer = Wallet::from_seed(&[1u8; 32]);
        let receiver = Wallet::from_seed(&[2u8; 32]);
        let tx = Transaction::new("subject", Melange::new(1, 0), data, receiver.address(), &issuer).unwrap();
        (issuer, receiver, tx)
    }

    #[test]
    fn signed_vertex_verifies() {
        let node = Wallet::from_seed(&[9u8; 32]);
        let (_, _, tx) = transaction(vec![]);
        let vrx = Vertex::new(tx, VertexHash::ZERO, VertexHash::ZERO, 0, &node);
        assert_eq!(vrx.signer, node.address());
        assert!(vrx.has_no_parents());
        vrx.verify(&Ed25519Verifier).unwrap();
    }

    #[test]
    fn tampered_weight_fails() {
        let node = Wallet::from_seed(&[9u8; 32]);
        let (_, _, tx) = transaction(vec![]);
        let mut vrx = Vertex::new(tx, VertexHash::new([1; 32]), VertexHash::new([2; 32]), 3, &node);
        vrx.weight = 4;
        assert!(matches!(vrx.verify(&Ed25519Verifier), Err(LedgerError::LeafRejected(_))));
    }

    #[test]
    fn contract_requires_receiver_signature() {
        let node = Wallet::from_seed(&[9u8; 32]);
        let (_, receiver, mut tx) = transaction(b"contract".to_vec());
        let unsigned = Vertex::new(tx.clone(), VertexHash::ZERO, VertexHash::ZERO, 0, &node);
        assert!(matches!(unsigned.verify(&Ed25519Verifier), Err(LedgerError::Transaction(_))));

        tx.sign_as_receiver(&receiver, &Ed25519Verifier).unwrap();
        let signed = Vertex::new(tx, VertexHash::ZERO, VertexHash::ZERO, 0, &node);
        signed.verify(&Ed25519Verifier).unwrap();
    }

    #[test]
    fn contract_stripped_of_its_data_fails() {
        let node = Wallet::from_seed(&[9u8; 32]);
        let (_, _, mut tx) = transaction(b"terms".to_vec());
        tx.subject = "subjectterms".into();
        tx.data.clear();
        let vrx = Vertex::new(tx, VertexHash::ZERO, VertexHash::ZERO, 0, &node);
        assert!(matches!(vrx.verify(&Ed25519Verifier), Err(LedgerError::Transaction(_))));
    }

    #[test]
    fn distinct_parents_dedupes() {
        let node = Wallet::from_seed(&[9u8; 32]);
        let (_, _, tx) = transaction(vec![]);
        let p = VertexHash::new([7; 32]);
        let vrx = Vertex::new(tx, p, p, 1, &node);
        assert_eq!(vrx.distinct_parents().collect::<Vec<_>>(), vec![p]);
    }

    #[test]
    fn encode_decode() {
        let node = Wallet::from_seed(&[9u8; 32]);
        let (_, _, tx) = transaction(vec![]);
        let vrx = Vertex::new(tx, VertexHash::ZERO, VertexHash::ZERO, 0, &node);
        assert_eq!(Vertex::decode(&vrx.encode().unwrap()).unwrap(), vrx);
    }

    #[test]
    fn weight_rule() {
        assert_eq!(next_weight(3, 5), 6);
        assert_eq!(next_weight(u64::MAX, 0), u64::MAX);
    }
}
