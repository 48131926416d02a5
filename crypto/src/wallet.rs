//! Concrete signing and verification capabilities.

use tangle_types::{Address, KeyPair, PrivateKey, PublicKey, Signature};

use crate::address::{decode_address, derive_address};
use crate::hash::blake2b_256;
use crate::keys::{generate_keypair, keypair_from_seed};
use crate::sign::{sign_message, verify_signature};
use crate::{CryptoError, SignatureVerifier, Signer};

/// An Ed25519 identity able to sign on behalf of its address.
pub struct Wallet {
    public: PublicKey,
    private: PrivateKey,
    address: Address,
}

impl Wallet {
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self::from_keypair(generate_keypair()?))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_keypair(keypair_from_seed(seed))
    }

    /// Parse a hex-encoded 32-byte seed, as stored in node configuration.
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(seed_hex.trim(), &mut seed)
            .map_err(|e| CryptoError::InvalidSeed(e.to_string()))?;
        let wallet = Self::from_seed(&seed);
        zeroize::Zeroize::zeroize(&mut seed);
        Ok(wallet)
    }

    pub fn from_keypair(kp: KeyPair) -> Self {
        let address = derive_address(&kp.public);
        Self {
            public: kp.public,
            private: kp.private,
            address,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl Signer for Wallet {
    fn sign(&self, message: &[u8]) -> ([u8; 32], Signature) {
        let digest = blake2b_256(message);
        (digest, sign_message(&digest, &self.private))
    }

    fn address(&self) -> Address {
        self.address.clone()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address).finish()
    }
}

/// Verifies digests signed by a [`Wallet`], resolving the key from the address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(
        &self,
        message: &[u8],
        signature: &Signature,
        digest: &[u8; 32],
        address: &Address,
    ) -> Result<(), CryptoError> {
        if blake2b_256(message) != *digest {
            return Err(CryptoError::DigestMismatch);
        }
        let public = decode_address(address.as_str())
            .ok_or_else(|| CryptoError::InvalidAddress(address.to_string()))?;
        if !verify_signature(digest, signature, &public) {
            return Err(CryptoError::InvalidSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_message_verifies() {
        let wallet = Wallet::from_seed(&[11u8; 32]);
        let (digest, sig) = wallet.sign(b"payload");
        assert_eq!(digest, blake2b_256(b"payload"));
        Ed25519Verifier
            .verify(b"payload", &sig, &digest, &wallet.address())
            .unwrap();
    }

    #[test]
    fn tampered_message_fails_digest_check() {
        let wallet = Wallet::from_seed(&[11u8; 32]);
        let (digest, sig) = wallet.sign(b"payload");
        assert!(matches!(
            Ed25519Verifier.verify(b"payl0ad", &sig, &digest, &wallet.address()),
            Err(CryptoError::DigestMismatch)
        ));
    }

    #[test]
    fn wrong_address_fails() {
        let signer = Wallet::from_seed(&[11u8; 32]);
        let other = Wallet::from_seed(&[12u8; 32]);
        let (digest, sig) = signer.sign(b"payload");
        assert!(matches!(
            Ed25519Verifier.verify(b"payload", &sig, &digest, &other.address()),
            Err(CryptoError::InvalidSignature)
        ));
        assert!(matches!(
            Ed25519Verifier.verify(b"payload", &sig, &digest, &Address::from("tngl_nope")),
            Err(CryptoError::InvalidAddress(_))
        ));
    }

    #[test]
    fn hex_seed() {
        let from_hex = Wallet::from_hex_seed(&hex::encode([11u8; 32])).unwrap();
        assert_eq!(from_hex.address(), Wallet::from_seed(&[11u8; 32]).address());
        assert!(Wallet::from_hex_seed("zz").is_err());
    }
}
