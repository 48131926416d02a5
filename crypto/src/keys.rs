//! Ed25519 key generation.

use ed25519_dalek::SigningKey;
use tangle_types::{KeyPair, PrivateKey, PublicKey};
use zeroize::Zeroize;

use crate::CryptoError;

/// Generate a new key pair from the operating system's random source.
pub fn generate_keypair() -> Result<KeyPair, CryptoError> {
    let mut seed = [0u8; 32];
    getrandom::getrandom(&mut seed).map_err(|e| CryptoError::Entropy(e.to_string()))?;
    let kp = keypair_from_seed(&seed);
    seed.zeroize();
    Ok(kp)
}

pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    PublicKey(SigningKey::from_bytes(&private.0).verifying_key().to_bytes())
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = generate_keypair().unwrap();
        let b = generate_keypair().unwrap();
        assert_ne!(a.public, b.public);
    }

    #[test]
    fn seed_is_deterministic() {
        let a = keypair_from_seed(&[42u8; 32]);
        let b = keypair_from_seed(&[42u8; 32]);
        assert_eq!(a.public, b.public);
        assert_eq!(public_from_private(&a.private), a.public);
    }
}
