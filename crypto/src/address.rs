//! Address derivation from public keys.
//!
//! Address format: `tngl_` + hex(public_key, 64 chars) + hex(checksum, 8 chars)
//!
//! Checksum: first 4 bytes of Blake2b-256(public_key). Lower-case hex only;
//! an upper-case address is treated as a different (invalid) string so that
//! one key maps to exactly one address.

use tangle_types::{Address, PublicKey};

use crate::blake2b_256;

const PUBKEY_CHARS: usize = 64;
const CHECKSUM_BYTES: usize = 4;
const ENCODED_LEN: usize = PUBKEY_CHARS + CHECKSUM_BYTES * 2;

pub fn derive_address(public_key: &PublicKey) -> Address {
    let checksum = &blake2b_256(public_key.as_bytes())[..CHECKSUM_BYTES];
    Address::new(format!(
        "{}{}{}",
        Address::PREFIX,
        hex::encode(public_key.as_bytes()),
        hex::encode(checksum)
    ))
}

/// Extract the public key from an address.
///
/// Returns `None` if the address is malformed or its checksum does not match.
pub fn decode_address(address: &str) -> Option<PublicKey> {
    let encoded = address.strip_prefix(Address::PREFIX)?;
    if encoded.len() != ENCODED_LEN || encoded.bytes().any(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let (key_hex, checksum_hex) = encoded.split_at(PUBKEY_CHARS);

    let mut key = [0u8; 32];
    hex::decode_to_slice(key_hex, &mut key).ok()?;
    let mut checksum = [0u8; CHECKSUM_BYTES];
    hex::decode_to_slice(checksum_hex, &mut checksum).ok()?;

    if blake2b_256(&key)[..CHECKSUM_BYTES] != checksum {
        return None;
    }
    Some(PublicKey(key))
}

pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_some()
}
