//! Solana addresses are Base58-encoded 32-byte Ed25519 public keys.

use crate::error::SolError;

/// Convert an Ed25519 public key to its Solana address.
pub fn public_key_to_address(ed25519_pubkey: &[u8]) -> Result<String, SolError> {
    let key: &[u8; 32] = ed25519_pubkey.try_into().map_err(|_| {
        SolError::InvalidPublicKey(format!(
            "expected 32-byte ed25519 key, got {} bytes",
            ed25519_pubkey.len()
        ))
    })?;
    Ok(bytes_to_address(key))
}

/// Returns `Ok(true)` for a Base58 string decoding to exactly 32 bytes.
pub fn validate_address(address: &str) -> Result<bool, SolError> {
    address_to_bytes(address).map(|_| true)
}

/// Decode a Solana address string to its 32-byte representation.
pub fn address_to_bytes(address: &str) -> Result<[u8; 32], SolError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| SolError::InvalidAddress(format!("base58 decode failed: {e}")))?;

    bytes.try_into().map_err(|v: Vec<u8>| {
        SolError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
    })
}

pub fn bytes_to_address(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}
