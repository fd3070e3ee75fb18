use alloy_primitives::Address;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// Derives an EIP-55 checksummed address from a SEC1-encoded secp256k1
/// public key, compressed (33 bytes) or uncompressed (65 bytes).
pub fn public_key_to_address(pubkey: &[u8]) -> Result<String, EthError> {
    let public_key = PublicKey::from_sec1_bytes(pubkey)
        .map_err(|e| EthError::InvalidPublicKey(format!("invalid secp256k1 key: {e}")))?;
    let uncompressed = public_key.to_encoded_point(false);
    address_from_uncompressed(uncompressed.as_bytes())
}

/// Keccak-256 of the 64-byte key body (0x04 prefix dropped), last 20 bytes.
pub(crate) fn address_from_uncompressed(uncompressed: &[u8]) -> Result<String, EthError> {
    if uncompressed.len() != 65 || uncompressed[0] != 0x04 {
        return Err(EthError::InvalidPublicKey(
            "uncompressed key must be 65 bytes starting with 0x04".into(),
        ));
    }
    let hash = Keccak256::digest(&uncompressed[1..]);
    checksum_address(&format!("0x{}", hex::encode(&hash[12..])))
}

/// Parses a 0x-prefixed hex address, verifying the checksum when mixed case.
pub fn parse_address(address: &str) -> Result<Address, EthError> {
    if !validate_address(address)? {
        return Err(EthError::InvalidAddress(format!(
            "checksum mismatch for {address}"
        )));
    }
    let bytes = hex::decode(&address[2..])
        .map_err(|e| EthError::InvalidAddress(format!("invalid hex: {e}")))?;
    Ok(Address::from_slice(&bytes))
}

/// Validates an Ethereum address string.
///
/// Malformed strings are errors. A well-formed mixed-case address whose
/// EIP-55 checksum does not match returns `Ok(false)`.
pub fn validate_address(address: &str) -> Result<bool, EthError> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidAddress("address must start with 0x".into()))?;

    if hex_part.len() != 40 {
        return Err(EthError::InvalidAddress(format!(
            "expected 40 hex characters, got {}",
            hex_part.len()
        )));
    }
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EthError::InvalidAddress(
            "address contains non-hex characters".into(),
        ));
    }

    let is_all_lower = hex_part.chars().all(|c| !c.is_ascii_uppercase());
    let is_all_upper = hex_part.chars().all(|c| !c.is_ascii_lowercase());
    if is_all_lower || is_all_upper {
        return Ok(true);
    }

    let checksummed = checksum_address(&format!("0x{}", hex_part.to_lowercase()))?;
    Ok(checksummed[2..] == *hex_part)
}

/// Applies EIP-55 mixed-case checksum encoding to a 0x-prefixed address.
pub fn checksum_address(address: &str) -> Result<String, EthError> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidAddress("address must start with 0x".into()))?
        .to_lowercase();

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EthError::InvalidAddress(format!(
            "not a 20-byte hex address: {address}"
        )));
    }

    let hash = Keccak256::digest(hex_part.as_bytes());

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");
    for (i, c) in hex_part.chars().enumerate() {
        // Nibble i of the hash decides the case of character i.
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            checksummed.push(c.to_ascii_uppercase());
        } else {
            checksummed.push(c);
        }
    }

    Ok(checksummed)
}
