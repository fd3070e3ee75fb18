use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::{CompressedPublicKey, ScriptBuf};

use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Derive a P2WPKH (native SegWit bech32) address from a compressed public key.
///
/// Returns `bc1...` for mainnet, `tb1...` for testnet/signet and `bcrt1...`
/// for regtest.
pub fn pubkey_to_p2wpkh_address(
    pubkey_bytes: &[u8],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let compressed_pk = parse_compressed_pubkey(pubkey_bytes)?;
    let address = Address::p2wpkh(&compressed_pk, network.to_bitcoin_network());
    Ok(address.to_string())
}

/// The P2WPKH locking script paying to `pubkey_bytes`.
pub fn p2wpkh_script(pubkey_bytes: &[u8]) -> Result<ScriptBuf, BtcError> {
    let compressed_pk = parse_compressed_pubkey(pubkey_bytes)?;
    Ok(ScriptBuf::new_p2wpkh(&compressed_pk.wpubkey_hash()))
}

pub(crate) fn parse_compressed_pubkey(pubkey_bytes: &[u8]) -> Result<CompressedPublicKey, BtcError> {
    if pubkey_bytes.len() != 33 {
        return Err(BtcError::InvalidPublicKey(format!(
            "expected 33-byte compressed key, got {} bytes",
            pubkey_bytes.len()
        )));
    }
    CompressedPublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })
}

/// Parse an address and require it to belong to `network`.
pub fn parse_address(address: &str, network: BtcNetwork) -> Result<Address, BtcError> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| BtcError::InvalidAddress(format!("address is for another network: {e}")))
}

/// Validate a Bitcoin address string for the given network.
///
/// Returns `false` for well-formed addresses of another network and an
/// error for strings that are not addresses at all.
pub fn validate_address(address: &str, network: BtcNetwork) -> Result<bool, BtcError> {
    let parsed = address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?;
    Ok(parsed.is_valid_for_network(network.to_bitcoin_network()))
}
