use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};

use crate::address::{address_from_uncompressed, checksum_address, parse_address};
use crate::erc20;
use crate::error::EthError;

/// EIP-2718 type byte for EIP-1559 transactions.
const EIP1559_TX_TYPE: u8 = 0x02;

/// An unsigned EIP-1559 (type 2) Ethereum transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    /// Recipient address as a 0x-prefixed hex string.
    pub to: String,
    /// Transfer value in wei.
    pub value: u128,
    /// Calldata (empty for simple ETH transfers).
    pub data: Vec<u8>,
}

/// A signed EIP-1559 Ethereum transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEthTransaction {
    /// `0x02 || rlp(signed fields)`.
    pub raw_tx: Vec<u8>,
    /// Transaction hash as a 0x-prefixed hex string.
    pub tx_hash: String,
}

/// A signed transaction read back from its wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEthTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: String,
    pub value: u128,
    pub data: Vec<u8>,
    /// Address recovered from the signature.
    pub from: String,
}

impl DecodedEthTransaction {
    /// Upper bound of the fee this transaction can burn, in wei.
    pub fn max_fee_wei(&self) -> u128 {
        self.max_fee_per_gas.saturating_mul(self.gas_limit as u128)
    }
}

/// Builds an unsigned EIP-1559 ETH transfer transaction.
pub fn build_transfer(
    chain_id: u64,
    nonce: u64,
    to: &str,
    value_wei: u128,
    max_priority_fee: u128,
    max_fee: u128,
    gas_limit: u64,
) -> Result<EthTransaction, EthError> {
    parse_address(to)?;
    check_fee_caps(max_priority_fee, max_fee)?;

    Ok(EthTransaction {
        chain_id,
        nonce,
        max_priority_fee_per_gas: max_priority_fee,
        max_fee_per_gas: max_fee,
        gas_limit,
        to: to.to_string(),
        value: value_wei,
        data: Vec::new(),
    })
}

/// Builds an unsigned EIP-1559 ERC-20 token transfer transaction.
///
/// The calldata is encoded as `transfer(address,uint256)` and the
/// transaction itself carries no value.
#[allow(clippy::too_many_arguments)]
pub fn build_erc20_transfer(
    chain_id: u64,
    nonce: u64,
    token_contract: &str,
    to: &str,
    amount: u128,
    max_priority_fee: u128,
    max_fee: u128,
    gas_limit: u64,
) -> Result<EthTransaction, EthError> {
    parse_address(token_contract)?;
    check_fee_caps(max_priority_fee, max_fee)?;
    let calldata = erc20::encode_transfer(to, amount)?;

    Ok(EthTransaction {
        chain_id,
        nonce,
        max_priority_fee_per_gas: max_priority_fee,
        max_fee_per_gas: max_fee,
        gas_limit,
        to: token_contract.to_string(),
        value: 0,
        data: calldata,
    })
}

fn check_fee_caps(max_priority_fee: u128, max_fee: u128) -> Result<(), EthError> {
    if max_priority_fee > max_fee {
        return Err(EthError::TransactionBuildError(format!(
            "priority fee {max_priority_fee} exceeds max fee {max_fee}"
        )));
    }
    Ok(())
}

/// Encodes the unsigned transaction as `0x02 || rlp(fields)`.
///
/// The RLP-encoded fields are:
/// `[chain_id, nonce, max_priority_fee_per_gas, max_fee_per_gas, gas_limit, to,
///   value, data, access_list]`
pub fn encode_unsigned_tx(tx: &EthTransaction) -> Result<Vec<u8>, EthError> {
    let fields = UnsignedTxFields {
        chain_id: tx.chain_id,
        nonce: tx.nonce,
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
        max_fee_per_gas: tx.max_fee_per_gas,
        gas_limit: tx.gas_limit,
        to: parse_address(&tx.to)?,
        value: tx.value,
        data: Bytes::copy_from_slice(&tx.data),
        access_list: Vec::new(),
    };
    Ok(typed_envelope(&fields))
}

/// The 32-byte digest the signer must sign: `keccak256(0x02 || rlp(fields))`.
pub fn signing_hash(tx: &EthTransaction) -> Result<[u8; 32], EthError> {
    let payload = encode_unsigned_tx(tx)?;
    Ok(Keccak256::digest(&payload).into())
}

/// Builds the broadcastable transaction from a 64-byte `r || s` signature.
///
/// The recovery id is not trusted from the signer. Both parities are tried
/// and the one that recovers `public_key` wins; if neither does the
/// signature was made by another key.
pub fn assemble_signed_transaction(
    tx: &EthTransaction,
    signature: &[u8],
    public_key: &[u8],
) -> Result<SignedEthTransaction, EthError> {
    if signature.len() != 64 && signature.len() != 65 {
        return Err(EthError::InvalidSignature(format!(
            "expected 64-byte signature, got {} bytes",
            signature.len()
        )));
    }
    let expected_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| EthError::InvalidPublicKey(e.to_string()))?;

    let signature = Signature::from_slice(&signature[..64])
        .map_err(|e| EthError::InvalidSignature(e.to_string()))?;
    let signature = signature.normalize_s().unwrap_or(signature);

    let hash = signing_hash(tx)?;
    let recovery_id = [0u8, 1]
        .into_iter()
        .filter_map(RecoveryId::from_byte)
        .find(|id| {
            VerifyingKey::recover_from_prehash(&hash, &signature, *id)
                .map(|key| key == expected_key)
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            EthError::InvalidSignature("signature does not recover to wallet key".into())
        })?;

    let sig_bytes = signature.to_bytes();
    let fields = SignedTxFields {
        chain_id: tx.chain_id,
        nonce: tx.nonce,
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
        max_fee_per_gas: tx.max_fee_per_gas,
        gas_limit: tx.gas_limit,
        to: parse_address(&tx.to)?,
        value: tx.value,
        data: Bytes::copy_from_slice(&tx.data),
        access_list: Vec::new(),
        y_parity: recovery_id.is_y_odd(),
        r: U256::from_be_slice(&sig_bytes[..32]),
        s: U256::from_be_slice(&sig_bytes[32..]),
    };

    let raw_tx = typed_envelope(&fields);
    let tx_hash = format!("0x{}", hex::encode(Keccak256::digest(&raw_tx)));

    Ok(SignedEthTransaction { raw_tx, tx_hash })
}

/// Decodes a signed EIP-1559 transaction and recovers its sender.
pub fn decode_signed_transaction(raw_tx: &[u8]) -> Result<DecodedEthTransaction, EthError> {
    let (tx_type, mut body) = raw_tx
        .split_first()
        .ok_or_else(|| EthError::EncodingError("empty transaction".into()))?;
    if *tx_type != EIP1559_TX_TYPE {
        return Err(EthError::EncodingError(format!(
            "unsupported transaction type 0x{tx_type:02x}"
        )));
    }

    let fields = SignedTxFields::decode(&mut body)
        .map_err(|e| EthError::EncodingError(format!("rlp decode failed: {e}")))?;
    if !body.is_empty() {
        return Err(EthError::EncodingError("trailing bytes after transaction".into()));
    }

    let unsigned = UnsignedTxFields {
        chain_id: fields.chain_id,
        nonce: fields.nonce,
        max_priority_fee_per_gas: fields.max_priority_fee_per_gas,
        max_fee_per_gas: fields.max_fee_per_gas,
        gas_limit: fields.gas_limit,
        to: fields.to,
        value: fields.value,
        data: fields.data.clone(),
        access_list: fields.access_list.clone(),
    };
    let hash: [u8; 32] = Keccak256::digest(typed_envelope(&unsigned)).into();

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&fields.r.to_be_bytes::<32>());
    sig_bytes[32..].copy_from_slice(&fields.s.to_be_bytes::<32>());
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| EthError::InvalidSignature(e.to_string()))?;
    let signer = VerifyingKey::recover_from_prehash(
        &hash,
        &signature,
        RecoveryId::new(fields.y_parity, false),
    )
    .map_err(|e| EthError::InvalidSignature(format!("sender recovery failed: {e}")))?;
    let from = address_from_uncompressed(signer.to_encoded_point(false).as_bytes())?;

    Ok(DecodedEthTransaction {
        chain_id: fields.chain_id,
        nonce: fields.nonce,
        max_priority_fee_per_gas: fields.max_priority_fee_per_gas,
        max_fee_per_gas: fields.max_fee_per_gas,
        gas_limit: fields.gas_limit,
        to: checksum_address(&fields.to.to_string().to_lowercase())?,
        value: fields.value,
        data: fields.data.to_vec(),
        from,
    })
}

fn typed_envelope<T: Encodable>(fields: &T) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + fields.length());
    out.push(EIP1559_TX_TYPE);
    fields.encode(&mut out);
    out
}

// ---------------------------------------------------------------------------
// RLP structures
// ---------------------------------------------------------------------------

#[derive(RlpEncodable)]
struct UnsignedTxFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: u128,
    data: Bytes,
    access_list: Vec<AccessListItem>,
}

#[derive(RlpEncodable, RlpDecodable)]
struct SignedTxFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: u128,
    data: Bytes,
    access_list: Vec<AccessListItem>,
    y_parity: bool,
    r: U256,
    s: U256,
}

/// An EIP-2930 access list entry. Always empty on outgoing transfers.
#[derive(Debug, Clone, RlpEncodable, RlpDecodable)]
struct AccessListItem {
    address: Address,
    storage_keys: Vec<B256>,
}
