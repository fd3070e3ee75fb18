use crate::address::{checksum_address, parse_address};
use crate::error::EthError;

/// Function selector for `transfer(address,uint256)`: `0xa9059cbb`.
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Length of `transfer` calldata: selector plus two 32-byte words.
const TRANSFER_CALLDATA_LEN: usize = 4 + 32 + 32;

/// Encodes an ERC-20 `transfer(address,uint256)` call.
pub fn encode_transfer(to: &str, amount: u128) -> Result<Vec<u8>, EthError> {
    let addr = parse_address(to)?;

    let mut calldata = Vec::with_capacity(TRANSFER_CALLDATA_LEN);
    calldata.extend_from_slice(&TRANSFER_SELECTOR);

    // Address is left-padded to a full word.
    calldata.extend_from_slice(&[0u8; 12]);
    calldata.extend_from_slice(addr.as_slice());

    calldata.extend_from_slice(&[0u8; 16]);
    calldata.extend_from_slice(&amount.to_be_bytes());

    Ok(calldata)
}

/// Decodes `transfer` calldata back into `(recipient, amount)`.
pub fn decode_transfer(calldata: &[u8]) -> Result<(String, u128), EthError> {
    if calldata.len() != TRANSFER_CALLDATA_LEN || calldata[..4] != TRANSFER_SELECTOR {
        return Err(EthError::EncodingError(
            "calldata is not an ERC-20 transfer".into(),
        ));
    }

    let address_word = &calldata[4..36];
    let amount_word = &calldata[36..68];
    if address_word[..12].iter().any(|b| *b != 0) || amount_word[..16].iter().any(|b| *b != 0) {
        return Err(EthError::EncodingError(
            "transfer argument out of range".into(),
        ));
    }

    let to = checksum_address(&format!("0x{}", hex::encode(&address_word[12..])))?;
    let mut amount = [0u8; 16];
    amount.copy_from_slice(&amount_word[16..]);

    Ok((to, u128::from_be_bytes(amount)))
}
