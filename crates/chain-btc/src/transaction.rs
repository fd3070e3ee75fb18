use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::address::{p2wpkh_script, parse_address, parse_compressed_pubkey};
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::utxo::{select_utxos, OutPointRef, Utxo};

/// Estimated virtual size of a P2WPKH input (in vbytes).
/// Breakdown: 41 bytes non-witness + ~27 witness bytes / 4 = ~68 vbytes per input.
const P2WPKH_INPUT_VBYTES: u64 = 68;

/// Estimated virtual size of any output (in vbytes).
const OUTPUT_VBYTES: u64 = 31;

/// Fixed transaction overhead (in vbytes): version + locktime + segwit marker/flag + counts.
const TX_OVERHEAD_VBYTES: u64 = 11;

/// Outputs below this value are non-standard for P2WPKH.
pub const DUST_THRESHOLD_SAT: u64 = 546;

/// What to pay and how much fee to burn doing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentParams {
    pub amount_sat: u64,
    /// Absolute fee. Never recomputed here.
    pub fee_sat: u64,
    pub max_inputs: usize,
    /// Change at or below this value is folded into the fee.
    pub dust_threshold_sat: u64,
}

/// An unsigned Bitcoin transaction ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedBtcTx {
    /// The bitcoin transaction with empty witnesses.
    pub tx: Transaction,
    /// The outputs being spent, in input order. Needed for sighashes.
    pub prevouts: Vec<TxOut>,
    /// Outpoints consumed by this transaction, in input order.
    pub spent: Vec<OutPointRef>,
    /// Fee actually paid, including any folded dust change.
    pub fee_sat: u64,
    pub change_sat: u64,
}

/// A fully witnessed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBtcTx {
    pub raw: Vec<u8>,
    pub txid: String,
}

/// Estimated virtual size of a P2WPKH transaction.
pub fn estimate_vsize(num_inputs: usize, num_outputs: usize) -> u64 {
    TX_OVERHEAD_VBYTES
        + (num_inputs as u64 * P2WPKH_INPUT_VBYTES)
        + (num_outputs as u64 * OUTPUT_VBYTES)
}

/// Estimate the fee for a P2WPKH transaction at `fee_rate_sat_vbyte`.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, fee_rate_sat_vbyte: u64) -> u64 {
    estimate_vsize(num_inputs, num_outputs).saturating_mul(fee_rate_sat_vbyte)
}

/// Build an unsigned P2WPKH transaction spending outputs owned by
/// `owner_pubkey`.
///
/// Inputs are selected in received order until they cover amount plus fee.
/// Change above the dust threshold goes to `change_address`, or back to the
/// owner's own P2WPKH script when none is given.
pub fn build_unsigned_transaction(
    utxos: &[Utxo],
    recipient: &str,
    change_address: Option<&str>,
    owner_pubkey: &[u8],
    params: PaymentParams,
    network: BtcNetwork,
) -> Result<UnsignedBtcTx, BtcError> {
    if params.amount_sat == 0 {
        return Err(BtcError::TransactionBuildError(
            "amount must be positive".into(),
        ));
    }

    let recipient_addr = parse_address(recipient, network)?;
    let owner_script = p2wpkh_script(owner_pubkey)?;
    let change_script = match change_address {
        Some(address) => parse_address(address, network)?.script_pubkey(),
        None => owner_script.clone(),
    };

    let target = params
        .amount_sat
        .checked_add(params.fee_sat)
        .ok_or_else(|| BtcError::TransactionBuildError("amount plus fee overflows".into()))?;
    let selection = select_utxos(utxos, target, params.max_inputs)?;

    let mut inputs = Vec::with_capacity(selection.selected.len());
    let mut prevouts = Vec::with_capacity(selection.selected.len());
    let mut spent = Vec::with_capacity(selection.selected.len());

    for utxo in &selection.selected {
        let txid: Txid = utxo
            .txid
            .parse()
            .map_err(|e| BtcError::TransactionBuildError(format!("invalid txid: {e}")))?;

        inputs.push(TxIn {
            previous_output: OutPoint::new(txid, utxo.vout),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        });
        prevouts.push(TxOut {
            value: Amount::from_sat(utxo.amount_sat),
            script_pubkey: owner_script.clone(),
        });
        spent.push(utxo.outpoint());
    }

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(params.amount_sat),
        script_pubkey: recipient_addr.script_pubkey(),
    }];

    let change = selection.total_sat - target;
    let (change_sat, fee_sat) = if change > params.dust_threshold_sat {
        outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: change_script,
        });
        (change, params.fee_sat)
    } else {
        (0, params.fee_sat + change)
    };

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };

    Ok(UnsignedBtcTx {
        tx,
        prevouts,
        spent,
        fee_sat,
        change_sat,
    })
}

/// BIP-143 sighashes (SIGHASH_ALL), one per input, in input order.
pub fn sighashes(unsigned: &UnsignedBtcTx, owner_pubkey: &[u8]) -> Result<Vec<[u8; 32]>, BtcError> {
    let script_pubkey = p2wpkh_script(owner_pubkey)?;
    let mut cache = SighashCache::new(&unsigned.tx);

    (0..unsigned.tx.input.len())
        .map(|index| {
            let value = unsigned.prevouts[index].value;
            cache
                .p2wpkh_signature_hash(index, &script_pubkey, value, EcdsaSighashType::All)
                .map(|h| h.to_byte_array())
                .map_err(|e| BtcError::TransactionBuildError(format!("sighash computation failed: {e}")))
        })
        .collect()
}

/// Attach witnesses built from 64-byte compact `r || s` signatures.
///
/// Each signature is checked against its input's sighash before it is
/// accepted, so a signer that signed with the wrong key is caught here
/// rather than by the network.
pub fn assemble_signed_transaction(
    unsigned: &UnsignedBtcTx,
    signatures: &[Vec<u8>],
    owner_pubkey: &[u8],
) -> Result<SignedBtcTx, BtcError> {
    let expected = unsigned.tx.input.len();
    if signatures.len() != expected {
        return Err(BtcError::SignatureCountMismatch {
            expected,
            actual: signatures.len(),
        });
    }

    let public_key = parse_compressed_pubkey(owner_pubkey)?.0;
    let hashes = sighashes(unsigned, owner_pubkey)?;
    let secp = Secp256k1::verification_only();

    let mut signed_tx = unsigned.tx.clone();
    for (index, (raw_sig, hash)) in signatures.iter().zip(hashes.iter()).enumerate() {
        let compact = raw_sig.get(..64).filter(|_| raw_sig.len() == 64 || raw_sig.len() == 65);
        let compact = compact.ok_or_else(|| {
            BtcError::InvalidSignature(format!(
                "input {index}: expected 64-byte signature, got {} bytes",
                raw_sig.len()
            ))
        })?;

        let mut signature = Signature::from_compact(compact)
            .map_err(|e| BtcError::InvalidSignature(format!("input {index}: {e}")))?;
        signature.normalize_s();

        secp.verify_ecdsa(&Message::from_digest(*hash), &signature, &public_key)
            .map_err(|_| {
                BtcError::InvalidSignature(format!("input {index}: signature does not match key"))
            })?;

        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(EcdsaSighashType::All as u8);

        let mut witness = Witness::new();
        witness.push(&sig_bytes);
        witness.push(public_key.serialize());
        signed_tx.input[index].witness = witness;
    }

    Ok(SignedBtcTx {
        raw: bitcoin::consensus::serialize(&signed_tx),
        txid: signed_tx.compute_txid().to_string(),
    })
}

/// Decode a serialized transaction.
pub fn decode_transaction(raw: &[u8]) -> Result<Transaction, BtcError> {
    bitcoin::consensus::deserialize(raw).map_err(|e| BtcError::DecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::SecretKey;

    const RECIPIENT: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

    fn owner_key() -> (SecretKey, Vec<u8>) {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let pk = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &sk);
        (sk, pk.serialize().to_vec())
    }

    fn utxo(n: u8, amount_sat: u64) -> Utxo {
        Utxo {
            txid: format!("{:02x}", n).repeat(32),
            vout: 0,
            amount_sat,
        }
    }

    fn params(amount_sat: u64, fee_sat: u64) -> PaymentParams {
        PaymentParams {
            amount_sat,
            fee_sat,
            max_inputs: 100,
            dust_threshold_sat: DUST_THRESHOLD_SAT,
        }
    }

    fn sign_all(hashes: &[[u8; 32]], sk: &SecretKey) -> Vec<Vec<u8>> {
        let secp = Secp256k1::new();
        hashes
            .iter()
            .map(|h| {
                secp.sign_ecdsa(&Message::from_digest(*h), sk)
                    .serialize_compact()
                    .to_vec()
            })
            .collect()
    }

    #[test]
    fn estimate_fee_basic() {
        // 11 + 68 + 62 = 141 vbytes at 1 sat/vbyte
        assert_eq!(estimate_fee(1, 2, 1), 141);
    }

    #[test]
    fn estimate_fee_scales_with_inputs() {
        let fee_1 = estimate_fee(1, 2, 10);
        let fee_2 = estimate_fee(2, 2, 10);
        assert_eq!(fee_2 - fee_1, P2WPKH_INPUT_VBYTES * 10);
    }

    #[test]
    fn builds_with_change_from_leading_outputs() {
        let (_, pubkey) = owner_key();
        let utxos = vec![utxo(1, 5_000), utxo(2, 3_000), utxo(3, 2_000)];

        let unsigned = build_unsigned_transaction(
            &utxos,
            RECIPIENT,
            None,
            &pubkey,
            params(6_000, 1_000),
            BtcNetwork::Mainnet,
        )
        .unwrap();

        assert_eq!(unsigned.tx.input.len(), 2);
        assert_eq!(unsigned.spent, vec![utxos[0].outpoint(), utxos[1].outpoint()]);
        assert_eq!(unsigned.tx.output.len(), 2);
        assert_eq!(unsigned.tx.output[0].value.to_sat(), 6_000);
        assert_eq!(unsigned.tx.output[1].value.to_sat(), 1_000);
        assert_eq!(unsigned.change_sat, 1_000);
        assert_eq!(unsigned.fee_sat, 1_000);
    }

    #[test]
    fn dust_change_is_folded_into_fee() {
        let (_, pubkey) = owner_key();
        let utxos = vec![utxo(1, 10_000)];

        let unsigned = build_unsigned_transaction(
            &utxos,
            RECIPIENT,
            None,
            &pubkey,
            params(8_700, 1_000),
            BtcNetwork::Mainnet,
        )
        .unwrap();

        assert_eq!(unsigned.tx.output.len(), 1);
        assert_eq!(unsigned.change_sat, 0);
        assert_eq!(unsigned.fee_sat, 1_300);
    }

    #[test]
    fn exact_spend_has_no_change_output() {
        let (_, pubkey) = owner_key();
        let utxos = vec![utxo(1, 4_000), utxo(2, 6_000)];
        let unsigned = build_unsigned_transaction(
            &utxos,
            RECIPIENT,
            None,
            &pubkey,
            params(9_000, 1_000),
            BtcNetwork::Mainnet,
        )
        .unwrap();
        assert_eq!(unsigned.tx.output.len(), 1);
        assert_eq!(unsigned.fee_sat, 1_000);
    }

    #[test]
    fn explicit_change_address_receives_change() {
        let (_, pubkey) = owner_key();
        let change = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
        let unsigned = build_unsigned_transaction(
            &[utxo(1, 10_000)],
            RECIPIENT,
            Some(change),
            &pubkey,
            params(5_000, 1_000),
            BtcNetwork::Mainnet,
        )
        .unwrap();
        let change_script = parse_address(change, BtcNetwork::Mainnet)
            .unwrap()
            .script_pubkey();
        assert_eq!(unsigned.tx.output[1].script_pubkey, change_script);
        assert_eq!(unsigned.tx.output[1].value.to_sat(), 4_000);
    }

    #[test]
    fn insufficient_funds() {
        let (_, pubkey) = owner_key();
        let result = build_unsigned_transaction(
            &[utxo(1, 1_000)],
            RECIPIENT,
            None,
            &pubkey,
            params(500_000, 1_000),
            BtcNetwork::Mainnet,
        );
        assert!(matches!(result, Err(BtcError::InsufficientFunds { .. })));
    }

    #[test]
    fn invalid_recipient() {
        let (_, pubkey) = owner_key();
        let result = build_unsigned_transaction(
            &[utxo(1, 100_000)],
            "not_a_valid_address",
            None,
            &pubkey,
            params(50_000, 1_000),
            BtcNetwork::Mainnet,
        );
        assert!(matches!(result, Err(BtcError::InvalidAddress(_))));
    }

    #[test]
    fn recipient_on_wrong_network() {
        let (_, pubkey) = owner_key();
        let result = build_unsigned_transaction(
            &[utxo(1, 100_000)],
            RECIPIENT,
            None,
            &pubkey,
            params(50_000, 1_000),
            BtcNetwork::Testnet,
        );
        assert!(result.is_err());
    }

    #[test]
    fn one_sighash_per_input_and_deterministic() {
        let (_, pubkey) = owner_key();
        let utxos = vec![utxo(1, 5_000), utxo(2, 3_000), utxo(3, 2_000)];
        let build = || {
            build_unsigned_transaction(
                &utxos,
                RECIPIENT,
                None,
                &pubkey,
                params(6_000, 1_000),
                BtcNetwork::Mainnet,
            )
            .unwrap()
        };

        let first = sighashes(&build(), &pubkey).unwrap();
        let second = sighashes(&build(), &pubkey).unwrap();
        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);
        assert_eq!(first, second);
    }

    #[test]
    fn assemble_rejects_wrong_signature_count() {
        let (sk, pubkey) = owner_key();
        let utxos = vec![utxo(1, 5_000), utxo(2, 3_000)];
        let unsigned = build_unsigned_transaction(
            &utxos,
            RECIPIENT,
            None,
            &pubkey,
            params(6_000, 1_000),
            BtcNetwork::Mainnet,
        )
        .unwrap();
        let hashes = sighashes(&unsigned, &pubkey).unwrap();
        let mut sigs = sign_all(&hashes, &sk);
        sigs.pop();

        let err = assemble_signed_transaction(&unsigned, &sigs, &pubkey).unwrap_err();
        assert!(matches!(
            err,
            BtcError::SignatureCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn assemble_rejects_signature_from_other_key() {
        let (_, pubkey) = owner_key();
        let other = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let unsigned = build_unsigned_transaction(
            &[utxo(1, 10_000)],
            RECIPIENT,
            None,
            &pubkey,
            params(5_000, 1_000),
            BtcNetwork::Mainnet,
        )
        .unwrap();
        let hashes = sighashes(&unsigned, &pubkey).unwrap();
        let sigs = sign_all(&hashes, &other);

        let err = assemble_signed_transaction(&unsigned, &sigs, &pubkey).unwrap_err();
        assert!(matches!(err, BtcError::InvalidSignature(_)));
    }

    #[test]
    fn signed_transaction_decodes_to_same_payment() {
        let (sk, pubkey) = owner_key();
        let utxos = vec![utxo(1, 5_000), utxo(2, 3_000), utxo(3, 2_000)];
        let unsigned = build_unsigned_transaction(
            &utxos,
            RECIPIENT,
            None,
            &pubkey,
            params(6_000, 1_000),
            BtcNetwork::Mainnet,
        )
        .unwrap();
        let hashes = sighashes(&unsigned, &pubkey).unwrap();
        let signed =
            assemble_signed_transaction(&unsigned, &sign_all(&hashes, &sk), &pubkey).unwrap();

        let decoded = decode_transaction(&signed.raw).unwrap();
        assert_eq!(decoded.compute_txid().to_string(), signed.txid);
        assert_eq!(decoded.input.len(), 2);
        assert!(decoded.input.iter().all(|i| i.witness.len() == 2));

        let recipient_script = parse_address(RECIPIENT, BtcNetwork::Mainnet)
            .unwrap()
            .script_pubkey();
        assert_eq!(decoded.output[0].script_pubkey, recipient_script);
        assert_eq!(decoded.output[0].value.to_sat(), 6_000);

        let out_total: u64 = decoded.output.iter().map(|o| o.value.to_sat()).sum();
        assert_eq!(8_000 - out_total, 1_000);
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(matches!(
            decode_transaction(&[0x01, 0x02]),
            Err(BtcError::DecodeError(_))
        ));
    }
}
