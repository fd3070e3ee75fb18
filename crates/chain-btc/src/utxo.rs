use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// Identifies a transaction output: `txid:vout`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPointRef {
    /// Transaction ID as a hex string (display order).
    pub txid: String,
    pub vout: u32,
}

impl std::fmt::Display for OutPointRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// A single unspent transaction output (UTXO) owned by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Transaction ID as a hex string (big-endian / display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub amount_sat: u64,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPointRef {
        OutPointRef {
            txid: self.txid.clone(),
            vout: self.vout,
        }
    }
}

/// Result of UTXO selection: the chosen UTXOs and their aggregate value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSelection {
    /// The selected UTXOs, in the order the node reported them.
    pub selected: Vec<Utxo>,
    /// Total value of the selected UTXOs in satoshis.
    pub total_sat: u64,
}

/// Select UTXOs covering `target_sat` (amount plus fee).
///
/// Outputs are taken greedily in the order they were received until the
/// running total reaches the target. At most `max_inputs` outputs are ever
/// considered, so a target reachable only by exceeding that bound fails.
pub fn select_utxos(
    utxos: &[Utxo],
    target_sat: u64,
    max_inputs: usize,
) -> Result<UtxoSelection, BtcError> {
    if utxos.is_empty() {
        return Err(BtcError::NoUnspentOutputs);
    }

    let mut selected = Vec::new();
    let mut total_sat: u64 = 0;

    for utxo in utxos.iter().take(max_inputs) {
        selected.push(utxo.clone());
        total_sat = total_sat.saturating_add(utxo.amount_sat);
        if total_sat >= target_sat {
            return Ok(UtxoSelection {
                selected,
                total_sat,
            });
        }
    }

    Err(BtcError::InsufficientFunds {
        required: target_sat,
        available: total_sat,
    })
}

/// Number of leading outputs needed to reach `target_sat`, or `None` when
/// the first `max_inputs` outputs cannot cover it.
pub fn min_inputs_for(utxos: &[Utxo], target_sat: u64, max_inputs: usize) -> Option<usize> {
    let mut total_sat: u64 = 0;
    for (index, utxo) in utxos.iter().take(max_inputs).enumerate() {
        total_sat = total_sat.saturating_add(utxo.amount_sat);
        if total_sat >= target_sat {
            return Some(index + 1);
        }
    }
    None
}

/// The most a single transaction can spend: the sum of the first
/// `max_inputs` outputs.
pub fn spendable_total(utxos: &[Utxo], max_inputs: usize) -> u64 {
    utxos
        .iter()
        .take(max_inputs)
        .fold(0u64, |acc, u| acc.saturating_add(u.amount_sat))
}
