//! Fee tiers derived from raw node fee data.
//!
//! All rounding goes up. A fee that is a fraction of a unit too low can get
//! a transaction stuck, one that is a unit too high costs nothing noticeable.

use std::collections::HashSet;

use chain_btc::utxo::OutPointRef;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::amount::{Amount, Fee, FeeParameters};
use crate::builder::{MessageBuilder, TransactionBuilder, UtxoBuilder};
use crate::connector::RawFeeData;
use crate::error::WalletError;
use crate::types::Chain;

/// Kilobyte-denominated rates are divided by this to get a per-byte rate.
const BYTES_PER_KILOBYTE: u64 = 1024;

/// Outputs assumed for every UTXO fee: recipient plus change.
const ESTIMATED_OUTPUTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeTiers {
    Single(Fee),
    Multiple { low: Fee, normal: Fee, priority: Fee },
}

impl FeeTiers {
    /// Sorts `fees` ascending. Exactly one or three fees are accepted.
    pub fn from_fees(mut fees: Vec<Fee>) -> Result<Self, WalletError> {
        if let Some(first) = fees.first() {
            for fee in &fees[1..] {
                first.amount.try_cmp(&fee.amount)?;
            }
        }
        fees.sort_by(|a, b| a.amount.value.cmp(&b.amount.value));

        let count = fees.len();
        let mut fees = fees.into_iter();
        match (fees.next(), fees.next(), fees.next(), fees.next()) {
            (Some(single), None, None, None) => Ok(FeeTiers::Single(single)),
            (Some(low), Some(normal), Some(priority), None) => Ok(FeeTiers::Multiple {
                low,
                normal,
                priority,
            }),
            _ => Err(WalletError::FeeTierCountInvalid(count)),
        }
    }

    pub fn as_vec(&self) -> Vec<Fee> {
        match self {
            FeeTiers::Single(fee) => vec![fee.clone()],
            FeeTiers::Multiple {
                low,
                normal,
                priority,
            } => vec![low.clone(), normal.clone(), priority.clone()],
        }
    }

    /// The tier to use when the caller has no preference.
    pub fn normal(&self) -> &Fee {
        match self {
            FeeTiers::Single(fee) => fee,
            FeeTiers::Multiple { normal, .. } => normal,
        }
    }
}

/// Converts a whole-coin-per-kilobyte rate into smallest units per byte:
/// `ceil(rate * 10^decimals / 1024)`.
pub fn fee_rate_per_byte(rate_per_kb: Decimal, decimals: u32) -> Result<u64, WalletError> {
    if rate_per_kb <= Decimal::ZERO {
        return Err(WalletError::FeeLoadFailure(format!(
            "fee rate {rate_per_kb} per kB is not positive"
        )));
    }
    let scale = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(|| WalletError::FeeLoadFailure(format!("unsupported precision {decimals}")))?;
    let per_byte = rate_per_kb
        .checked_mul(scale)
        .and_then(|units| units.checked_div(Decimal::from(BYTES_PER_KILOBYTE)))
        .ok_or_else(|| WalletError::FeeLoadFailure(format!("fee rate {rate_per_kb} overflows")))?;
    per_byte
        .ceil()
        .to_u64()
        .ok_or_else(|| WalletError::FeeLoadFailure(format!("fee rate {rate_per_kb} out of range")))
}

/// Rate already expressed in smallest units per byte, rounded up.
fn whole_rate_per_byte(rate: Decimal) -> Result<u64, WalletError> {
    if rate <= Decimal::ZERO {
        return Err(WalletError::FeeLoadFailure(format!(
            "fee rate {rate} per byte is not positive"
        )));
    }
    rate.ceil()
        .to_u64()
        .ok_or_else(|| WalletError::FeeLoadFailure(format!("fee rate {rate} out of range")))
}

/// Turns `raw` into fee tiers for sending `amount` with `builder`.
pub fn estimate(
    builder: &TransactionBuilder,
    raw: &RawFeeData,
    amount: &Amount,
    reserved: &HashSet<OutPointRef>,
) -> Result<FeeTiers, WalletError> {
    let fees = match (builder, raw) {
        (TransactionBuilder::Utxo(b), RawFeeData::PerKilobyte { rates }) => {
            let decimals = b.chain().decimals();
            let per_byte = rates
                .iter()
                .map(|rate| fee_rate_per_byte(*rate, decimals))
                .collect::<Result<Vec<_>, _>>()?;
            utxo_fees(b, &per_byte, amount, reserved)?
        }
        (TransactionBuilder::Utxo(b), RawFeeData::PerByte { rates }) => {
            let per_byte = rates
                .iter()
                .map(|rate| whole_rate_per_byte(*rate))
                .collect::<Result<Vec<_>, _>>()?;
            utxo_fees(b, &per_byte, amount, reserved)?
        }
        (
            TransactionBuilder::Account(b),
            RawFeeData::Gas {
                gas_limit,
                base_fee_per_gas,
                priority_fees,
            },
        ) => {
            let gas_limit = gas_limit.unwrap_or_else(|| b.gas_limit_for(&amount.amount_type));
            gas_fees(b.chain(), gas_limit, *base_fee_per_gas, priority_fees)?
        }
        (TransactionBuilder::Message(b), RawFeeData::PerSignature { lamports }) => {
            vec![signature_fee(b, *lamports)?]
        }
        (builder, raw) => {
            return Err(WalletError::FeeLoadFailure(format!(
                "{} fee data does not apply to a {:?} chain",
                raw_name(raw),
                builder.kind()
            )))
        }
    };
    FeeTiers::from_fees(fees)
}

fn raw_name(raw: &RawFeeData) -> &'static str {
    match raw {
        RawFeeData::PerKilobyte { .. } => "per-kilobyte",
        RawFeeData::PerByte { .. } => "per-byte",
        RawFeeData::Gas { .. } => "gas",
        RawFeeData::PerSignature { .. } => "per-signature",
    }
}

/// One fee per byte rate, sized for the fewest leading outputs that cover
/// both the amount and the fee itself.
fn utxo_fees(
    builder: &UtxoBuilder,
    rates: &[u64],
    amount: &Amount,
    reserved: &HashSet<OutPointRef>,
) -> Result<Vec<Fee>, WalletError> {
    if rates.is_empty() {
        return Err(WalletError::FeeLoadFailure("node returned no fee rates".into()));
    }
    if builder.spendable(reserved).is_empty() {
        return Err(WalletError::NoUnspentOutputs);
    }
    let amount_sat = u64::try_from(amount.to_smallest_units()?)
        .map_err(|_| WalletError::InvalidAmount(format!("{amount} out of range")))?;

    rates
        .iter()
        .map(|&rate| {
            let (inputs, fee_sat) = size_inputs(builder, amount_sat, rate, reserved)?;
            debug!(rate, inputs, fee_sat, "sized UTXO fee");
            Ok(Fee::with_parameters(
                Amount::coin_from_smallest_units(builder.chain(), fee_sat as u128)?,
                FeeParameters::Utxo {
                    fee_rate_per_byte: rate,
                    input_count: inputs,
                },
            ))
        })
        .collect()
}

/// Grows the input count until the fee it implies is covered by that many
/// inputs. Terminates because the count never shrinks and is capped by
/// `max_input_count`.
fn size_inputs(
    builder: &UtxoBuilder,
    amount_sat: u64,
    rate: u64,
    reserved: &HashSet<OutPointRef>,
) -> Result<(usize, u64), WalletError> {
    let insufficient = |fee_sat: u64| -> Result<(usize, u64), WalletError> {
        let available = builder.available_amount(reserved)?;
        let required = available.from_units_like(amount_sat as u128 + fee_sat as u128)?;
        Err(WalletError::insufficient(&required, &available))
    };

    let mut inputs = match builder.min_inputs_for(amount_sat, reserved) {
        Some(n) => n.max(1),
        None => return insufficient(0),
    };
    loop {
        let fee_sat = chain_btc::transaction::estimate_fee(inputs, ESTIMATED_OUTPUTS, rate);
        let target = amount_sat.saturating_add(fee_sat);
        match builder.min_inputs_for(target, reserved) {
            Some(needed) if needed <= inputs => return Ok((inputs, fee_sat)),
            Some(needed) => inputs = needed,
            None => return insufficient(fee_sat),
        }
    }
}

fn gas_fees(
    chain: Chain,
    gas_limit: u64,
    base_fee_per_gas: u128,
    priority_fees: &[u128],
) -> Result<Vec<Fee>, WalletError> {
    if base_fee_per_gas == 0 {
        return Err(WalletError::FeeLoadFailure("base fee per gas is zero".into()));
    }
    if gas_limit == 0 {
        return Err(WalletError::FeeLoadFailure("gas limit is zero".into()));
    }
    if priority_fees.is_empty() {
        return Err(WalletError::FeeLoadFailure("node returned no priority fees".into()));
    }

    priority_fees
        .iter()
        .map(|&priority| {
            let max_fee_per_gas = base_fee_per_gas
                .checked_add(priority)
                .ok_or_else(|| WalletError::FeeLoadFailure("max fee per gas overflows".into()))?;
            let total = max_fee_per_gas
                .checked_mul(gas_limit as u128)
                .ok_or_else(|| WalletError::FeeLoadFailure("fee overflows".into()))?;
            Ok(Fee::with_parameters(
                Amount::coin_from_smallest_units(chain, total)?,
                FeeParameters::Evm {
                    gas_limit,
                    max_fee_per_gas,
                    max_priority_fee_per_gas: priority,
                },
            ))
        })
        .collect()
}

fn signature_fee(builder: &MessageBuilder, lamports_per_signature: u64) -> Result<Fee, WalletError> {
    if lamports_per_signature == 0 {
        return Err(WalletError::FeeLoadFailure(
            "lamports per signature is zero".into(),
        ));
    }
    let total = lamports_per_signature as u128 * builder.signature_count() as u128;
    Ok(Fee::with_parameters(
        Amount::coin_from_smallest_units(builder.chain(), total)?,
        FeeParameters::Solana {
            lamports_per_signature,
        },
    ))
}
