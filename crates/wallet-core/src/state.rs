//! Applying a refresh snapshot to a wallet.
//!
//! [`apply_snapshot`] computes the complete next state first and only then
//! writes it, so a snapshot that turns out to be unusable leaves the wallet
//! and builder exactly as they were.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::amount::{Amount, AmountType};
use crate::builder::TransactionBuilder;
use crate::connector::{ChainState, StateSnapshot};
use crate::error::WalletError;
use crate::wallet::Wallet;

/// Where a wallet's refresh cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated(RefreshReport),
    /// Another refresh of the same wallet was already running.
    Skipped,
}

/// What a successful refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Pending hashes the node reported final.
    pub confirmed: Vec<String>,
    /// Pending hashes dropped because the balance moved unexpectedly.
    pub discarded: Vec<String>,
    pub coin_balance: Option<Amount>,
}

/// Replaces balances and builder state with `snapshot` and reconciles the
/// pending list.
///
/// `pending_at_start` holds the hashes that were pending when the refresh
/// was issued. A discontinuity only discards those, never a record a
/// concurrent send appended while the snapshot was in flight.
pub fn apply_snapshot(
    wallet: &mut Wallet,
    builder: &mut TransactionBuilder,
    snapshot: StateSnapshot,
    pending_at_start: &HashSet<String>,
) -> Result<RefreshReport, WalletError> {
    let StateSnapshot {
        balances,
        chain_state,
        confirmed_hashes,
    } = snapshot;

    let balances = reconcile_balances(wallet, balances, &chain_state)?;
    let mut next_builder = builder.clone();
    next_builder.apply_state(chain_state, &balances)?;

    let next_amounts: HashMap<AmountType, Amount> = balances
        .into_iter()
        .map(|amount| (amount.amount_type.clone(), amount))
        .collect();

    let confirmed: Vec<String> = wallet
        .pending
        .iter()
        .filter(|r| !r.is_dummy() && confirmed_hashes.contains(&r.hash))
        .map(|r| r.hash.clone())
        .collect();

    let previous_coin = wallet.amount(&AmountType::Coin).map(|a| a.value);
    let next_coin = next_amounts.get(&AmountType::Coin).map(|a| a.value);
    let discontinuity = match (previous_coin, next_coin) {
        (Some(previous), Some(next)) if previous != next => {
            !explained_by_pending(wallet, &confirmed_hashes, next - previous)
        }
        // Unknown before (first load or after a failure) or unknown now.
        _ => false,
    };

    // Commit.
    wallet.amounts = next_amounts;
    *builder = next_builder;
    wallet.remove_pending(|r| !r.is_dummy() && confirmed_hashes.contains(&r.hash));

    let mut discarded = Vec::new();
    if discontinuity {
        warn!(
            chain = %wallet.chain,
            previous = ?previous_coin,
            current = ?next_coin,
            "balance moved without a matching pending transaction, dropping stale records"
        );
        wallet.remove_pending(|r| {
            let stale = pending_at_start.contains(&r.hash);
            if stale {
                discarded.push(r.hash.clone());
            }
            stale
        });
    }

    debug!(
        confirmed = confirmed.len(),
        discarded = discarded.len(),
        pending = wallet.pending.len(),
        "snapshot applied"
    );

    Ok(RefreshReport {
        confirmed,
        discarded,
        coin_balance: wallet.amount(&AmountType::Coin).cloned(),
    })
}

/// For UTXO chains the coin balance is the sum of the reported outputs,
/// whatever the node's summary figure says.
fn reconcile_balances(
    wallet: &Wallet,
    mut balances: Vec<Amount>,
    chain_state: &ChainState,
) -> Result<Vec<Amount>, WalletError> {
    let ChainState::Utxo { outputs } = chain_state else {
        return Ok(balances);
    };

    let total_sat = outputs
        .iter()
        .try_fold(0u64, |acc, utxo| acc.checked_add(utxo.amount_sat))
        .ok_or_else(|| WalletError::InvalidSnapshot("unspent outputs overflow".into()))?;
    let coin = Amount::coin_from_smallest_units(wallet.chain, total_sat as u128)?;

    match balances.iter_mut().find(|a| a.amount_type == AmountType::Coin) {
        Some(reported) => {
            if reported.value != coin.value {
                warn!(
                    reported = %reported,
                    outputs = %coin,
                    "reported balance disagrees with unspent outputs"
                );
            }
            *reported = coin;
        }
        None => balances.push(coin),
    }
    Ok(balances)
}

/// A coin balance move is expected when it falls within the effect of the
/// records confirmed now, optionally plus one still-pending record or all of
/// them (nodes that count mempool transactions into the balance).
fn explained_by_pending(wallet: &Wallet, confirmed_hashes: &HashSet<String>, delta: Decimal) -> bool {
    let mut confirmed = Decimal::ZERO..=Decimal::ZERO;
    let mut remaining = Vec::new();
    for record in &wallet.pending {
        let Some(effect) = record.coin_delta_range() else {
            // Cannot be expressed in the coin, so nothing can be ruled out.
            return true;
        };
        if !record.is_dummy() && confirmed_hashes.contains(&record.hash) {
            confirmed = add_ranges(&confirmed, &effect);
        } else {
            remaining.push(effect);
        }
    }

    if confirmed.contains(&delta) {
        return true;
    }
    if remaining
        .iter()
        .any(|effect| add_ranges(&confirmed, effect).contains(&delta))
    {
        return true;
    }
    let all = remaining.iter().fold(confirmed.clone(), |acc, effect| add_ranges(&acc, effect));
    !remaining.is_empty() && all.contains(&delta)
}

fn add_ranges(a: &RangeInclusive<Decimal>, b: &RangeInclusive<Decimal>) -> RangeInclusive<Decimal> {
    (*a.start() + *b.start())..=(*a.end() + *b.end())
}
