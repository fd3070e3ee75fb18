use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use chain_btc::utxo::OutPointRef;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, AmountType, Fee, FeeParameters};
use crate::types::Chain;

/// Extra chain data attached to a pending record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingParams {
    /// Outputs consumed by an outgoing UTXO transaction. They stay reserved
    /// until a refresh confirms or discards the record.
    SpentOutputs(Vec<OutPointRef>),
    /// Account sequence number the transaction was signed with.
    SequenceNumber(u64),
}

/// A transaction believed broadcast but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransactionRecord {
    pub hash: String,
    pub source: String,
    pub destination: String,
    pub amount: Amount,
    pub fee: Fee,
    pub date: DateTime<Utc>,
    pub is_incoming: bool,
    pub params: Option<PendingParams>,
}

impl PendingTransactionRecord {
    /// Placeholder records carry no identity and never match a confirmation.
    pub fn is_dummy(&self) -> bool {
        self.hash.is_empty() || self.source.is_empty() || self.destination.is_empty()
    }

    pub fn spent_outputs(&self) -> &[OutPointRef] {
        match &self.params {
            Some(PendingParams::SpentOutputs(outputs)) => outputs,
            _ => &[],
        }
    }

    /// Bounds of the signed change this record causes in the wallet's coin
    /// balance once it confirms. `None` when it cannot be expressed in the
    /// coin.
    ///
    /// The range is a single point except for EVM sends, whose recorded fee
    /// is the `gas_limit × max_fee_per_gas` cap; the fee actually charged
    /// can be anything up to it.
    pub fn coin_delta_range(&self) -> Option<RangeInclusive<Decimal>> {
        let mut delta = Decimal::ZERO;
        if self.amount.amount_type == AmountType::Coin {
            delta += self.amount.value;
        }
        if self.is_incoming {
            return Some(delta..=delta);
        }
        if self.fee.amount.amount_type != AmountType::Coin {
            return None;
        }
        let most = -(delta + self.fee.amount.value);
        match self.fee.parameters {
            Some(FeeParameters::Evm { .. }) => Some(most..=-delta),
            _ => Some(most..=most),
        }
    }
}

/// One address of one chain, and everything known about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub chain: Chain,
    pub address: String,
    pub public_key: Vec<u8>,
    pub amounts: HashMap<AmountType, Amount>,
    pub pending: Vec<PendingTransactionRecord>,
}

impl Wallet {
    pub fn new(chain: Chain, address: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self {
            chain,
            address: address.into(),
            public_key,
            amounts: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn add_amount(&mut self, amount: Amount) {
        self.amounts.insert(amount.amount_type.clone(), amount);
    }

    pub fn clear_amounts(&mut self) {
        self.amounts.clear();
    }

    pub fn amount(&self, amount_type: &AmountType) -> Option<&Amount> {
        self.amounts.get(amount_type)
    }

    /// Balance of `template`'s asset, zero when unknown.
    pub fn balance_like(&self, template: &Amount) -> Amount {
        self.amount(&template.amount_type)
            .cloned()
            .unwrap_or_else(|| template.zero())
    }

    pub fn coin_balance(&self) -> Amount {
        self.balance_like(&Amount::zero_coin(self.chain))
    }

    pub fn add_pending(&mut self, record: PendingTransactionRecord) {
        self.pending.push(record);
    }

    /// Removes every record matching `pred`, returning how many went.
    pub fn remove_pending<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&PendingTransactionRecord) -> bool,
    {
        let before = self.pending.len();
        self.pending.retain(|r| !pred(r));
        before - self.pending.len()
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn pending_hashes(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter(|r| !r.is_dummy())
            .map(|r| r.hash.clone())
            .collect()
    }

    pub fn has_outgoing_pending(&self) -> bool {
        self.pending.iter().any(|r| !r.is_incoming)
    }

    /// Outputs reserved by pending outgoing transactions.
    pub fn reserved_outputs(&self) -> HashSet<OutPointRef> {
        self.pending
            .iter()
            .flat_map(|r| r.spent_outputs().iter().cloned())
            .collect()
    }
}
