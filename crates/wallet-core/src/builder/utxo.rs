use std::collections::HashSet;

use chain_btc::network::BtcNetwork;
use chain_btc::transaction::{self as btc_tx, PaymentParams, UnsignedBtcTx, DUST_THRESHOLD_SAT};
use chain_btc::utxo::{self as btc_utxo, OutPointRef, Utxo};

use super::{positive_units, require_coin, PreparedTransaction};
use crate::amount::Amount;
use crate::error::WalletError;
use crate::transfer::{FinalTransaction, SigningRequest, TransferIntent};
use crate::types::Chain;

/// Builds P2WPKH spends from the outputs of the last refresh.
///
/// Outputs are kept in the order the node returned them and selection walks
/// them greedily in that order. Outputs reserved by pending sends are
/// skipped, which keeps two quick sends from double-spending each other.
#[derive(Debug, Clone)]
pub struct UtxoBuilder {
    chain: Chain,
    network: BtcNetwork,
    public_key: Vec<u8>,
    outputs: Vec<Utxo>,
    max_input_count: usize,
    dust_threshold_sat: u64,
}

impl UtxoBuilder {
    pub fn new(
        chain: Chain,
        public_key: &[u8],
        max_input_count: usize,
        dust: Option<&Amount>,
    ) -> Result<Self, WalletError> {
        let network = chain
            .btc_network()
            .ok_or_else(|| WalletError::Config(format!("{chain} is not a UTXO chain")))?;
        chain_btc::address::p2wpkh_script(public_key)?;
        if max_input_count == 0 {
            return Err(WalletError::Config("max_input_count must be > 0".into()));
        }
        let dust_threshold_sat = match dust {
            Some(dust) => super::units_u64(dust)?,
            None => DUST_THRESHOLD_SAT,
        };

        Ok(Self {
            chain,
            network,
            public_key: public_key.to_vec(),
            outputs: Vec::new(),
            max_input_count,
            dust_threshold_sat,
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn outputs(&self) -> &[Utxo] {
        &self.outputs
    }

    pub(crate) fn set_outputs(&mut self, outputs: Vec<Utxo>) {
        self.outputs = outputs;
    }

    pub fn max_input_count(&self) -> usize {
        self.max_input_count
    }

    pub fn dust_threshold_sat(&self) -> u64 {
        self.dust_threshold_sat
    }

    /// Unreserved outputs, in received order.
    pub fn spendable(&self, reserved: &HashSet<OutPointRef>) -> Vec<Utxo> {
        self.outputs
            .iter()
            .filter(|utxo| !reserved.contains(&utxo.outpoint()))
            .cloned()
            .collect()
    }

    /// What one transaction can move: the unreserved outputs, capped at
    /// `max_input_count` of them.
    pub fn available_amount(&self, reserved: &HashSet<OutPointRef>) -> Result<Amount, WalletError> {
        let total = btc_utxo::spendable_total(&self.spendable(reserved), self.max_input_count);
        Amount::coin_from_smallest_units(self.chain, total as u128)
    }

    /// Leading unreserved outputs needed to cover `target_sat`, or `None`
    /// when the first `max_input_count` of them fall short.
    pub fn min_inputs_for(&self, target_sat: u64, reserved: &HashSet<OutPointRef>) -> Option<usize> {
        btc_utxo::min_inputs_for(&self.spendable(reserved), target_sat, self.max_input_count)
    }

    pub(crate) fn build_for_sign(
        &self,
        intent: &TransferIntent,
        reserved: &HashSet<OutPointRef>,
    ) -> Result<(SigningRequest, PreparedTransaction), WalletError> {
        require_coin(&intent.amount, self.chain)?;
        require_coin(&intent.fee.amount, self.chain)?;

        let amount_sat = to_sat(positive_units(&intent.amount)?, &intent.amount)?;
        let fee_sat = super::units_u64(&intent.fee.amount)?;

        let spendable = self.spendable(reserved);
        let params = PaymentParams {
            amount_sat,
            fee_sat,
            max_inputs: self.max_input_count,
            dust_threshold_sat: self.dust_threshold_sat,
        };
        let unsigned = btc_tx::build_unsigned_transaction(
            &spendable,
            &intent.destination,
            intent.change_address.as_deref(),
            &self.public_key,
            params,
            self.network,
        )?;

        let hashes = btc_tx::sighashes(&unsigned, &self.public_key)?
            .into_iter()
            .map(|hash| hash.to_vec())
            .collect();

        Ok((
            SigningRequest {
                hashes,
                public_key: self.public_key.clone(),
            },
            PreparedTransaction::Utxo {
                unsigned,
                public_key: self.public_key.clone(),
            },
        ))
    }
}

fn to_sat(units: u128, amount: &Amount) -> Result<u64, WalletError> {
    u64::try_from(units).map_err(|_| WalletError::InvalidAmount(format!("{amount} out of range")))
}

pub(super) fn assemble(
    unsigned: &UnsignedBtcTx,
    public_key: &[u8],
    signatures: &[Vec<u8>],
) -> Result<FinalTransaction, WalletError> {
    let signed = btc_tx::assemble_signed_transaction(unsigned, signatures, public_key)?;
    Ok(FinalTransaction {
        raw: signed.raw,
        hash: signed.txid,
    })
}
