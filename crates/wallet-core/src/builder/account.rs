use std::collections::HashMap;

use chain_eth::transaction::{self as eth_tx, EthTransaction};

use super::{ensure_covers, positive_units, require_coin, PreparedTransaction};
use crate::amount::{Amount, AmountType, FeeParameters};
use crate::error::WalletError;
use crate::transfer::{FinalTransaction, SigningRequest, TransferIntent};
use crate::types::Chain;

/// Builds EIP-1559 coin and ERC-20 transfers.
///
/// The nonce is read from the last refreshed sequence number and never
/// advanced here. Two builds between refreshes therefore carry the same
/// nonce, and the node decides which one wins.
#[derive(Debug, Clone)]
pub struct AccountBuilder {
    chain: Chain,
    chain_id: u64,
    public_key: Vec<u8>,
    sequence_number: Option<u64>,
    balances: HashMap<AmountType, Amount>,
    gas_limit: u64,
    token_gas_limit: u64,
}

impl AccountBuilder {
    pub fn new(
        chain: Chain,
        public_key: &[u8],
        gas_limit: u64,
        token_gas_limit: u64,
    ) -> Result<Self, WalletError> {
        let network = chain
            .evm_chain()
            .ok_or_else(|| WalletError::Config(format!("{chain} is not an EVM chain")))?;
        chain_eth::address::public_key_to_address(public_key)?;

        Ok(Self {
            chain,
            chain_id: network.chain_id,
            public_key: public_key.to_vec(),
            sequence_number: None,
            balances: HashMap::new(),
            gas_limit,
            token_gas_limit,
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn sequence_number(&self) -> Option<u64> {
        self.sequence_number
    }

    /// Default gas limit for moving `amount_type`.
    pub fn gas_limit_for(&self, amount_type: &AmountType) -> u64 {
        match amount_type {
            AmountType::Token(_) => self.token_gas_limit,
            _ => self.gas_limit,
        }
    }

    pub(crate) fn set_state(&mut self, sequence_number: u64, balances: &[Amount]) {
        self.sequence_number = Some(sequence_number);
        self.balances = balances
            .iter()
            .map(|amount| (amount.amount_type.clone(), amount.clone()))
            .collect();
    }

    fn balance_like(&self, template: &Amount) -> Amount {
        self.balances
            .get(&template.amount_type)
            .cloned()
            .unwrap_or_else(|| template.zero())
    }

    pub(crate) fn build_for_sign(
        &self,
        intent: &TransferIntent,
    ) -> Result<(SigningRequest, PreparedTransaction), WalletError> {
        let nonce = self.sequence_number.ok_or_else(|| {
            WalletError::StateNotLoaded(format!("no sequence number for {}", self.chain))
        })?;
        let (gas_limit, max_fee_per_gas, max_priority_fee_per_gas) = match &intent.fee.parameters {
            Some(FeeParameters::Evm {
                gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
            }) => (*gas_limit, *max_fee_per_gas, *max_priority_fee_per_gas),
            _ => {
                return Err(WalletError::FeeParametersMissing(
                    "EVM transfers need gas parameters from fee estimation".into(),
                ))
            }
        };

        let fee = &intent.fee.amount;
        require_coin(fee, self.chain)?;
        let units = positive_units(&intent.amount)?;

        let tx = match &intent.amount.amount_type {
            AmountType::Coin => {
                let total = intent.amount.checked_add(fee)?;
                ensure_covers(&self.balance_like(&total), &total)?;
                eth_tx::build_transfer(
                    self.chain_id,
                    nonce,
                    &intent.destination,
                    units,
                    max_priority_fee_per_gas,
                    max_fee_per_gas,
                    gas_limit,
                )?
            }
            AmountType::Token(token) => {
                ensure_covers(&self.balance_like(&intent.amount), &intent.amount)?;
                ensure_covers(&self.balance_like(fee), fee)?;
                let contract = intent
                    .contract_address
                    .as_deref()
                    .unwrap_or(&token.contract_address);
                eth_tx::build_erc20_transfer(
                    self.chain_id,
                    nonce,
                    contract,
                    &intent.destination,
                    units,
                    max_priority_fee_per_gas,
                    max_fee_per_gas,
                    gas_limit,
                )?
            }
            AmountType::Reserve => {
                return Err(WalletError::InvalidAmount(
                    "reserve balances cannot be transferred".into(),
                ))
            }
        };

        let hash = eth_tx::signing_hash(&tx)?;
        Ok((
            SigningRequest {
                hashes: vec![hash.to_vec()],
                public_key: self.public_key.clone(),
            },
            PreparedTransaction::Account {
                tx,
                public_key: self.public_key.clone(),
            },
        ))
    }
}

pub(super) fn assemble(
    tx: &EthTransaction,
    public_key: &[u8],
    signatures: &[Vec<u8>],
) -> Result<FinalTransaction, WalletError> {
    let [signature] = signatures else {
        return Err(WalletError::SignatureCountMismatch {
            expected: 1,
            got: signatures.len(),
        });
    };
    let signed = eth_tx::assemble_signed_transaction(tx, signature, public_key)?;
    Ok(FinalTransaction {
        raw: signed.raw_tx,
        hash: signed.tx_hash,
    })
}
