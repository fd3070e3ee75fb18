//! Chain-specific transaction construction.
//!
//! A [`TransactionBuilder`] is chosen once per wallet from its [`Chain`] and
//! holds a working copy of the chain state (unspent outputs, sequence
//! number or recent blockhash) handed to it by the last refresh. Building is
//! split in two so an external signer can sit in the middle:
//!
//! 1. [`TransactionBuilder::build_for_sign`] turns a [`TransferIntent`] into
//!    the hashes to sign plus a [`PreparedTransaction`].
//! 2. [`TransactionBuilder::build_for_send`] combines the prepared
//!    transaction with the returned signatures into wire bytes.
//!
//! Neither step mutates the builder. Only [`TransactionBuilder::apply_state`]
//! does, and the manager calls it solely with refreshed state.

mod account;
mod message;
mod utxo;

pub use account::AccountBuilder;
pub use message::MessageBuilder;
pub use utxo::UtxoBuilder;

use std::collections::HashSet;

use chain_btc::transaction::UnsignedBtcTx;
use chain_btc::utxo::OutPointRef;
use chain_eth::transaction::EthTransaction;
use chain_sol::SolTransaction;

use crate::amount::{Amount, AmountType};
use crate::config::ManagerConfig;
use crate::connector::ChainState;
use crate::error::WalletError;
use crate::transfer::{FinalTransaction, SigningRequest, SigningResult, TransferIntent};
use crate::types::{Chain, ChainKind};
use crate::wallet::PendingParams;

#[derive(Debug, Clone)]
pub enum TransactionBuilder {
    Utxo(UtxoBuilder),
    Account(AccountBuilder),
    Message(MessageBuilder),
}

/// Everything `build_for_send` needs besides the signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedTransaction {
    Utxo {
        unsigned: UnsignedBtcTx,
        public_key: Vec<u8>,
    },
    Account {
        tx: EthTransaction,
        public_key: Vec<u8>,
    },
    Message {
        tx: SolTransaction,
    },
}

impl PreparedTransaction {
    pub fn kind(&self) -> ChainKind {
        match self {
            PreparedTransaction::Utxo { .. } => ChainKind::Utxo,
            PreparedTransaction::Account { .. } => ChainKind::Account,
            PreparedTransaction::Message { .. } => ChainKind::Message,
        }
    }

    /// Chain data the pending record keeps about this transaction.
    pub fn pending_params(&self) -> Option<PendingParams> {
        match self {
            PreparedTransaction::Utxo { unsigned, .. } => {
                Some(PendingParams::SpentOutputs(unsigned.spent.clone()))
            }
            PreparedTransaction::Account { tx, .. } => Some(PendingParams::SequenceNumber(tx.nonce)),
            PreparedTransaction::Message { .. } => None,
        }
    }

    /// Fee in smallest units when the encoding changed it, which happens
    /// when dust change is folded into a UTXO fee.
    pub fn adjusted_fee_units(&self) -> Option<u128> {
        match self {
            PreparedTransaction::Utxo { unsigned, .. } => Some(unsigned.fee_sat as u128),
            _ => None,
        }
    }
}

impl TransactionBuilder {
    pub fn for_chain(config: &ManagerConfig, public_key: &[u8]) -> Result<Self, WalletError> {
        let chain = config.chain;
        let builder = match chain.kind() {
            ChainKind::Utxo => TransactionBuilder::Utxo(UtxoBuilder::new(
                chain,
                public_key,
                config.max_input_count,
                config.dust().as_ref(),
            )?),
            ChainKind::Account => {
                let (gas_limit, token_gas_limit) = config.gas_limits().ok_or_else(|| {
                    WalletError::Config(format!("{chain} has no EVM network definition"))
                })?;
                TransactionBuilder::Account(AccountBuilder::new(
                    chain,
                    public_key,
                    gas_limit,
                    token_gas_limit,
                )?)
            }
            ChainKind::Message => TransactionBuilder::Message(MessageBuilder::new(chain, public_key)?),
        };
        Ok(builder)
    }

    pub fn kind(&self) -> ChainKind {
        match self {
            TransactionBuilder::Utxo(_) => ChainKind::Utxo,
            TransactionBuilder::Account(_) => ChainKind::Account,
            TransactionBuilder::Message(_) => ChainKind::Message,
        }
    }

    pub fn chain(&self) -> Chain {
        match self {
            TransactionBuilder::Utxo(b) => b.chain(),
            TransactionBuilder::Account(b) => b.chain(),
            TransactionBuilder::Message(b) => b.chain(),
        }
    }

    pub fn as_utxo(&self) -> Option<&UtxoBuilder> {
        match self {
            TransactionBuilder::Utxo(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_account(&self) -> Option<&AccountBuilder> {
        match self {
            TransactionBuilder::Account(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageBuilder> {
        match self {
            TransactionBuilder::Message(b) => Some(b),
            _ => None,
        }
    }

    /// Encodes `intent` against the current state. `reserved` lists outputs
    /// already spent by pending transactions; only UTXO chains use it.
    pub fn build_for_sign(
        &self,
        intent: &TransferIntent,
        reserved: &HashSet<OutPointRef>,
    ) -> Result<(SigningRequest, PreparedTransaction), WalletError> {
        let (request, prepared) = match self {
            TransactionBuilder::Utxo(b) => b.build_for_sign(intent, reserved)?,
            TransactionBuilder::Account(b) => b.build_for_sign(intent)?,
            TransactionBuilder::Message(b) => b.build_for_sign(intent)?,
        };
        if request.hashes.is_empty() {
            return Err(WalletError::EncodingFailure(
                "transaction produced nothing to sign".into(),
            ));
        }
        Ok((request, prepared))
    }

    /// Attaches `signing.signatures` to `prepared`. Signature `i` must
    /// answer hash `i` of the request `prepared` came with.
    pub fn build_for_send(
        prepared: &PreparedTransaction,
        signing: &SigningResult,
    ) -> Result<FinalTransaction, WalletError> {
        let final_tx = match prepared {
            PreparedTransaction::Utxo {
                unsigned,
                public_key,
            } => utxo::assemble(unsigned, public_key, &signing.signatures)?,
            PreparedTransaction::Account { tx, public_key } => {
                account::assemble(tx, public_key, &signing.signatures)?
            }
            PreparedTransaction::Message { tx } => message::assemble(tx, &signing.signatures)?,
        };
        if final_tx.raw.is_empty() || final_tx.hash.is_empty() {
            return Err(WalletError::EncodingFailure(
                "signed transaction is empty".into(),
            ));
        }
        Ok(final_tx)
    }

    /// Replaces the builder's chain state wholesale.
    pub fn apply_state(&mut self, state: ChainState, balances: &[Amount]) -> Result<(), WalletError> {
        match (self, state) {
            (TransactionBuilder::Utxo(b), ChainState::Utxo { outputs }) => {
                b.set_outputs(outputs);
                Ok(())
            }
            (TransactionBuilder::Account(b), ChainState::Account { sequence_number }) => {
                b.set_state(sequence_number, balances);
                Ok(())
            }
            (
                TransactionBuilder::Message(b),
                ChainState::Message {
                    recent_blockhash,
                    lamports_per_signature,
                },
            ) => b.set_state(&recent_blockhash, lamports_per_signature, balances),
            (builder, state) => Err(WalletError::InvalidSnapshot(format!(
                "{} state for a {:?} chain",
                state_name(&state),
                builder.kind()
            ))),
        }
    }
}

fn state_name(state: &ChainState) -> &'static str {
    match state {
        ChainState::Utxo { .. } => "UTXO",
        ChainState::Account { .. } => "account",
        ChainState::Message { .. } => "message",
    }
}

/// Fails unless `balance` covers `required`.
pub(crate) fn ensure_covers(balance: &Amount, required: &Amount) -> Result<(), WalletError> {
    if required.value > balance.value {
        return Err(WalletError::insufficient(required, balance));
    }
    Ok(())
}

pub(crate) fn require_coin(amount: &Amount, chain: Chain) -> Result<(), WalletError> {
    if amount.amount_type != AmountType::Coin {
        return Err(WalletError::InvalidAmount(format!(
            "{chain} only transfers its native coin, got {}",
            amount.amount_type
        )));
    }
    Ok(())
}

/// Smallest units of a positive amount.
pub(crate) fn positive_units(amount: &Amount) -> Result<u128, WalletError> {
    if !amount.is_positive() {
        return Err(WalletError::InvalidAmount(format!("{amount} must be positive")));
    }
    amount.to_smallest_units()
}

pub(crate) fn units_u64(amount: &Amount) -> Result<u64, WalletError> {
    let units = amount.to_smallest_units()?;
    u64::try_from(units).map_err(|_| WalletError::InvalidAmount(format!("{amount} out of range")))
}
