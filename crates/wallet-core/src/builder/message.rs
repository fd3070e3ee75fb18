use chain_sol::SolTransaction;

use super::{ensure_covers, positive_units, require_coin, PreparedTransaction};
use crate::amount::Amount;
use crate::error::WalletError;
use crate::transfer::{FinalTransaction, SigningRequest, TransferIntent};
use crate::types::Chain;

/// Compiles system transfers against the blockhash of the last refresh.
///
/// The signer receives the serialized message itself, not a digest.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    chain: Chain,
    public_key: [u8; 32],
    recent_blockhash: Option<[u8; 32]>,
    lamports_per_signature: u64,
    coin_balance: Option<Amount>,
}

impl MessageBuilder {
    pub fn new(chain: Chain, public_key: &[u8]) -> Result<Self, WalletError> {
        let public_key: [u8; 32] = public_key.try_into().map_err(|_| {
            WalletError::InvalidPublicKey(format!(
                "expected 32-byte ed25519 key, got {} bytes",
                public_key.len()
            ))
        })?;
        Ok(Self {
            chain,
            public_key,
            recent_blockhash: None,
            lamports_per_signature: 0,
            coin_balance: None,
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn recent_blockhash(&self) -> Option<String> {
        self.recent_blockhash
            .as_ref()
            .map(chain_sol::address::bytes_to_address)
    }

    pub fn lamports_per_signature(&self) -> u64 {
        self.lamports_per_signature
    }

    /// Every transfer is signed by the fee payer alone.
    pub fn signature_count(&self) -> usize {
        1
    }

    pub(crate) fn set_state(
        &mut self,
        recent_blockhash: &str,
        lamports_per_signature: u64,
        balances: &[Amount],
    ) -> Result<(), WalletError> {
        let blockhash = chain_sol::address::address_to_bytes(recent_blockhash)
            .map_err(|e| WalletError::InvalidSnapshot(format!("recent blockhash: {e}")))?;
        self.recent_blockhash = Some(blockhash);
        self.lamports_per_signature = lamports_per_signature;
        let coin = Amount::zero_coin(self.chain);
        self.coin_balance = balances.iter().find(|a| a.is_same_type(&coin)).cloned();
        Ok(())
    }

    pub(crate) fn build_for_sign(
        &self,
        intent: &TransferIntent,
    ) -> Result<(SigningRequest, PreparedTransaction), WalletError> {
        require_coin(&intent.amount, self.chain)?;
        require_coin(&intent.fee.amount, self.chain)?;
        let blockhash = self.recent_blockhash.ok_or_else(|| {
            WalletError::StateNotLoaded(format!("no recent blockhash for {}", self.chain))
        })?;

        let lamports = u64::try_from(positive_units(&intent.amount)?)
            .map_err(|_| WalletError::InvalidAmount(format!("{} out of range", intent.amount)))?;
        let destination = chain_sol::address::address_to_bytes(&intent.destination)?;

        let total = intent.amount.checked_add(&intent.fee.amount)?;
        let balance = self
            .coin_balance
            .clone()
            .unwrap_or_else(|| Amount::zero_coin(self.chain));
        ensure_covers(&balance, &total)?;

        let tx = chain_sol::build_sol_transfer_with_memo(
            &self.public_key,
            &destination,
            lamports,
            &blockhash,
            intent.memo.as_deref(),
        )?;
        let payload = chain_sol::serialize_message(&tx)?;
        let hashes = vec![payload; tx.signer_keys().len()];

        Ok((
            SigningRequest {
                hashes,
                public_key: self.public_key.to_vec(),
            },
            PreparedTransaction::Message { tx },
        ))
    }
}

pub(super) fn assemble(
    tx: &SolTransaction,
    signatures: &[Vec<u8>],
) -> Result<FinalTransaction, WalletError> {
    let signed = chain_sol::assemble_signed_transaction(tx, signatures)?;
    Ok(FinalTransaction {
        raw: signed.raw,
        hash: signed.signature,
    })
}
