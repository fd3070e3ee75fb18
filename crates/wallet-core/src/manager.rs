//! Per-wallet orchestration: refresh, fee queries and the send pipeline.
//!
//! The wallet and its builder live behind one async mutex. No lock is held
//! across a connector or signer call; every pipeline reads what it needs,
//! releases the lock, suspends, and re-acquires it only to commit.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::address::AddressService;
use crate::amount::{Amount, AmountType, Fee, Token};
use crate::builder::TransactionBuilder;
use crate::config::ManagerConfig;
use crate::connector::{Connector, ConnectorError, FeeRequest};
use crate::error::WalletError;
use crate::fee::{self, FeeTiers};
use crate::history::{HistoryRequest, TransactionHistoryProvider, TransactionRecord};
use crate::signer::Signer;
use crate::state::{self, RefreshOutcome, RefreshPhase};
use crate::transfer::{SendResult, SigningResult, TransferIntent};
use crate::types::{Chain, ChainKind};
use crate::validation::{self, MaxUtxoLimit, ValidationErrors, ValidationRules};
use crate::wallet::{PendingTransactionRecord, Wallet};

struct ManagerState {
    wallet: Wallet,
    builder: TransactionBuilder,
    tokens: Vec<Token>,
}

pub struct WalletManager<C> {
    config: ManagerConfig,
    addresses: AddressService,
    connector: C,
    state: Mutex<ManagerState>,
    refreshing: AtomicBool,
}

/// Puts the refresh phase back to idle however the refresh ends, including
/// by its future being dropped.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C: Connector> WalletManager<C> {
    pub fn new(config: ManagerConfig, public_key: Vec<u8>, connector: C) -> Result<Self, WalletError> {
        config.validate()?;
        let chain = config.chain;
        let addresses = AddressService::new(chain, chain.curve())?;
        let address = addresses.make_address(&public_key)?;
        let builder = TransactionBuilder::for_chain(&config, &public_key)?;
        let mut tokens: Vec<Token> = Vec::with_capacity(config.tokens.len());
        for token in &config.tokens {
            if !tokens.iter().any(|t| t.is_same_contract(token)) {
                tokens.push(token.clone());
            }
        }
        info!(
            chain = %chain,
            %address,
            host = connector.host(),
            tokens = tokens.len(),
            "wallet manager created"
        );

        Ok(Self {
            config,
            addresses,
            connector,
            state: Mutex::new(ManagerState {
                wallet: Wallet::new(chain, address, public_key),
                builder,
                tokens,
            }),
            refreshing: AtomicBool::new(false),
        })
    }

    pub fn chain(&self) -> Chain {
        self.config.chain
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn address_service(&self) -> &AddressService {
        &self.addresses
    }

    pub fn refresh_phase(&self) -> RefreshPhase {
        if self.refreshing.load(Ordering::Acquire) {
            RefreshPhase::Refreshing
        } else {
            RefreshPhase::Idle
        }
    }

    /// A copy of the wallet as of now.
    pub async fn wallet(&self) -> Wallet {
        self.state.lock().await.wallet.clone()
    }

    /// Last refreshed sequence number, account chains only.
    pub async fn sequence_number(&self) -> Option<u64> {
        self.state
            .lock()
            .await
            .builder
            .as_account()
            .and_then(|b| b.sequence_number())
    }

    /// Most that one transaction can move. On UTXO chains this leaves out
    /// outputs reserved by pending sends and respects the input cap.
    pub async fn available_amount(&self) -> Result<Amount, WalletError> {
        let state = self.state.lock().await;
        match state.builder.as_utxo() {
            Some(utxo) => utxo.available_amount(&state.wallet.reserved_outputs()),
            None => Ok(state.wallet.coin_balance()),
        }
    }

    pub async fn tokens(&self) -> Vec<Token> {
        self.state.lock().await.tokens.clone()
    }

    /// Starts tracking `token`. Returns `false` when its contract already
    /// was. The balance appears with the next refresh.
    pub async fn add_token(&self, token: Token) -> bool {
        let mut state = self.state.lock().await;
        if state.tokens.iter().any(|t| t.is_same_contract(&token)) {
            return false;
        }
        debug!(symbol = %token.symbol, contract = %token.contract_address, "token added");
        state.tokens.push(token);
        true
    }

    pub async fn add_tokens(&self, tokens: impl IntoIterator<Item = Token>) {
        for token in tokens {
            self.add_token(token).await;
        }
    }

    /// Stops tracking `token` and forgets its balance.
    pub async fn remove_token(&self, token: &Token) {
        let mut state = self.state.lock().await;
        state.tokens.retain(|t| !t.is_same_contract(token));
        state
            .wallet
            .amounts
            .retain(|amount_type, _| !matches!(amount_type, AmountType::Token(t) if t.is_same_contract(token)));
        debug!(symbol = %token.symbol, "token removed");
    }

    /// Refreshes balances, chain state and pending records.
    ///
    /// Returns [`RefreshOutcome::Skipped`] without a network call when a
    /// refresh is already running. On failure the balances are cleared and
    /// pending records kept.
    pub async fn update(&self) -> Result<RefreshOutcome, WalletError> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(chain = %self.chain(), "refresh already running");
            return Ok(RefreshOutcome::Skipped);
        }
        let _guard = RefreshGuard(&self.refreshing);

        let (address, tokens, pending_hashes, pending_at_start) = {
            let state = self.state.lock().await;
            let at_start: HashSet<String> =
                state.wallet.pending.iter().map(|r| r.hash.clone()).collect();
            (
                state.wallet.address.clone(),
                state.tokens.clone(),
                state.wallet.pending_hashes(),
                at_start,
            )
        };

        let span = info_span!("refresh", chain = %self.chain(), %address);
        async move {
            debug!(
                pending = pending_hashes.len(),
                tokens = tokens.len(),
                "requesting state"
            );
            let result = self
                .connector
                .get_state(&address, &tokens, &pending_hashes)
                .await
                .map_err(refresh_error);

            let mut state = self.state.lock().await;
            let ManagerState {
                wallet,
                builder,
                tokens,
            } = &mut *state;
            let applied = result.and_then(|mut snapshot| {
                // A token removed while the request was in flight stays removed.
                snapshot.balances.retain(|amount| match &amount.amount_type {
                    AmountType::Token(token) => tokens.iter().any(|t| t.is_same_contract(token)),
                    _ => true,
                });
                state::apply_snapshot(wallet, builder, snapshot, &pending_at_start)
            });
            match applied {
                Ok(report) => {
                    info!(
                        confirmed = report.confirmed.len(),
                        discarded = report.discarded.len(),
                        "refresh updated"
                    );
                    Ok(RefreshOutcome::Updated(report))
                }
                Err(err) => {
                    wallet.clear_amounts();
                    warn!(error = %err, "refresh failed, balances cleared");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fee tiers for sending `amount` to `destination`.
    pub async fn get_fee(&self, amount: &Amount, destination: &str) -> Result<FeeTiers, WalletError> {
        if amount.is_negative() {
            return Err(WalletError::InvalidAmount(format!("{amount} is negative")));
        }
        let source = self.state.lock().await.wallet.address.clone();
        let request = FeeRequest {
            amount: amount.clone(),
            source,
            destination: destination.to_string(),
        };

        let raw = self
            .connector
            .estimate_fee(&request)
            .await
            .map_err(fee_error)?;
        debug!(chain = %self.chain(), ?raw, "fee data received");

        let state = self.state.lock().await;
        fee::estimate(
            &state.builder,
            &raw,
            amount,
            &state.wallet.reserved_outputs(),
        )
    }

    pub async fn validate(&self, intent: &TransferIntent) -> Result<(), ValidationErrors> {
        let state = self.state.lock().await;
        self.validate_locked(&state, intent)
    }

    fn validate_locked(&self, state: &ManagerState, intent: &TransferIntent) -> Result<(), ValidationErrors> {
        let max_utxo = state.builder.as_utxo().and_then(|utxo| {
            utxo.available_amount(&state.wallet.reserved_outputs())
                .ok()
                .map(|available| MaxUtxoLimit {
                    max_inputs: utxo.max_input_count(),
                    available,
                })
        });
        let rules = ValidationRules {
            dust: self.config.dust(),
            minimum_balance: self.config.minimum_balance(),
            max_utxo,
            tracked_tokens: Some(state.tokens.clone()),
        };
        let destination_valid = self.addresses.validate(&intent.destination);
        validation::validate_transfer(&state.wallet, intent, destination_valid, &rules)
    }

    /// Builds a validated intent from the wallet's own address. UTXO change
    /// returns to the wallet and token sends target the token's contract.
    pub async fn create_transfer(
        &self,
        amount: Amount,
        fee: Fee,
        destination: &str,
    ) -> Result<TransferIntent, WalletError> {
        let state = self.state.lock().await;
        let source = state.wallet.address.clone();
        let mut intent = TransferIntent::new(amount, fee, source.clone(), destination);
        if self.chain().kind() == ChainKind::Utxo {
            intent = intent.with_change_address(source);
        }
        if let AmountType::Token(token) = &intent.amount.amount_type {
            let contract = token.contract_address.clone();
            intent = intent.with_contract_address(contract);
        }
        self.validate_locked(&state, &intent)?;
        Ok(intent)
    }

    /// Validates, builds, signs, broadcasts and records `intent`.
    ///
    /// Nothing touches the network before validation and the unsigned build
    /// succeed. A node rejection surfaces as [`WalletError::SendRejected`];
    /// a transport failure during broadcast as
    /// [`WalletError::SendIndeterminate`], since the transaction may or may
    /// not have reached the node. Neither records a pending entry.
    pub async fn send(&self, intent: &TransferIntent, signer: &dyn Signer) -> Result<SendResult, WalletError> {
        let span = info_span!(
            "send",
            chain = %self.chain(),
            amount = %intent.amount,
            destination = %intent.destination,
        );
        self.send_inner(intent, signer).instrument(span).await
    }

    async fn send_inner(&self, intent: &TransferIntent, signer: &dyn Signer) -> Result<SendResult, WalletError> {
        let (request, prepared) = {
            let state = self.state.lock().await;
            self.validate_locked(&state, intent)?;
            state
                .builder
                .build_for_sign(intent, &state.wallet.reserved_outputs())?
        };
        debug!(hashes = request.hashes.len(), "unsigned transaction built");

        let signatures = signer.sign(&request.hashes, &request.public_key).await?;
        debug!(signatures = signatures.len(), "signer returned");

        let final_tx = TransactionBuilder::build_for_send(&prepared, &SigningResult { signatures })?;
        debug!(bytes = final_tx.raw.len(), hash = %final_tx.hash, "signed transaction assembled");

        let hash = match self.connector.broadcast(&final_tx.raw).await {
            Ok(hash) => hash,
            Err(ConnectorError::Rejected { reason }) => {
                warn!(%reason, "broadcast rejected");
                return Err(WalletError::SendRejected { reason });
            }
            Err(err) => {
                warn!(error = %err, hash = %final_tx.hash, "broadcast outcome unknown");
                return Err(WalletError::SendIndeterminate(err.to_string()));
            }
        };
        if !hash.eq_ignore_ascii_case(&final_tx.hash) {
            warn!(node = %hash, local = %final_tx.hash, "node reported a different hash");
        }

        let fee = match prepared.adjusted_fee_units() {
            Some(units) => Fee {
                amount: intent.fee.amount.from_units_like(units)?,
                parameters: intent.fee.parameters.clone(),
            },
            None => intent.fee.clone(),
        };
        let record = PendingTransactionRecord {
            hash: hash.clone(),
            source: intent.source.clone(),
            destination: intent.destination.clone(),
            amount: intent.amount.clone(),
            fee,
            date: Utc::now(),
            is_incoming: false,
            params: prepared.pending_params(),
        };
        self.state.lock().await.wallet.add_pending(record);
        info!(%hash, "transaction broadcast");

        Ok(SendResult { hash })
    }

    /// Next page of this wallet's history in `amount_type`, from `history`.
    pub async fn load_history<H>(
        &self,
        history: &H,
        amount_type: AmountType,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, WalletError>
    where
        H: TransactionHistoryProvider + ?Sized,
    {
        let address = self.state.lock().await.wallet.address.clone();
        let request = HistoryRequest {
            address,
            amount_type,
            limit,
        };
        let records = history
            .load_history(&request)
            .instrument(info_span!("history", chain = %self.chain(), address = %request.address))
            .await?;
        debug!(records = records.len(), more = history.can_fetch_history(), "history loaded");
        Ok(records)
    }
}

fn refresh_error(err: ConnectorError) -> WalletError {
    match err {
        ConnectorError::Transport(msg) => WalletError::Transport(msg),
        ConnectorError::Rejected { reason } => WalletError::Transport(format!("node refused: {reason}")),
        ConnectorError::InvalidResponse(msg) => WalletError::InvalidSnapshot(msg),
    }
}

fn fee_error(err: ConnectorError) -> WalletError {
    match err {
        ConnectorError::Transport(msg) => WalletError::Transport(msg),
        other => WalletError::FeeLoadFailure(other.to_string()),
    }
}
