//! Network collaborator boundary and multi-endpoint failover.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chain_btc::utxo::Utxo;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::amount::{Amount, Token};
use crate::config::ManagerConfig;
use crate::error::WalletError;
use crate::history::{HistoryPage, HistoryRequest, HistorySource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    /// Timeout, connection loss, 5xx. Worth trying another endpoint.
    #[error("transport: {0}")]
    Transport(String),

    /// The node understood the request and refused it.
    #[error("rejected: {reason}")]
    Rejected { reason: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Chain-specific spendable state reported by a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    Utxo { outputs: Vec<Utxo> },
    Account { sequence_number: u64 },
    Message {
        /// Base58 blockhash the next message must reference.
        recent_blockhash: String,
        lamports_per_signature: u64,
    },
}

/// Full state of one address at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub balances: Vec<Amount>,
    pub chain_state: ChainState,
    /// Which of the queried pending hashes the node now considers final.
    pub confirmed_hashes: HashSet<String>,
}

/// Fee data as the node reports it, before any tiering or rounding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawFeeData {
    /// Coin per kilobyte, in whole coins (BlockBook style).
    PerKilobyte { rates: Vec<Decimal> },
    /// Smallest units per byte.
    PerByte { rates: Vec<Decimal> },
    Gas {
        gas_limit: Option<u64>,
        base_fee_per_gas: u128,
        priority_fees: Vec<u128>,
    },
    PerSignature { lamports: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeRequest {
    pub amount: Amount,
    pub source: String,
    pub destination: String,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Endpoint identity, used in logs.
    fn host(&self) -> &str;

    /// Balances of the coin and of every tracked token, plus chain state and
    /// which of `pending_hashes` are now final.
    async fn get_state(
        &self,
        address: &str,
        tokens: &[Token],
        pending_hashes: &[String],
    ) -> Result<StateSnapshot, ConnectorError>;

    async fn estimate_fee(&self, request: &FeeRequest) -> Result<RawFeeData, ConnectorError>;

    /// Submits a signed transaction and returns the node's transaction hash.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, ConnectorError>;
}

/// Order in which endpoints are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPolicy {
    /// Every call starts at the first endpoint.
    #[default]
    RestartFromFirst,
    /// Every call starts at the endpoint that last answered.
    RoundRobin,
}

/// Whether a call can be repeated on another endpoint after a transport
/// failure without changing what its answer means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Safe,
    /// An endpoint that timed out may still have relayed the call, so a
    /// later endpoint's refusal proves nothing.
    Unsafe,
}

/// A connector backed by an ordered list of equivalent endpoints.
///
/// Only [`ConnectorError::Transport`] moves on to the next endpoint. A
/// rejection or malformed answer is the node's verdict and is returned
/// as-is, except on broadcast after an earlier endpoint failed in transport:
/// that verdict is reported as a transport failure since the transaction may
/// already be in flight. When every endpoint fails the last transport error
/// surfaces.
pub struct MultiProvider<C> {
    providers: Vec<C>,
    policy: FailoverPolicy,
    cursor: AtomicUsize,
}

impl<C: Connector> MultiProvider<C> {
    pub fn new(providers: Vec<C>, policy: FailoverPolicy) -> Result<Self, WalletError> {
        if providers.is_empty() {
            return Err(WalletError::Config(
                "at least one endpoint is required".into(),
            ));
        }
        Ok(Self {
            providers,
            policy,
            cursor: AtomicUsize::new(0),
        })
    }

    /// One provider per configured endpoint, built with `make`, tried in the
    /// configured order and policy.
    pub fn from_config<F>(config: &ManagerConfig, make: F) -> Result<Self, WalletError>
    where
        F: FnMut(&String) -> C,
    {
        if config.endpoints.is_empty() {
            return Err(WalletError::Config(format!(
                "no endpoints configured for {}",
                config.chain
            )));
        }
        Self::new(config.endpoints.iter().map(make).collect(), config.failover)
    }

    pub fn policy(&self) -> FailoverPolicy {
        self.policy
    }

    pub fn providers(&self) -> &[C] {
        &self.providers
    }

    fn attempt_order(&self) -> Vec<usize> {
        let len = self.providers.len();
        let start = match self.policy {
            FailoverPolicy::RestartFromFirst => 0,
            FailoverPolicy::RoundRobin => self.cursor.load(Ordering::Acquire) % len,
        };
        (0..len).map(|offset| (start + offset) % len).collect()
    }

    fn mark_healthy(&self, index: usize) {
        if self.policy == FailoverPolicy::RoundRobin {
            self.cursor.store(index, Ordering::Release);
        }
    }

    async fn try_each<'a, T, F, Fut>(
        &'a self,
        op: &'static str,
        replay: Replay,
        mut call: F,
    ) -> Result<T, ConnectorError>
    where
        T: Send,
        F: FnMut(&'a C) -> Fut + Send,
        Fut: Future<Output = Result<T, ConnectorError>> + Send,
    {
        let mut last = None;
        for index in self.attempt_order() {
            let provider = &self.providers[index];
            debug!(host = provider.host(), op, "attempt");
            match call(provider).await {
                Ok(value) => {
                    self.mark_healthy(index);
                    return Ok(value);
                }
                Err(ConnectorError::Transport(reason)) => {
                    warn!(host = provider.host(), op, %reason, "failed, trying next endpoint");
                    last = Some(ConnectorError::Transport(reason));
                }
                Err(verdict) if replay == Replay::Unsafe && last.is_some() => {
                    warn!(
                        host = provider.host(),
                        op,
                        %verdict,
                        "answer follows an earlier transport failure, outcome unknown"
                    );
                    return Err(ConnectorError::Transport(format!(
                        "{} answered \"{verdict}\" after an earlier endpoint failed",
                        provider.host()
                    )));
                }
                Err(other) => return Err(other),
            }
        }
        warn!(op, endpoints = self.providers.len(), "all endpoints failed");
        Err(last.unwrap_or_else(|| ConnectorError::Transport(format!("{op}: no endpoint answered"))))
    }
}

#[async_trait]
impl<C: Connector> Connector for MultiProvider<C> {
    fn host(&self) -> &str {
        let index = match self.policy {
            FailoverPolicy::RestartFromFirst => 0,
            FailoverPolicy::RoundRobin => self.cursor.load(Ordering::Acquire) % self.providers.len(),
        };
        self.providers[index].host()
    }

    async fn get_state(
        &self,
        address: &str,
        tokens: &[Token],
        pending_hashes: &[String],
    ) -> Result<StateSnapshot, ConnectorError> {
        self.try_each("get_state", Replay::Safe, |provider| {
            provider.get_state(address, tokens, pending_hashes)
        })
        .await
    }

    async fn estimate_fee(&self, request: &FeeRequest) -> Result<RawFeeData, ConnectorError> {
        self.try_each("estimate_fee", Replay::Safe, |provider| provider.estimate_fee(request))
            .await
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, ConnectorError> {
        debug!(bytes = raw_tx.len(), "broadcasting");
        self.try_each("broadcast", Replay::Unsafe, |provider| provider.broadcast(raw_tx))
            .await
    }
}

#[async_trait]
impl<C: HistorySource> HistorySource for MultiProvider<C> {
    async fn address_history(
        &self,
        request: &HistoryRequest,
        page: usize,
    ) -> Result<HistoryPage, ConnectorError> {
        self.try_each("address_history", Replay::Safe, |provider| {
            provider.address_history(request, page)
        })
        .await
    }
}
