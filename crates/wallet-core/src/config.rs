//! Wallet manager configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Token};
use crate::connector::FailoverPolicy;
use crate::error::WalletError;
use crate::types::{Chain, ChainKind};

/// Per-manager settings. Everything except `chain` has a usable default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub chain: Chain,
    /// Equivalent node endpoints, in failover order.
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub failover: FailoverPolicy,
    /// Upper bound on inputs in one UTXO transaction.
    #[serde(default = "default_max_input_count")]
    pub max_input_count: usize,
    /// Smallest transferable coin value. Falls back to the chain default.
    #[serde(default)]
    pub dust_value: Option<Decimal>,
    /// Coin that must stay on the account unless it is fully drained.
    #[serde(default)]
    pub minimum_balance: Option<Decimal>,
    /// Overrides the network's coin transfer gas limit.
    #[serde(default)]
    pub gas_limit: Option<u64>,
    /// Overrides the network's token transfer gas limit.
    #[serde(default)]
    pub token_gas_limit: Option<u64>,
    /// Tokens tracked from the start. More can be added at runtime.
    #[serde(default)]
    pub tokens: Vec<Token>,
}

fn default_max_input_count() -> usize {
    100
}

impl ManagerConfig {
    pub fn for_chain(chain: Chain) -> Self {
        Self {
            chain,
            endpoints: Vec::new(),
            failover: FailoverPolicy::default(),
            max_input_count: default_max_input_count(),
            dust_value: None,
            minimum_balance: None,
            gas_limit: None,
            token_gas_limit: None,
            tokens: Vec::new(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, WalletError> {
        let config: Self = toml::from_str(raw).map_err(|e| WalletError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.max_input_count == 0 {
            return Err(WalletError::Config("max_input_count must be > 0".into()));
        }
        if self.dust_value.is_some_and(|d| d.is_sign_negative()) {
            return Err(WalletError::Config("dust_value must not be negative".into()));
        }
        if self.minimum_balance.is_some_and(|m| m.is_sign_negative()) {
            return Err(WalletError::Config("minimum_balance must not be negative".into()));
        }
        if self.gas_limit == Some(0) || self.token_gas_limit == Some(0) {
            return Err(WalletError::Config("gas limits must be > 0".into()));
        }
        if !self.tokens.is_empty() && self.chain.kind() != ChainKind::Account {
            return Err(WalletError::Config(format!("{} does not carry tokens", self.chain)));
        }
        Ok(())
    }

    pub fn dust(&self) -> Option<Amount> {
        self.dust_value
            .or_else(|| default_dust(self.chain))
            .map(|value| Amount::coin(self.chain, value))
    }

    pub fn minimum_balance(&self) -> Option<Amount> {
        self.minimum_balance
            .or_else(|| default_minimum_balance(self.chain))
            .map(|value| Amount::coin(self.chain, value))
    }

    /// Gas limits for `(coin, token)` transfers on account chains.
    pub fn gas_limits(&self) -> Option<(u64, u64)> {
        let network = self.chain.evm_chain()?;
        Some((
            self.gas_limit.unwrap_or(network.transfer_gas_limit),
            self.token_gas_limit
                .unwrap_or(network.token_transfer_gas_limit),
        ))
    }
}

fn default_dust(chain: Chain) -> Option<Decimal> {
    match chain.kind() {
        // 546 sat, the relay policy limit for P2WPKH-sized outputs.
        ChainKind::Utxo => Some(Decimal::new(546, 8)),
        _ => None,
    }
}

fn default_minimum_balance(chain: Chain) -> Option<Decimal> {
    match chain.kind() {
        // Rent-exempt minimum of a zero-data system account.
        ChainKind::Message => Some(Decimal::new(890_880, 9)),
        _ => None,
    }
}
