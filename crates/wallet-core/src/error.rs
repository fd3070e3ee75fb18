use thiserror::Error;

use crate::amount::Amount;
use crate::connector::ConnectorError;
use crate::signer::SignerError;
use crate::validation::ValidationErrors;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("No unspent outputs available")]
    NoUnspentOutputs,

    #[error("Invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount type mismatch: {left} vs {right}")]
    AmountTypeMismatch { left: String, right: String },

    #[error("Signature count mismatch: expected {expected}, got {got}")]
    SignatureCountMismatch { expected: usize, got: usize },

    #[error("Encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Failed to load fee: {0}")]
    FeeLoadFailure(String),

    #[error("Fee tier count must be 1 or 3, got {0}")]
    FeeTierCountInvalid(usize),

    #[error("Fee parameters missing or not applicable: {0}")]
    FeeParametersMissing(String),

    #[error("Failed to load history: {0}")]
    HistoryLoadFailure(String),

    #[error("Wallet state not loaded: {0}")]
    StateNotLoaded(String),

    #[error("Invalid state snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Transaction rejected by node: {reason}")]
    SendRejected { reason: String },

    #[error("Broadcast outcome unknown: {0}")]
    SendIndeterminate(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Signer failed: {0}")]
    Signer(#[from] SignerError),

    #[error("Unsupported curve {curve} for chain {chain}")]
    UnsupportedCurve { chain: String, curve: String },

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WalletError {
    pub(crate) fn insufficient(required: &Amount, available: &Amount) -> Self {
        WalletError::InsufficientFunds {
            required: required.to_string(),
            available: available.to_string(),
        }
    }
}

impl From<ValidationErrors> for WalletError {
    fn from(e: ValidationErrors) -> Self {
        WalletError::Validation(e)
    }
}

impl From<ConnectorError> for WalletError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::Transport(msg) => WalletError::Transport(msg),
            ConnectorError::Rejected { reason } => WalletError::SendRejected { reason },
            ConnectorError::InvalidResponse(msg) => WalletError::FeeLoadFailure(msg),
        }
    }
}

impl From<chain_btc::error::BtcError> for WalletError {
    fn from(e: chain_btc::error::BtcError) -> Self {
        use chain_btc::error::BtcError;
        match e {
            BtcError::NoUnspentOutputs => WalletError::NoUnspentOutputs,
            BtcError::InsufficientFunds {
                required,
                available,
            } => WalletError::InsufficientFunds {
                required: format!("{required} sat"),
                available: format!("{available} sat"),
            },
            BtcError::InvalidAddress(msg) => WalletError::InvalidDestination(msg),
            BtcError::InvalidPublicKey(msg) => WalletError::InvalidPublicKey(msg),
            BtcError::SignatureCountMismatch { expected, actual } => {
                WalletError::SignatureCountMismatch {
                    expected,
                    got: actual,
                }
            }
            other => WalletError::EncodingFailure(format!("BTC: {other}")),
        }
    }
}

impl From<chain_eth::error::EthError> for WalletError {
    fn from(e: chain_eth::error::EthError) -> Self {
        use chain_eth::error::EthError;
        match e {
            EthError::InvalidAddress(msg) => WalletError::InvalidDestination(msg),
            EthError::InvalidPublicKey(msg) => WalletError::InvalidPublicKey(msg),
            other => WalletError::EncodingFailure(format!("ETH: {other}")),
        }
    }
}

impl From<chain_sol::error::SolError> for WalletError {
    fn from(e: chain_sol::error::SolError) -> Self {
        use chain_sol::error::SolError;
        match e {
            SolError::InvalidAddress(msg) => WalletError::InvalidDestination(msg),
            SolError::InvalidPublicKey(msg) => WalletError::InvalidPublicKey(msg),
            SolError::SignatureCountMismatch { expected, actual } => {
                WalletError::SignatureCountMismatch {
                    expected,
                    got: actual,
                }
            }
            other => WalletError::EncodingFailure(format!("SOL: {other}")),
        }
    }
}
