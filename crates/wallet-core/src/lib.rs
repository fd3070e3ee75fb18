//! Multi-chain wallet core.
//!
//! Builds unsigned transactions for UTXO, account and message chains,
//! estimates fees, keeps wallet state in sync with a node, and runs the
//! send pipeline against an external [`Signer`] and a [`Connector`].
//! Private keys never enter this crate.

pub mod address;
pub mod amount;
pub mod builder;
pub mod config;
pub mod connector;
pub mod error;
pub mod fee;
pub mod history;
pub mod logging;
pub mod manager;
pub mod signer;
pub mod state;
pub mod transfer;
pub mod types;
pub mod validation;
pub mod wallet;

pub use address::AddressService;
pub use amount::{Amount, AmountType, Fee, FeeParameters, Token};
pub use builder::{PreparedTransaction, TransactionBuilder};
pub use config::ManagerConfig;
pub use connector::{
    ChainState, Connector, ConnectorError, FailoverPolicy, FeeRequest, MultiProvider, RawFeeData,
    StateSnapshot,
};
pub use error::WalletError;
pub use fee::FeeTiers;
pub use history::{
    HistoryPage, HistoryRequest, HistorySource, PagedHistoryProvider, TransactionHistoryProvider,
    TransactionRecord, TransactionStatus,
};
pub use manager::WalletManager;
pub use signer::{Signer, SignerError};
pub use state::{RefreshOutcome, RefreshPhase, RefreshReport};
pub use transfer::{FinalTransaction, SendResult, SigningRequest, SigningResult, TransferIntent};
pub use types::{Chain, ChainKind, CurveType};
pub use validation::{ValidationError, ValidationErrors};
pub use wallet::{PendingParams, PendingTransactionRecord, Wallet};
