//! Bitcoin chain support for the wallet core.
//!
//! Provides P2WPKH address derivation, as-received UTXO selection, and a
//! two-stage transaction pipeline: build an unsigned transaction and its
//! per-input sighashes, then assemble the witness data from externally
//! produced signatures.

pub mod address;
pub mod error;
pub mod network;
pub mod transaction;
pub mod utxo;
