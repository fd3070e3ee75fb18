//! Ethereum/EVM chain support for the wallet core.
//!
//! This crate provides:
//! - Ethereum address derivation from secp256k1 public keys (with EIP-55 checksums)
//! - EIP-1559 transaction building, signing-hash computation and assembly
//!   from an externally produced signature
//! - ERC-20 `transfer` calldata encoding
//! - EVM network definitions with default gas limits

pub mod address;
pub mod chains;
pub mod erc20;
pub mod error;
pub mod transaction;
