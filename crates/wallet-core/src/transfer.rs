use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Fee};

/// What the caller wants to send. Builders read it and never modify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub amount: Amount,
    pub fee: Fee,
    pub source: String,
    pub destination: String,
    pub change_address: Option<String>,
    pub contract_address: Option<String>,
    pub memo: Option<String>,
}

impl TransferIntent {
    pub fn new(
        amount: Amount,
        fee: Fee,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            fee,
            source: source.into(),
            destination: destination.into(),
            change_address: None,
            contract_address: None,
            memo: None,
        }
    }

    pub fn with_change_address(mut self, address: impl Into<String>) -> Self {
        self.change_address = Some(address.into());
        self
    }

    pub fn with_contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// Hashes handed to the external signer, in the order signatures must
/// come back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pub hashes: Vec<Vec<u8>>,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningResult {
    pub signatures: Vec<Vec<u8>>,
}

/// A signed, wire-ready transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalTransaction {
    pub raw: Vec<u8>,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub hash: String,
}
