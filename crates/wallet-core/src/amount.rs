//! Typed decimal amounts and fees.
//!
//! An [`Amount`] is tagged with the asset it measures. Arithmetic and
//! ordering are only defined between amounts of the same [`AmountType`];
//! mixing types is a caller bug and is reported as
//! [`WalletError::AmountTypeMismatch`] rather than silently coerced.

use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::types::Chain;

/// A fungible token living on top of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub contract_address: String,
    pub decimals: u32,
}

impl Token {
    /// Contract addresses compare case-insensitively (EIP-55 checksums).
    pub fn is_same_contract(&self, other: &Token) -> bool {
        self.contract_address
            .eq_ignore_ascii_case(&other.contract_address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountType {
    Coin,
    /// Coin locked by the chain as an account reserve.
    Reserve,
    Token(Token),
}

impl std::fmt::Display for AmountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountType::Coin => write!(f, "coin"),
            AmountType::Reserve => write!(f, "reserve"),
            AmountType::Token(token) => write!(f, "token {}", token.symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub amount_type: AmountType,
    pub currency_symbol: String,
    pub value: Decimal,
    pub decimals: u32,
}

impl Amount {
    pub fn new(
        amount_type: AmountType,
        currency_symbol: impl Into<String>,
        value: Decimal,
        decimals: u32,
    ) -> Self {
        Self {
            amount_type,
            currency_symbol: currency_symbol.into(),
            value,
            decimals,
        }
    }

    pub fn coin(chain: Chain, value: Decimal) -> Self {
        Self::new(AmountType::Coin, chain.symbol(), value, chain.decimals())
    }

    pub fn zero_coin(chain: Chain) -> Self {
        Self::coin(chain, Decimal::ZERO)
    }

    pub fn token(token: &Token, value: Decimal) -> Self {
        Self::new(
            AmountType::Token(token.clone()),
            token.symbol.clone(),
            value,
            token.decimals,
        )
    }

    /// Same asset, different value.
    pub fn with_value(&self, value: Decimal) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    pub fn zero(&self) -> Self {
        self.with_value(Decimal::ZERO)
    }

    pub fn coin_from_smallest_units(chain: Chain, units: u128) -> Result<Self, WalletError> {
        Self::zero_coin(chain).from_units_like(units)
    }

    /// An amount of the same asset holding `units` of its smallest denomination.
    pub fn from_units_like(&self, units: u128) -> Result<Self, WalletError> {
        let units = i128::try_from(units)
            .map_err(|_| WalletError::InvalidAmount(format!("{units} units out of range")))?;
        let value = Decimal::try_from_i128_with_scale(units, self.decimals)
            .map_err(|e| WalletError::InvalidAmount(e.to_string()))?;
        Ok(self.with_value(value))
    }

    /// Value expressed in the asset's smallest denomination.
    pub fn to_smallest_units(&self) -> Result<u128, WalletError> {
        if self.value.is_sign_negative() && !self.value.is_zero() {
            return Err(WalletError::InvalidAmount(format!("{self} is negative")));
        }
        let scaled = self
            .value
            .checked_mul(scale_factor(self.decimals)?)
            .ok_or_else(|| WalletError::InvalidAmount(format!("{self} overflows")))?;
        if !scaled.fract().is_zero() {
            return Err(WalletError::InvalidAmount(format!(
                "{self} has more than {} decimal places",
                self.decimals
            )));
        }
        scaled
            .to_u128()
            .ok_or_else(|| WalletError::InvalidAmount(format!("{self} out of range")))
    }

    /// One unit of the smallest denomination.
    pub fn smallest_unit(&self) -> Decimal {
        Decimal::new(1, self.decimals.min(28))
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.value < Decimal::ZERO
    }

    pub fn is_same_type(&self, other: &Amount) -> bool {
        self.amount_type == other.amount_type
    }

    fn ensure_same_type(&self, other: &Amount) -> Result<(), WalletError> {
        if self.is_same_type(other) {
            Ok(())
        } else {
            Err(WalletError::AmountTypeMismatch {
                left: self.amount_type.to_string(),
                right: other.amount_type.to_string(),
            })
        }
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, WalletError> {
        self.ensure_same_type(other)?;
        let value = self
            .value
            .checked_add(other.value)
            .ok_or_else(|| WalletError::InvalidAmount(format!("{self} + {other} overflows")))?;
        Ok(self.with_value(value))
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, WalletError> {
        self.ensure_same_type(other)?;
        let value = self
            .value
            .checked_sub(other.value)
            .ok_or_else(|| WalletError::InvalidAmount(format!("{self} - {other} overflows")))?;
        Ok(self.with_value(value))
    }

    pub fn try_cmp(&self, other: &Amount) -> Result<Ordering, WalletError> {
        self.ensure_same_type(other)?;
        Ok(self.value.cmp(&other.value))
    }
}

impl PartialOrd for Amount {
    /// `None` whenever the asset types differ.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_same_type(other) {
            Some(self.value.cmp(&other.value))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value.normalize(), self.currency_symbol)
    }
}

fn scale_factor(decimals: u32) -> Result<Decimal, WalletError> {
    10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(|| WalletError::InvalidAmount(format!("unsupported precision {decimals}")))
}

/// Chain-specific inputs that reproduce a fee exactly at broadcast time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeParameters {
    Utxo {
        fee_rate_per_byte: u64,
        input_count: usize,
    },
    Evm {
        gas_limit: u64,
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Solana {
        lamports_per_signature: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Amount,
    pub parameters: Option<FeeParameters>,
}

impl Fee {
    pub fn new(amount: Amount) -> Self {
        Self {
            amount,
            parameters: None,
        }
    }

    pub fn with_parameters(amount: Amount, parameters: FeeParameters) -> Self {
        Self {
            amount,
            parameters: Some(parameters),
        }
    }
}
