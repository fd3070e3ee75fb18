//! Pre-flight checks on a transfer. Every violated rule is reported, not
//! just the first one found.

use thiserror::Error;

use crate::amount::{Amount, AmountType, Token};
use crate::transfer::TransferIntent;
use crate::wallet::Wallet;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount {0} must be positive")]
    InvalidAmount(String),

    #[error("fee {0} must not be negative")]
    InvalidFee(String),

    #[error("amount {amount} exceeds balance {balance}")]
    AmountExceedsBalance { amount: String, balance: String },

    #[error("fee {fee} exceeds balance {balance}")]
    FeeExceedsBalance { fee: String, balance: String },

    #[error("amount plus fee {total} exceeds balance {balance}")]
    TotalExceedsBalance { total: String, balance: String },

    #[error("amount is below the dust limit {minimum}")]
    DustAmount { minimum: String },

    #[error("change would be below the dust limit {minimum}")]
    DustChange { minimum: String },

    #[error("remaining balance would fall below the reserve {minimum}")]
    MinimumBalance { minimum: String },

    #[error("at most {available} can be sent in one transaction of {max_inputs} inputs")]
    MaximumUtxo { max_inputs: usize, available: String },

    #[error("invalid destination address {address}")]
    InvalidDestination { address: String },

    #[error("token {symbol} ({contract}) is not tracked by this wallet")]
    UnknownToken { symbol: String, contract: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn contains(&self, pred: impl Fn(&ValidationError) -> bool) -> bool {
        self.0.iter().any(pred)
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Single-transaction spend cap of UTXO chains.
#[derive(Debug, Clone)]
pub struct MaxUtxoLimit {
    pub max_inputs: usize,
    /// What the first `max_inputs` unreserved outputs add up to.
    pub available: Amount,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    pub dust: Option<Amount>,
    pub minimum_balance: Option<Amount>,
    pub max_utxo: Option<MaxUtxoLimit>,
    /// Tokens a transfer may move. `None` puts no restriction on tokens.
    pub tracked_tokens: Option<Vec<Token>>,
}

/// Checks `intent` against the wallet's cached balances.
pub fn validate_transfer(
    wallet: &Wallet,
    intent: &TransferIntent,
    destination_valid: bool,
    rules: &ValidationRules,
) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    let amount = &intent.amount;
    let fee = &intent.fee.amount;

    if !destination_valid {
        errors.push(ValidationError::InvalidDestination {
            address: intent.destination.clone(),
        });
    }

    if let (AmountType::Token(token), Some(tracked)) = (&amount.amount_type, &rules.tracked_tokens) {
        if !tracked.iter().any(|t| t.is_same_contract(token)) {
            errors.push(ValidationError::UnknownToken {
                symbol: token.symbol.clone(),
                contract: token.contract_address.clone(),
            });
        }
    }

    let fee_balance = wallet.balance_like(fee);
    if fee.is_negative() {
        errors.push(ValidationError::InvalidFee(fee.to_string()));
    } else if fee.value > fee_balance.value {
        errors.push(ValidationError::FeeExceedsBalance {
            fee: fee.to_string(),
            balance: fee_balance.to_string(),
        });
    }

    let balance = wallet.balance_like(amount);
    if !amount.is_positive() {
        errors.push(ValidationError::InvalidAmount(amount.to_string()));
    } else if amount.value > balance.value {
        errors.push(ValidationError::AmountExceedsBalance {
            amount: amount.to_string(),
            balance: balance.to_string(),
        });
    }

    // Remaining balance after the send, only meaningful when fee and amount
    // draw from the same asset.
    let remainder = match amount.checked_add(fee) {
        Ok(total) if amount.is_positive() && !fee.is_negative() => {
            if total.value > balance.value {
                errors.push(ValidationError::TotalExceedsBalance {
                    total: total.to_string(),
                    balance: balance.to_string(),
                });
                None
            } else {
                Some(balance.value - total.value)
            }
        }
        _ => None,
    };

    if let Some(dust) = rules.dust.as_ref().filter(|d| d.is_same_type(amount)) {
        if amount.is_positive() && amount.value < dust.value {
            errors.push(ValidationError::DustAmount {
                minimum: dust.to_string(),
            });
        }
        if let Some(change) = remainder {
            if !change.is_zero() && change < dust.value {
                errors.push(ValidationError::DustChange {
                    minimum: dust.to_string(),
                });
            }
        }
    }

    if let Some(minimum) = rules.minimum_balance.as_ref().filter(|m| m.is_same_type(amount)) {
        if let Some(change) = remainder {
            if !change.is_zero() && change < minimum.value {
                errors.push(ValidationError::MinimumBalance {
                    minimum: minimum.to_string(),
                });
            }
        }
    }

    if let Some(limit) = &rules.max_utxo {
        if amount.is_same_type(&limit.available) && fee.is_same_type(&limit.available) {
            let spendable = limit.available.value - fee.value;
            if amount.value > spendable {
                errors.push(ValidationError::MaximumUtxo {
                    max_inputs: limit.max_inputs,
                    available: limit.available.with_value(spendable).to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::{Fee, Token};
    use crate::types::Chain;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn wallet_with(balance: Decimal) -> Wallet {
        let mut wallet = Wallet::new(Chain::Bitcoin, "bc1qsource", vec![2; 33]);
        wallet.add_amount(Amount::coin(Chain::Bitcoin, balance));
        wallet
    }

    fn intent(amount: Decimal, fee: Decimal) -> TransferIntent {
        TransferIntent::new(
            Amount::coin(Chain::Bitcoin, amount),
            Fee::new(Amount::coin(Chain::Bitcoin, fee)),
            "bc1qsource",
            "bc1qdest",
        )
    }

    fn dust_rules() -> ValidationRules {
        ValidationRules {
            dust: Some(Amount::coin(Chain::Bitcoin, dec!(0.00000546))),
            ..Default::default()
        }
    }

    #[test]
    fn valid_transfer_passes() {
        let wallet = wallet_with(dec!(1));
        assert!(validate_transfer(&wallet, &intent(dec!(0.5), dec!(0.0001)), true, &dust_rules()).is_ok());
    }

    #[test]
    fn zero_amount_is_invalid() {
        let wallet = wallet_with(dec!(1));
        let errors = validate_transfer(&wallet, &intent(dec!(0), dec!(0.0001)), true, &ValidationRules::default())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors.0[0], ValidationError::InvalidAmount(_)));
    }

    #[test]
    fn every_violation_is_reported() {
        let wallet = wallet_with(dec!(0.001));
        let errors = validate_transfer(&wallet, &intent(dec!(0.002), dec!(0.003)), false, &ValidationRules::default())
            .unwrap_err();

        assert!(errors.contains(|e| matches!(e, ValidationError::InvalidDestination { .. })));
        assert!(errors.contains(|e| matches!(e, ValidationError::FeeExceedsBalance { .. })));
        assert!(errors.contains(|e| matches!(e, ValidationError::AmountExceedsBalance { .. })));
        assert!(errors.contains(|e| matches!(e, ValidationError::TotalExceedsBalance { .. })));
    }

    #[test]
    fn negative_fee_is_invalid() {
        let wallet = wallet_with(dec!(1));
        let errors = validate_transfer(&wallet, &intent(dec!(0.1), dec!(-0.1)), true, &ValidationRules::default())
            .unwrap_err();
        assert!(errors.contains(|e| matches!(e, ValidationError::InvalidFee(_))));
    }

    #[test]
    fn dust_amount_and_dust_change() {
        let wallet = wallet_with(dec!(0.001));
        let errors = validate_transfer(&wallet, &intent(dec!(0.000001), dec!(0.00001)), true, &dust_rules())
            .unwrap_err();
        assert!(errors.contains(|e| matches!(e, ValidationError::DustAmount { .. })));

        // 0.001 - 0.00098 - 0.000019 leaves 100 sat of change.
        let errors = validate_transfer(&wallet, &intent(dec!(0.00098), dec!(0.000019)), true, &dust_rules())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors.0[0], ValidationError::DustChange { .. }));
    }

    #[test]
    fn spending_everything_is_not_dust_change() {
        let wallet = wallet_with(dec!(0.001));
        assert!(validate_transfer(&wallet, &intent(dec!(0.00099), dec!(0.00001)), true, &dust_rules()).is_ok());
    }

    #[test]
    fn minimum_balance_reserve() {
        let wallet = wallet_with(dec!(10));
        let rules = ValidationRules {
            minimum_balance: Some(Amount::coin(Chain::Bitcoin, dec!(1))),
            ..Default::default()
        };
        let errors = validate_transfer(&wallet, &intent(dec!(9.5), dec!(0.1)), true, &rules).unwrap_err();
        assert!(matches!(errors.0[0], ValidationError::MinimumBalance { .. }));
        assert!(validate_transfer(&wallet, &intent(dec!(8), dec!(0.1)), true, &rules).is_ok());
    }

    #[test]
    fn maximum_utxo_cap() {
        let wallet = wallet_with(dec!(1));
        let rules = ValidationRules {
            max_utxo: Some(MaxUtxoLimit {
                max_inputs: 2,
                available: Amount::coin(Chain::Bitcoin, dec!(0.5)),
            }),
            ..Default::default()
        };
        assert!(validate_transfer(&wallet, &intent(dec!(0.4999), dec!(0.0001)), true, &rules).is_ok());
        let errors = validate_transfer(&wallet, &intent(dec!(0.5), dec!(0.0001)), true, &rules).unwrap_err();
        assert!(matches!(errors.0[0], ValidationError::MaximumUtxo { max_inputs: 2, .. }));
    }

    #[test]
    fn token_transfer_checks_each_asset_separately() {
        let token = Token {
            symbol: "USDC".into(),
            contract_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".into(),
            decimals: 6,
        };
        let mut wallet = Wallet::new(Chain::Ethereum, "0xsource", vec![2; 33]);
        wallet.add_amount(Amount::coin(Chain::Ethereum, dec!(0.01)));
        wallet.add_amount(Amount::token(&token, dec!(100)));

        let ok = TransferIntent::new(
            Amount::token(&token, dec!(100)),
            Fee::new(Amount::coin(Chain::Ethereum, dec!(0.001))),
            "0xsource",
            "0xdest",
        );
        assert!(validate_transfer(&wallet, &ok, true, &ValidationRules::default()).is_ok());

        let too_much_fee = TransferIntent {
            fee: Fee::new(Amount::coin(Chain::Ethereum, dec!(0.02))),
            ..ok
        };
        let errors = validate_transfer(&wallet, &too_much_fee, true, &ValidationRules::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors.0[0], ValidationError::FeeExceedsBalance { .. }));
    }

    #[test]
    fn untracked_token_is_reported() {
        let usdc = Token {
            symbol: "USDC".into(),
            contract_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".into(),
            decimals: 6,
        };
        let dai = Token {
            symbol: "DAI".into(),
            contract_address: "0x6B175474E89094C44Da98b954EedeAC495271d0F".into(),
            decimals: 18,
        };
        let mut wallet = Wallet::new(Chain::Ethereum, "0xsource", vec![2; 33]);
        wallet.add_amount(Amount::coin(Chain::Ethereum, dec!(1)));
        wallet.add_amount(Amount::token(&dai, dec!(50)));

        let send_dai = TransferIntent::new(
            Amount::token(&dai, dec!(10)),
            Fee::new(Amount::coin(Chain::Ethereum, dec!(0.001))),
            "0xsource",
            "0xdest",
        );
        let rules = ValidationRules {
            tracked_tokens: Some(vec![usdc]),
            ..Default::default()
        };
        let errors = validate_transfer(&wallet, &send_dai, true, &rules).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors.0[0], ValidationError::UnknownToken { symbol, .. } if symbol == "DAI"));

        let lowercase = Token {
            contract_address: dai.contract_address.to_lowercase(),
            ..dai.clone()
        };
        let rules = ValidationRules {
            tracked_tokens: Some(vec![lowercase]),
            ..Default::default()
        };
        assert!(validate_transfer(&wallet, &send_dai, true, &rules).is_ok());
    }
}
