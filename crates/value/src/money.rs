//! Monetary amounts.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::{ValueError, ValueResult};

/// An exact amount in a currency.
///
/// Arithmetic in the interpreter works on the amount; the currency is carried
/// for display and for functions that build money back from numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Money {
    amount: Decimal,
    currency: Arc<str>,
}

impl Money {
    /// Create a money value, rejecting an empty currency code.
    pub fn new(amount: Decimal, currency: impl AsRef<str>) -> ValueResult<Self> {
        let currency = currency.as_ref().trim();
        if currency.is_empty() {
            return Err(ValueError::EmptyCurrency {
                amount: amount.to_string(),
            });
        }
        Ok(Self {
            amount,
            currency: Arc::from(currency.to_ascii_uppercase()),
        })
    }

    /// The numeric amount.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// ISO currency code, upper case.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Same currency, different amount.
    pub fn with_amount(&self, amount: Decimal) -> Self {
        Self {
            amount,
            currency: Arc::clone(&self.currency),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.normalize(), self.currency)
    }
}
