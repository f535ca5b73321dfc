//! Currency codes and currency pairs.

use std::fmt;
use std::str::FromStr;

use super::error::AccountError;

/// An uppercase currency code such as `EUR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Currency(String);

impl Currency {
    /// Normalizes `code` (trimmed, uppercased). Codes must be non-empty ASCII
    /// alphanumerics.
    pub fn new(code: &str) -> Result<Self, AccountError> {
        let trimmed = code.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AccountError::InvalidCurrency {
                code: code.to_string(),
            });
        }
        Ok(Currency(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl AsRef<str> for Currency {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A quoted pair: the price of one unit of `base` in units of `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyPair {
    pub base: Currency,
    pub quote: Currency,
}

impl CurrencyPair {
    pub fn new(base: Currency, quote: Currency) -> Result<Self, AccountError> {
        if base == quote {
            return Err(AccountError::InvalidCurrency {
                code: format!("{base}/{quote}"),
            });
        }
        Ok(Self { base, quote })
    }

    pub fn inverse(&self) -> CurrencyPair {
        CurrencyPair {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    pub fn involves(&self, currency: &Currency) -> bool {
        &self.base == currency || &self.quote == currency
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = AccountError;

    /// Parses `EUR/USD`, `EUR_USD` or the compact six letter `EURUSD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || AccountError::InvalidCurrency {
            code: s.to_string(),
        };
        let (base, quote) = match trimmed.split_once(['/', '_']) {
            Some(parts) => parts,
            None if trimmed.len() == 6 && trimmed.is_ascii() => trimmed.split_at(3),
            None => return Err(invalid()),
        };
        let base = Currency::new(base).map_err(|_| invalid())?;
        let quote = Currency::new(quote).map_err(|_| invalid())?;
        CurrencyPair::new(base, quote)
    }
}
