//! Exchange rate lookup used for mark-to-market valuation.

use std::collections::BTreeMap;

use super::arithmetic::{ArithmeticContext, Value};
use super::currency::{Currency, CurrencyPair};
use super::error::AccountError;

/// Rates keyed by `(base, quote)`; a rate is quote units per base unit.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: BTreeMap<(Currency, Currency), Value>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the rate for `pair`. Rates must be strictly positive.
    pub fn insert(&mut self, pair: &CurrencyPair, rate: Value) -> Result<(), AccountError> {
        if !rate.is_positive() {
            return Err(AccountError::InvalidAmount {
                reason: format!("rate for {pair} must be positive, got {rate}"),
            });
        }
        self.rates
            .insert((pair.base.clone(), pair.quote.clone()), rate);
        Ok(())
    }

    pub fn get(&self, pair: &CurrencyPair) -> Option<&Value> {
        self.rates.get(&(pair.base.clone(), pair.quote.clone()))
    }

    /// Entries in `(base, quote)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Currency, &Value)> {
        self.rates.iter().map(|((base, quote), rate)| (base, quote, rate))
    }

    /// Overwrite this table's entries with those of `other`.
    pub fn merge(&mut self, other: &RateTable) {
        self.rates
            .extend(other.rates.iter().map(|(key, rate)| (key.clone(), *rate)));
    }

    /// Price of one `pair.base` in `pair.quote`, direct or inverted.
    pub fn rate(&self, ctx: &ArithmeticContext, pair: &CurrencyPair) -> Result<Value, AccountError> {
        self.convert(ctx, ctx.from_i64(1)?, &pair.base, &pair.quote)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Express `amount` of `from` in `to`. A direct `from/to` quote is
    /// multiplied; an inverse `to/from` quote is divided.
    pub fn convert(
        &self,
        ctx: &ArithmeticContext,
        amount: Value,
        from: &Currency,
        to: &Currency,
    ) -> Result<Value, AccountError> {
        ctx.check(&amount)?;
        if from == to {
            return Ok(amount);
        }
        if let Some(rate) = self.rates.get(&(from.clone(), to.clone())) {
            return Ok(ctx.mul(amount, *rate)?);
        }
        if let Some(rate) = self.rates.get(&(to.clone(), from.clone())) {
            return Ok(ctx.div(amount, *rate)?);
        }
        Err(AccountError::MissingRate {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arithmetic::{Backend, RoundingMode};

    fn ctx() -> ArithmeticContext {
        ArithmeticContext::configure(Backend::Decimal, 28, 4, RoundingMode::HalfEven).unwrap()
    }

    fn cur(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    fn table(ctx: &ArithmeticContext) -> RateTable {
        let mut rates = RateTable::new();
        rates
            .insert(&"EUR/USD".parse().unwrap(), ctx.from_literal("1.25").unwrap())
            .unwrap();
        rates
    }

    #[test]
    fn same_currency_is_identity() {
        let ctx = ctx();
        let amount = ctx.from_literal("42").unwrap();
        let out = table(&ctx)
            .convert(&ctx, amount, &cur("EUR"), &cur("EUR"))
            .unwrap();
        assert_eq!(out, amount);
    }

    #[test]
    fn direct_rate_multiplies() {
        let ctx = ctx();
        let out = table(&ctx)
            .convert(&ctx, ctx.from_literal("100").unwrap(), &cur("EUR"), &cur("USD"))
            .unwrap();
        assert_eq!(out.to_string(), "125.00");
    }

    #[test]
    fn inverse_rate_divides() {
        let ctx = ctx();
        let out = table(&ctx)
            .convert(&ctx, ctx.from_literal("125").unwrap(), &cur("USD"), &cur("EUR"))
            .unwrap();
        assert_eq!(out.to_f64(), 100.0);
    }

    #[test]
    fn missing_rate_is_reported() {
        let ctx = ctx();
        let err = table(&ctx)
            .convert(&ctx, ctx.from_literal("1").unwrap(), &cur("GBP"), &cur("USD"))
            .unwrap_err();
        assert_eq!(
            err,
            AccountError::MissingRate {
                from: "GBP".into(),
                to: "USD".into()
            }
        );
    }

    #[test]
    fn rate_reads_either_direction() {
        let ctx = ctx();
        let rates = table(&ctx);
        let direct = rates.rate(&ctx, &"EUR/USD".parse().unwrap()).unwrap();
        let inverse = rates.rate(&ctx, &"USD/EUR".parse().unwrap()).unwrap();
        assert_eq!(direct.to_f64(), 1.25);
        assert_eq!(inverse.to_f64(), 0.8);
        assert!(rates.rate(&ctx, &"GBP/USD".parse().unwrap()).is_err());
    }

    #[test]
    fn merge_overwrites_and_extends() {
        let ctx = ctx();
        let mut rates = table(&ctx);
        let mut newer = RateTable::new();
        newer
            .insert(&"EUR/USD".parse().unwrap(), ctx.from_literal("1.3").unwrap())
            .unwrap();
        newer
            .insert(&"GBP/USD".parse().unwrap(), ctx.from_literal("1.5").unwrap())
            .unwrap();
        rates.merge(&newer);
        assert_eq!(rates.len(), 2);
        let codes: Vec<String> = rates.iter().map(|(b, q, r)| format!("{b}/{q}={r}")).collect();
        assert_eq!(codes, vec!["EUR/USD=1.3", "GBP/USD=1.5"]);
    }

    #[test]
    fn non_positive_rate_rejected() {
        let ctx = ctx();
        let mut rates = RateTable::new();
        let pair: CurrencyPair = "EUR/USD".parse().unwrap();
        assert!(rates.insert(&pair, ctx.zero()).is_err());
        assert!(rates.insert(&pair, ctx.from_literal("-1").unwrap()).is_err());
        assert!(rates.is_empty());
    }
}
