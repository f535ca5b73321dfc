//! In-memory price and volume series indexed by time step.

use chrono::NaiveDate;

use super::arithmetic::{ArithmeticContext, Value};
use super::currency::CurrencyPair;
use super::error::{AccountError, ArithmeticError, EngineError};
use super::rates::RateTable;

/// One row per time step, one column per currency pair. Rows of the optional
/// volume series line up with the price rows.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pairs: Vec<CurrencyPair>,
    prices: Vec<Vec<Value>>,
    volumes: Option<Vec<Vec<Value>>>,
    dates: Option<Vec<NaiveDate>>,
}

fn invalid(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidParameter {
        reason: reason.into(),
    }
}

impl PriceHistory {
    pub fn new(pairs: Vec<CurrencyPair>, prices: Vec<Vec<Value>>) -> Result<Self, EngineError> {
        if pairs.is_empty() {
            return Err(invalid("price history needs at least one currency pair"));
        }
        for (i, pair) in pairs.iter().enumerate() {
            if pairs[..i].contains(pair) {
                return Err(invalid(format!("currency pair {pair} listed twice")));
            }
        }
        for (step, row) in prices.iter().enumerate() {
            if row.len() != pairs.len() {
                return Err(invalid(format!(
                    "price row {step} has {} values, expected {}",
                    row.len(),
                    pairs.len()
                )));
            }
            if let Some((col, price)) = row.iter().enumerate().find(|(_, p)| !p.is_positive()) {
                return Err(invalid(format!(
                    "price of {} at step {step} must be positive, got {price}",
                    pairs[col]
                )));
            }
        }
        Ok(PriceHistory {
            pairs,
            prices,
            volumes: None,
            dates: None,
        })
    }

    pub fn with_volumes(mut self, volumes: Vec<Vec<Value>>) -> Result<Self, EngineError> {
        if volumes.len() != self.prices.len() {
            return Err(invalid(format!(
                "volume series has {} rows, price series has {}",
                volumes.len(),
                self.prices.len()
            )));
        }
        if let Some(step) = volumes.iter().position(|row| row.len() != self.pairs.len()) {
            return Err(invalid(format!("volume row {step} does not match the pair count")));
        }
        if volumes.iter().flatten().any(|v| v.is_negative()) {
            return Err(invalid("volumes must not be negative"));
        }
        self.volumes = Some(volumes);
        Ok(self)
    }

    pub fn with_dates(mut self, dates: Vec<NaiveDate>) -> Result<Self, EngineError> {
        if dates.len() != self.prices.len() {
            return Err(invalid(format!(
                "{} dates for {} price rows",
                dates.len(),
                self.prices.len()
            )));
        }
        self.dates = Some(dates);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn pairs(&self) -> &[CurrencyPair] {
        &self.pairs
    }

    pub fn prices(&self) -> &[Vec<Value>] {
        &self.prices
    }

    pub fn volumes(&self) -> Option<&[Vec<Value>]> {
        self.volumes.as_deref()
    }

    pub fn dates(&self) -> Option<&[NaiveDate]> {
        self.dates.as_deref()
    }

    /// Every price and volume must belong to `ctx`.
    pub fn check_context(&self, ctx: &ArithmeticContext) -> Result<(), ArithmeticError> {
        let volumes = self.volumes.iter().flatten().flatten();
        for value in self.prices.iter().flatten().chain(volumes) {
            ctx.check(value)?;
        }
        Ok(())
    }

    /// View of rows `[start, end)`. Callers pass bounds already validated by
    /// a [`super::window::WindowPlan`].
    pub fn window(&self, index: usize, start: usize, end: usize) -> HistoryWindow<'_> {
        HistoryWindow {
            index,
            start,
            pairs: &self.pairs,
            prices: &self.prices[start..end],
            volumes: self.volumes.as_deref().map(|v| &v[start..end]),
            dates: self.dates.as_deref().map(|d| &d[start..end]),
        }
    }
}

/// Read-only slice of a [`PriceHistory`] handed to a strategy.
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow<'a> {
    /// Ordinal of this window within the run, starting at zero.
    pub index: usize,
    /// Absolute time step of the first row.
    pub start: usize,
    pairs: &'a [CurrencyPair],
    prices: &'a [Vec<Value>],
    volumes: Option<&'a [Vec<Value>]>,
    dates: Option<&'a [NaiveDate]>,
}

impl<'a> HistoryWindow<'a> {
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Absolute time step one past the last row.
    pub fn end(&self) -> usize {
        self.start + self.prices.len()
    }

    pub fn pairs(&self) -> &'a [CurrencyPair] {
        self.pairs
    }

    pub fn prices(&self) -> &'a [Vec<Value>] {
        self.prices
    }

    pub fn volumes(&self) -> Option<&'a [Vec<Value>]> {
        self.volumes
    }

    pub fn dates(&self) -> Option<&'a [NaiveDate]> {
        self.dates
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.and_then(|d| d.last().copied())
    }

    pub fn pair_index(&self, pair: &CurrencyPair) -> Option<usize> {
        self.pairs.iter().position(|p| p == pair)
    }

    /// Prices of `pair` in time order.
    pub fn series(&self, pair: &CurrencyPair) -> Option<Vec<Value>> {
        let col = self.pair_index(pair)?;
        Some(self.prices.iter().map(|row| row[col]).collect())
    }

    pub fn volume_series(&self, pair: &CurrencyPair) -> Option<Vec<Value>> {
        let col = self.pair_index(pair)?;
        Some(self.volumes?.iter().map(|row| row[col]).collect())
    }

    /// Most recent price of `pair`.
    pub fn latest(&self, pair: &CurrencyPair) -> Option<Value> {
        let col = self.pair_index(pair)?;
        self.prices.last().map(|row| row[col])
    }

    /// Rate table built from the last row of the window.
    pub fn rates(&self) -> Result<RateTable, AccountError> {
        let mut table = RateTable::new();
        if let Some(row) = self.prices.last() {
            for (pair, price) in self.pairs.iter().zip(row) {
                table.insert(pair, *price)?;
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arithmetic::{Backend, RoundingMode};

    fn ctx() -> ArithmeticContext {
        ArithmeticContext::configure(Backend::Decimal, 28, 8, RoundingMode::HalfEven).unwrap()
    }

    fn history(ctx: &ArithmeticContext, rows: &[&[&str]]) -> Result<PriceHistory, EngineError> {
        let pairs = vec!["EUR/USD".parse().unwrap(), "GBP/USD".parse().unwrap()];
        let prices = rows
            .iter()
            .map(|row| row.iter().map(|s| ctx.from_literal(s).unwrap()).collect())
            .collect();
        PriceHistory::new(pairs, prices)
    }

    #[test]
    fn rejects_ragged_rows() {
        let ctx = ctx();
        let err = history(&ctx, &[&["1.1", "1.3"], &["1.2"]]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[test]
    fn rejects_non_positive_prices() {
        let ctx = ctx();
        assert!(history(&ctx, &[&["1.1", "0"]]).is_err());
        assert!(history(&ctx, &[&["-1.1", "1"]]).is_err());
    }

    #[test]
    fn rejects_duplicate_pairs() {
        let pair: CurrencyPair = "EUR/USD".parse().unwrap();
        let err = PriceHistory::new(vec![pair.clone(), pair], vec![]).unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn window_slices_rows() {
        let ctx = ctx();
        let h = history(&ctx, &[&["1.1", "1.3"], &["1.2", "1.4"], &["1.3", "1.5"]]).unwrap();
        let w = h.window(0, 1, 3);
        assert_eq!(w.len(), 2);
        assert_eq!(w.end(), 3);
        let eur: CurrencyPair = "EUR/USD".parse().unwrap();
        let series: Vec<String> = w.series(&eur).unwrap().iter().map(|v| v.to_string()).collect();
        assert_eq!(series, vec!["1.2", "1.3"]);
        assert_eq!(w.latest(&eur).unwrap().to_string(), "1.3");
        assert!(w.volumes().is_none());
    }

    #[test]
    fn volumes_must_line_up() {
        let ctx = ctx();
        let h = history(&ctx, &[&["1.1", "1.3"], &["1.2", "1.4"]]).unwrap();
        let one = ctx.from_i64(1).unwrap();
        assert!(h.clone().with_volumes(vec![vec![one, one]]).is_err());
        let h = h.with_volumes(vec![vec![one, one], vec![one, one]]).unwrap();
        let w = h.window(0, 0, 2);
        let eur: CurrencyPair = "EUR/USD".parse().unwrap();
        assert_eq!(w.volume_series(&eur).unwrap().len(), 2);
    }

    #[test]
    fn rates_from_last_row() {
        let ctx = ctx();
        let h = history(&ctx, &[&["1.1", "1.3"], &["1.25", "1.5"]]).unwrap();
        let rates = h.window(0, 0, 2).rates().unwrap();
        assert_eq!(rates.len(), 2);
        let eur: CurrencyPair = "EUR/USD".parse().unwrap();
        assert_eq!(rates.get(&eur).unwrap().to_string(), "1.25");
    }

    #[test]
    fn context_check_detects_foreign_values() {
        let ctx = ctx();
        let other = ArithmeticContext::builder().build().unwrap();
        let h = history(&ctx, &[&["1.1", "1.3"]]).unwrap();
        assert!(h.check_context(&ctx).is_ok());
        assert!(h.check_context(&other).is_err());
    }

    #[test]
    fn dates_length_checked() {
        let ctx = ctx();
        let h = history(&ctx, &[&["1.1", "1.3"]]).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(h.clone().with_dates(vec![day, day]).is_err());
        let h = h.with_dates(vec![day]).unwrap();
        assert_eq!(h.window(0, 0, 1).last_date(), Some(day));
    }
}
