//! CSV price history adapter.
//!
//! Expected layout, one row per time step:
//!
//! ```text
//! date,EUR/USD,GBP/USD,volume:EUR/USD,volume:GBP/USD
//! 2024-01-15,1.0950,1.2710,1200,800
//! ```
//!
//! The `date` column is optional. Volume columns are optional but, when
//! present, must cover every price column.

use crate::domain::arithmetic::{ArithmeticContext, Value};
use crate::domain::currency::CurrencyPair;
use crate::domain::error::FxError;
use crate::domain::history::PriceHistory;
use crate::ports::history_port::HistoryPort;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::debug;

const VOLUME_PREFIX: &str = "volume:";

pub struct CsvHistoryAdapter {
    path: PathBuf,
}

enum Column {
    Date,
    Price(usize),
    Volume(usize),
}

impl CsvHistoryAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn data_error(&self, reason: impl std::fmt::Display) -> FxError {
        FxError::Data {
            reason: format!("{}: {}", self.path.display(), reason),
        }
    }

    fn layout(&self, headers: &csv::StringRecord) -> Result<(Vec<CurrencyPair>, Vec<Column>), FxError> {
        let mut pairs: Vec<CurrencyPair> = Vec::new();
        let mut volume_pairs: Vec<CurrencyPair> = Vec::new();
        let mut raw: Vec<(bool, CurrencyPair)> = Vec::new();
        let mut has_date = false;

        for (i, header) in headers.iter().enumerate() {
            let header = header.trim();
            if header.eq_ignore_ascii_case("date") {
                if i != 0 {
                    return Err(self.data_error("date must be the first column"));
                }
                has_date = true;
                continue;
            }
            let (is_volume, name) = match header
                .get(..VOLUME_PREFIX.len())
                .filter(|p| p.eq_ignore_ascii_case(VOLUME_PREFIX))
            {
                Some(_) => (true, &header[VOLUME_PREFIX.len()..]),
                None => (false, header),
            };
            let pair: CurrencyPair = name
                .parse()
                .map_err(|_| self.data_error(format!("invalid currency pair column {header:?}")))?;
            if is_volume {
                volume_pairs.push(pair.clone());
            } else {
                pairs.push(pair.clone());
            }
            raw.push((is_volume, pair));
        }

        if pairs.is_empty() {
            return Err(self.data_error("no currency pair columns"));
        }
        if !volume_pairs.is_empty()
            && (volume_pairs.len() != pairs.len() || pairs.iter().any(|p| !volume_pairs.contains(p)))
        {
            return Err(self.data_error("volume columns must cover every currency pair"));
        }

        let mut columns = Vec::with_capacity(headers.len());
        if has_date {
            columns.push(Column::Date);
        }
        for (is_volume, pair) in raw {
            let slot = pairs
                .iter()
                .position(|p| *p == pair)
                .ok_or_else(|| self.data_error(format!("unknown pair {pair}")))?;
            columns.push(if is_volume {
                Column::Volume(slot)
            } else {
                Column::Price(slot)
            });
        }
        Ok((pairs, columns))
    }
}

impl HistoryPort for CsvHistoryAdapter {
    fn load(&self, ctx: &ArithmeticContext) -> Result<PriceHistory, FxError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| self.data_error(format!("failed to open: {}", e)))?;

        let headers = rdr
            .headers()
            .map_err(|e| self.data_error(format!("CSV header error: {}", e)))?
            .clone();
        let (pairs, columns) = self.layout(&headers)?;
        let has_date = matches!(columns.first(), Some(Column::Date));
        let has_volume = columns.iter().any(|c| matches!(c, Column::Volume(_)));

        let mut prices: Vec<Vec<Value>> = Vec::new();
        let mut volumes: Vec<Vec<Value>> = Vec::new();
        let mut dates: Vec<NaiveDate> = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record =
                result.map_err(|e| self.data_error(format!("CSV parse error: {}", e)))?;
            if record.len() != columns.len() {
                return Err(self.data_error(format!(
                    "row {} has {} fields, expected {}",
                    row + 1,
                    record.len(),
                    columns.len()
                )));
            }

            let mut price_row = vec![ctx.zero(); pairs.len()];
            let mut volume_row = vec![ctx.zero(); if has_volume { pairs.len() } else { 0 }];
            for (field, column) in record.iter().zip(&columns) {
                match column {
                    Column::Date => {
                        let date = NaiveDate::parse_from_str(field, "%Y-%m-%d").map_err(|e| {
                            self.data_error(format!("row {}: invalid date {field:?}: {}", row + 1, e))
                        })?;
                        dates.push(date);
                    }
                    Column::Price(slot) | Column::Volume(slot) => {
                        let value = ctx.from_literal(field).map_err(|e| {
                            self.data_error(format!("row {}: invalid value {field:?}: {}", row + 1, e))
                        })?;
                        if matches!(column, Column::Price(_)) {
                            price_row[*slot] = value;
                        } else {
                            volume_row[*slot] = value;
                        }
                    }
                }
            }
            prices.push(price_row);
            if has_volume {
                volumes.push(volume_row);
            }
        }

        if prices.is_empty() {
            return Err(self.data_error("no data rows"));
        }
        if has_date && dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(self.data_error("dates must be strictly increasing"));
        }

        debug!(
            "loaded {} rows for {} pairs from {}",
            prices.len(),
            pairs.len(),
            self.path.display()
        );

        let mut history = PriceHistory::new(pairs, prices).map_err(|e| self.data_error(e))?;
        if has_volume {
            history = history.with_volumes(volumes).map_err(|e| self.data_error(e))?;
        }
        if has_date {
            history = history.with_dates(dates).map_err(|e| self.data_error(e))?;
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arithmetic::Backend;
    use std::fs;
    use tempfile::TempDir;

    fn ctx() -> ArithmeticContext {
        ArithmeticContext::builder().build().unwrap()
    }

    fn write_csv(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rates.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn load_returns_prices_dates_and_volumes() {
        let (_dir, path) = write_csv(
            "date,EUR/USD,GBP_USD,volume:EUR/USD,volume:GBP_USD\n\
             2024-01-15,1.0950,1.2710,1200,800\n\
             2024-01-16,1.0962,1.2695,1300,900\n\
             2024-01-17,1.0971,1.2702,1100,700\n",
        );
        let ctx = ctx();
        let history = CsvHistoryAdapter::new(path).load(&ctx).unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(history.pairs().len(), 2);
        assert_eq!(history.pairs()[1].to_string(), "GBP/USD");
        assert_eq!(history.prices()[0][0].to_f64(), 1.095);
        assert_eq!(history.prices()[2][1].to_f64(), 1.2702);
        assert_eq!(history.volumes().unwrap()[1][1].to_f64(), 900.0);
        assert_eq!(
            history.dates().unwrap()[0],
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        history.check_context(&ctx).unwrap();
    }

    #[test]
    fn date_column_is_optional() {
        let (_dir, path) = write_csv("EURUSD\n1.1\n1.2\n");
        let history = CsvHistoryAdapter::new(path).load(&ctx()).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.dates().is_none());
        assert!(history.volumes().is_none());
    }

    #[test]
    fn volume_columns_may_be_reordered() {
        let (_dir, path) =
            write_csv("EUR/USD,GBP/USD,volume:GBP/USD,volume:EUR/USD\n1.1,1.3,5,7\n");
        let history = CsvHistoryAdapter::new(path).load(&ctx()).unwrap();
        let volumes = history.volumes().unwrap();
        assert_eq!(volumes[0][0].to_f64(), 7.0);
        assert_eq!(volumes[0][1].to_f64(), 5.0);
    }

    #[test]
    fn values_use_the_given_backend() {
        let (_dir, path) = write_csv("EUR/USD\n1.1\n");
        let ctx = ArithmeticContext::builder()
            .backend(Backend::FastDecimal)
            .precision(18)
            .build()
            .unwrap();
        let history = CsvHistoryAdapter::new(path).load(&ctx).unwrap();
        assert_eq!(history.prices()[0][0].backend(), Backend::FastDecimal);
    }

    #[test]
    fn missing_file_is_a_data_error() {
        let err = CsvHistoryAdapter::new("/nonexistent/rates.csv")
            .load(&ctx())
            .unwrap_err();
        assert!(matches!(err, FxError::Data { .. }));
    }

    #[test]
    fn invalid_price_is_rejected() {
        let (_dir, path) = write_csv("EUR/USD\n1.1\nabc\n");
        let err = CsvHistoryAdapter::new(path).load(&ctx()).unwrap_err();
        assert!(err.to_string().contains("row 2"), "{err}");
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let (_dir, path) = write_csv("EUR/USD\n1.1\n0\n");
        let err = CsvHistoryAdapter::new(path).load(&ctx()).unwrap_err();
        assert!(matches!(err, FxError::Data { .. }));
    }

    #[test]
    fn invalid_pair_header_is_rejected() {
        let (_dir, path) = write_csv("EUR/EUR\n1.1\n");
        assert!(CsvHistoryAdapter::new(path).load(&ctx()).is_err());
    }

    #[test]
    fn partial_volume_columns_are_rejected() {
        let (_dir, path) = write_csv("EUR/USD,GBP/USD,volume:EUR/USD\n1.1,1.3,5\n");
        let err = CsvHistoryAdapter::new(path).load(&ctx()).unwrap_err();
        assert!(err.to_string().contains("volume"), "{err}");
    }

    #[test]
    fn unordered_dates_are_rejected() {
        let (_dir, path) = write_csv("date,EUR/USD\n2024-01-02,1.1\n2024-01-01,1.2\n");
        let err = CsvHistoryAdapter::new(path).load(&ctx()).unwrap_err();
        assert!(err.to_string().contains("increasing"), "{err}");
    }

    #[test]
    fn invalid_date_is_rejected() {
        let (_dir, path) = write_csv("date,EUR/USD\n01/02/2024,1.1\n");
        assert!(CsvHistoryAdapter::new(path).load(&ctx()).is_err());
    }

    #[test]
    fn header_only_file_is_rejected() {
        let (_dir, path) = write_csv("date,EUR/USD\n");
        let err = CsvHistoryAdapter::new(path).load(&ctx()).unwrap_err();
        assert!(err.to_string().contains("no data rows"), "{err}");
    }
}
