//! CSV report adapter implementing ReportPort.
//!
//! Writes one row per strategy, in declaration order.

use std::path::Path;

use crate::domain::error::FxError;
use crate::domain::metrics::Metrics;
use crate::domain::run_result::{RunResult, RunResults};
use crate::ports::report_port::ReportPort;

const HEADER: [&str; 16] = [
    "strategy_id",
    "status",
    "windows_processed",
    "executed_trades",
    "skipped_trades",
    "final_balances",
    "final_equity",
    "total_return",
    "annualized_return",
    "volatility",
    "sharpe_ratio",
    "sortino_ratio",
    "max_drawdown",
    "max_drawdown_duration",
    "value_at_risk",
    "error",
];

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn report_error(reason: impl std::fmt::Display) -> FxError {
    FxError::Report {
        reason: reason.to_string(),
    }
}

/// `EUR=900;USD=110`, sorted by currency code.
fn format_balances(result: &RunResult) -> String {
    result
        .final_snapshot
        .balances
        .iter()
        .map(|(currency, value)| format!("{currency}={value}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn format_ratio(value: f64) -> String {
    format!("{value:.6}")
}

fn row(result: &RunResult, metrics: Option<&Metrics>) -> Vec<String> {
    let mut fields = vec![
        result.strategy_id.clone(),
        result.status.to_string(),
        result.windows_processed.to_string(),
    ];
    match metrics {
        Some(m) => {
            fields.push(m.executed_trades.to_string());
            fields.push(m.skipped_trades.to_string());
            fields.push(format_balances(result));
            fields.push(m.final_equity.map(format_ratio).unwrap_or_default());
            for value in [
                m.total_return,
                m.annualized_return,
                m.volatility,
                m.sharpe_ratio,
                m.sortino_ratio,
                m.max_drawdown,
            ] {
                fields.push(format_ratio(value));
            }
            fields.push(m.max_drawdown_duration.to_string());
            fields.push(format_ratio(m.value_at_risk));
        }
        None => {
            fields.push(String::new());
            fields.push(result.trade_failures.len().to_string());
            fields.push(format_balances(result));
            fields.extend(std::iter::repeat_n(String::new(), 9));
        }
    }
    fields.push(
        result
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default(),
    );
    fields
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        results: &RunResults,
        metrics: &[Metrics],
        output_path: &Path,
    ) -> Result<(), FxError> {
        let mut writer = csv::Writer::from_path(output_path).map_err(|e| {
            report_error(format!("failed to create {}: {}", output_path.display(), e))
        })?;
        writer.write_record(HEADER).map_err(report_error)?;
        for result in results {
            let m = metrics.iter().find(|m| m.strategy_id == result.strategy_id);
            writer.write_record(row(result, m)).map_err(report_error)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arithmetic::ArithmeticContext;
    use crate::domain::currency::{Currency, CurrencyPair};
    use crate::domain::engine::{Engine, RunParams};
    use crate::domain::history::PriceHistory;
    use crate::domain::metrics::MetricsConfig;
    use crate::domain::strategy::BuyAndHold;
    use std::fs;
    use tempfile::TempDir;

    fn run() -> (ArithmeticContext, RunResults) {
        let ctx = ArithmeticContext::builder().build().unwrap();
        let pair: CurrencyPair = "EUR/USD".parse().unwrap();
        let prices = ["1.10", "1.12", "1.15", "1.13"]
            .iter()
            .map(|p| vec![ctx.from_literal(p).unwrap()])
            .collect();
        let history = PriceHistory::new(vec![pair.clone()], prices).unwrap();
        let fraction = ctx.from_i64(1).unwrap();
        let engine = Engine::new(ctx.clone())
            .with_strategy(Box::new(BuyAndHold::new("hold", pair, fraction).unwrap()))
            .unwrap();
        let params = RunParams::new(
            Currency::new("USD").unwrap(),
            ctx.from_i64(1000).unwrap(),
        )
        .sequential();
        let results = engine.run(&history, &params).unwrap();
        (ctx, results)
    }

    #[test]
    fn writes_one_row_per_strategy() {
        let (ctx, results) = run();
        let metrics: Vec<Metrics> = results
            .iter()
            .map(|r| Metrics::compute(r, &ctx, &MetricsConfig::default()).unwrap())
            .collect();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        CsvReportAdapter::new().write(&results, &metrics, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("strategy_id,status,windows_processed"));
        assert!(lines[1].starts_with("hold,completed,4,1,0,EUR="), "{}", lines[1]);
    }

    #[test]
    fn rows_without_metrics_leave_columns_blank() {
        let (_ctx, results) = run();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        CsvReportAdapter::new().write(&results, &[], &path).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let record = rdr.records().next().unwrap().unwrap();
        assert_eq!(record.len(), HEADER.len());
        assert_eq!(&record[0], "hold");
        assert_eq!(&record[3], "");
    }

    #[test]
    fn unwritable_path_is_a_report_error() {
        let (_ctx, results) = run();
        let err = CsvReportAdapter::new()
            .write(&results, &[], Path::new("/nonexistent/dir/report.csv"))
            .unwrap_err();
        assert!(matches!(err, FxError::Report { .. }));
    }
}
