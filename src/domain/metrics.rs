//! Performance metrics computed from a [`RunResult`].
//!
//! Ledger statistics (PnL, fees, trade counts) are exact and stay in the run's
//! arithmetic context. Risk statistics work on the mark-to-market equity curve
//! and use `f64`, since they are estimates anyway.

use std::collections::BTreeMap;

use super::account::EntryKind;
use super::arithmetic::{ArithmeticContext, Value};
use super::currency::Currency;
use super::error::ArithmeticError;
use super::run_result::{RunResult, RunStatus};

pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;
pub const DEFAULT_VAR_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    /// Annual rate.
    pub risk_free_rate: f64,
    /// Windows per year, used for annualization.
    pub periods_per_year: f64,
    pub var_confidence: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            risk_free_rate: 0.0,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            var_confidence: DEFAULT_VAR_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub strategy_id: String,
    pub status: RunStatus,
    /// Final balance minus deposits plus withdrawals, per currency.
    pub net_pnl: BTreeMap<Currency, Value>,
    pub fees_paid: BTreeMap<Currency, Value>,
    pub executed_trades: usize,
    pub skipped_trades: usize,
    pub deposits: usize,
    pub withdrawals: usize,
    pub final_equity: Option<f64>,
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    /// Historical return at the `1 - var_confidence` percentile.
    pub value_at_risk: f64,
}

impl Metrics {
    pub fn compute(
        result: &RunResult,
        ctx: &ArithmeticContext,
        config: &MetricsConfig,
    ) -> Result<Self, ArithmeticError> {
        let mut net_pnl: BTreeMap<Currency, Value> = BTreeMap::new();
        let mut fees_paid: BTreeMap<Currency, Value> = BTreeMap::new();
        let mut executed_trades = 0;
        let mut deposits = 0;
        let mut withdrawals = 0;

        for (currency, balance) in &result.final_snapshot.balances {
            net_pnl.insert(currency.clone(), *balance);
        }
        for entry in &result.history {
            match entry.kind {
                EntryKind::Deposit => deposits += 1,
                EntryKind::Withdraw => withdrawals += 1,
                kind if kind.is_trade() => executed_trades += 1,
                _ => {}
            }
            if let Some(fee) = &entry.fee {
                let paid = fees_paid.entry(fee.currency.clone()).or_insert(ctx.zero());
                *paid = ctx.add(*paid, fee.amount)?;
            }
            // External flows are not profit: back them out of the final balance.
            if matches!(entry.kind, EntryKind::Deposit | EntryKind::Withdraw) {
                for posting in &entry.postings {
                    let pnl = net_pnl.entry(posting.currency.clone()).or_insert(ctx.zero());
                    *pnl = ctx.sub(*pnl, posting.delta)?;
                }
            }
        }

        let initial = ctx.to_f64(&result.initial_deposit)?;
        let mut equity = Vec::with_capacity(result.equity_curve.len() + 1);
        equity.push(initial);
        for point in &result.equity_curve {
            equity.push(ctx.to_f64(&point.value)?);
        }
        let final_equity = result.equity_curve.last().map(|p| p.value.to_f64());

        let total_return = match final_equity {
            Some(last) if initial > 0.0 => (last - initial) / initial,
            _ => 0.0,
        };

        let periods = result.equity_curve.len() as f64;
        let years = periods / config.periods_per_year;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let returns = period_returns(&equity);
        let volatility = std_dev(&returns) * config.periods_per_year.sqrt();
        let period_rf = config.risk_free_rate / config.periods_per_year;
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(&returns, period_rf, config.periods_per_year);
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&equity);
        let value_at_risk = historical_var(&returns, config.var_confidence);

        Ok(Metrics {
            strategy_id: result.strategy_id.clone(),
            status: result.status,
            net_pnl,
            fees_paid,
            executed_trades,
            skipped_trades: result.trade_failures.len(),
            deposits,
            withdrawals,
            final_equity,
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            value_at_risk,
        })
    }
}

fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| {
            let prev = w[0];
            let curr = w[1];
            if prev > 0.0 {
                (curr - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

fn compute_drawdown(equity: &[f64]) -> (f64, usize) {
    let Some(&first) = equity.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for &value in equity {
        if value > peak {
            peak = value;
            current_dd_duration = 0;
        } else if peak > 0.0 && value < peak {
            let dd = (peak - value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        } else if value == peak {
            current_dd_duration = 0;
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(returns: &[f64], period_rf: f64, periods_per_year: f64) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let stddev = std_dev(returns);
    let excess_return = mean - period_rf;
    let scale = periods_per_year.sqrt();

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * scale
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * scale
    } else {
        0.0
    };

    (sharpe, sortino)
}

/// Linear-interpolated `1 - confidence` percentile of `returns`.
fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = (1.0 - confidence).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (position - lo as f64)
}
