//! Per-strategy outcome of an engine run.

use std::fmt;

use super::account::{AccountSnapshot, LedgerEntry};
use super::arithmetic::{ArithmeticContext, Value};
use super::currency::Currency;
use super::error::{AccountError, StrategyExecutionError};
use super::strategy::TradeIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    StrategyFailed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::StrategyFailed => "strategy_failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intent the account rejected; the simulation carried on without it.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFailure {
    pub window: usize,
    pub step: usize,
    pub intent: TradeIntent,
    pub error: AccountError,
}

/// Mark-to-market value of the account after a window, in the base currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub window: usize,
    pub step: usize,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub strategy_id: String,
    pub status: RunStatus,
    pub base_currency: Currency,
    pub initial_deposit: Value,
    pub final_snapshot: AccountSnapshot,
    pub history: Vec<LedgerEntry>,
    pub trade_failures: Vec<TradeFailure>,
    pub equity_curve: Vec<EquityPoint>,
    pub windows_processed: usize,
    pub error: Option<StrategyExecutionError>,
}

impl RunResult {
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::StrategyFailed
    }

    pub fn final_balance(&self, ctx: &ArithmeticContext, currency: &Currency) -> Value {
        self.final_snapshot
            .balance(currency)
            .copied()
            .unwrap_or_else(|| ctx.zero())
    }
}

/// Results in strategy declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResults {
    results: Vec<RunResult>,
}

impl RunResults {
    pub fn new(results: Vec<RunResult>) -> Self {
        Self { results }
    }

    pub fn get(&self, strategy_id: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.strategy_id == strategy_id)
    }

    pub fn contains(&self, strategy_id: &str) -> bool {
        self.get(strategy_id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.strategy_id.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RunResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn into_vec(self) -> Vec<RunResult> {
        self.results
    }
}

impl<'a> IntoIterator for &'a RunResults {
    type Item = &'a RunResult;
    type IntoIter = std::slice::Iter<'a, RunResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl IntoIterator for RunResults {
    type Item = RunResult;
    type IntoIter = std::vec::IntoIter<RunResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
