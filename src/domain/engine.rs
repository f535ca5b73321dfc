//! Backtest engine: replays a price history through a sliding window for
//! every registered strategy.
//!
//! Each strategy gets its own [`Account`], seeded with one deposit in the base
//! currency, and its windows are processed strictly in order. Independent
//! strategies are spread over a fixed-size rayon pool; results always come
//! back in registration order.
//!
//! Per window the account clock is set to the window index, the window's
//! closing rates are handed to the account, due delayed intents and open
//! orders are settled, and only then is the strategy asked to decide.
//!
//! Failure handling:
//! - invalid parameters abort `run` before any strategy starts;
//! - a rejected intent, delayed intent or fired order is recorded as a
//!   [`TradeFailure`] and skipped;
//! - a decision function that errors or panics ends that strategy with
//!   [`RunStatus::StrategyFailed`], leaving the others untouched.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::account::{Account, BuyConvention, FeeSchedule};
use super::arithmetic::{ArithmeticContext, Value};
use super::currency::Currency;
use super::error::{EngineError, StrategyExecutionError};
use super::history::PriceHistory;
use super::run_result::{EquityPoint, RunResult, RunResults, RunStatus, TradeFailure};
use super::strategy::{DecisionInput, Strategy};
use super::window::WindowPlan;

/// Shared stop flag. Strategies not yet started when it fires are left out of
/// the results; running ones stop between windows and report
/// [`RunStatus::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunParams {
    pub base_currency: Currency,
    pub initial_deposit: Value,
    pub start_index: usize,
    /// Defaults to the history length.
    pub end_index: Option<usize>,
    pub window_size: usize,
    pub step_size: usize,
    pub parallel: bool,
    /// Worker count; defaults to the number of CPUs.
    pub n_jobs: Option<usize>,
    pub buy_convention: BuyConvention,
    pub fees: FeeSchedule,
}

impl RunParams {
    pub fn new(base_currency: Currency, initial_deposit: Value) -> Self {
        RunParams {
            base_currency,
            initial_deposit,
            start_index: 0,
            end_index: None,
            window_size: 1,
            step_size: 1,
            parallel: true,
            n_jobs: None,
            buy_convention: BuyConvention::default(),
            fees: FeeSchedule::none(),
        }
    }

    pub fn range(mut self, start_index: usize, end_index: usize) -> Self {
        self.start_index = start_index;
        self.end_index = Some(end_index);
        self
    }

    pub fn window(mut self, window_size: usize, step_size: usize) -> Self {
        self.window_size = window_size;
        self.step_size = step_size;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn jobs(mut self, n_jobs: usize) -> Self {
        self.parallel = true;
        self.n_jobs = Some(n_jobs);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.n_jobs.unwrap_or_else(num_cpus::get).max(1)
    }
}

pub struct Engine {
    ctx: ArithmeticContext,
    strategies: Vec<Box<dyn Strategy>>,
}

impl Engine {
    pub fn new(ctx: ArithmeticContext) -> Self {
        Engine {
            ctx,
            strategies: Vec::new(),
        }
    }

    pub fn context(&self) -> &ArithmeticContext {
        &self.ctx
    }

    pub fn strategy_ids(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|s| s.id())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) -> Result<(), EngineError> {
        if self.strategies.iter().any(|s| s.id() == strategy.id()) {
            return Err(EngineError::DuplicateStrategy {
                id: strategy.id().to_string(),
            });
        }
        self.strategies.push(strategy);
        Ok(())
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Result<Self, EngineError> {
        self.add_strategy(strategy)?;
        Ok(self)
    }

    pub fn run(&self, history: &PriceHistory, params: &RunParams) -> Result<RunResults, EngineError> {
        self.run_with_cancel(history, params, &CancellationToken::new())
    }

    pub fn run_with_cancel(
        &self,
        history: &PriceHistory,
        params: &RunParams,
        cancel: &CancellationToken,
    ) -> Result<RunResults, EngineError> {
        let plan = self.validate(history, params)?;
        let started = Instant::now();
        info!(
            "Starting run: {} strategies, {} windows, backend {}",
            self.strategies.len(),
            plan.len(),
            self.ctx.backend()
        );

        let outcomes: Vec<Option<RunResult>> = if params.parallel {
            let workers = params.worker_count();
            debug!("Running on {} workers", workers);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| EngineError::ThreadPool {
                    reason: e.to_string(),
                })?;
            pool.install(|| {
                self.strategies
                    .par_iter()
                    .map(|s| self.simulate(s.as_ref(), history, &plan, params, cancel))
                    .collect()
            })
        } else {
            self.strategies
                .iter()
                .map(|s| self.simulate(s.as_ref(), history, &plan, params, cancel))
                .collect()
        };

        let results: Vec<RunResult> = outcomes.into_iter().flatten().collect();
        if results.len() < self.strategies.len() {
            warn!(
                "Run cancelled: {} of {} strategies never started",
                self.strategies.len() - results.len(),
                self.strategies.len()
            );
        }
        info!(
            "Run finished in {:.2?}: {} results, {} failed",
            started.elapsed(),
            results.len(),
            results.iter().filter(|r| r.is_failed()).count()
        );
        Ok(RunResults::new(results))
    }

    fn validate(&self, history: &PriceHistory, params: &RunParams) -> Result<WindowPlan, EngineError> {
        if self.strategies.is_empty() {
            return Err(EngineError::NoStrategies);
        }
        let mut seen = HashSet::new();
        for id in self.strategy_ids() {
            if !seen.insert(id) {
                return Err(EngineError::DuplicateStrategy { id: id.to_string() });
            }
        }
        let end_index = params.end_index.unwrap_or(history.len());
        let plan = WindowPlan::new(
            history.len(),
            params.start_index,
            end_index,
            params.window_size,
            params.step_size,
        )?;
        if params.n_jobs == Some(0) {
            return Err(EngineError::InvalidParameter {
                reason: "n_jobs must be at least 1".to_string(),
            });
        }
        self.ctx.check(&params.initial_deposit)?;
        if !params.initial_deposit.is_positive() {
            return Err(EngineError::InvalidParameter {
                reason: format!(
                    "initial deposit must be positive, got {}",
                    params.initial_deposit
                ),
            });
        }
        params.fees.check_context(&self.ctx)?;
        history.check_context(&self.ctx)?;
        Ok(plan)
    }

    fn simulate(
        &self,
        strategy: &dyn Strategy,
        history: &PriceHistory,
        plan: &WindowPlan,
        params: &RunParams,
        cancel: &CancellationToken,
    ) -> Option<RunResult> {
        if cancel.is_cancelled() {
            return None;
        }
        let id = strategy.id();
        debug!("Strategy {} started", id);

        let mut account = Account::new(id, self.ctx.clone())
            .with_fees(params.fees)
            .with_buy_convention(params.buy_convention);
        let mut trade_failures = Vec::new();
        let mut equity_curve = Vec::new();
        let mut windows_processed = 0;
        let mut status = RunStatus::Completed;
        let mut error = None;

        if let Err(e) = account.deposit(params.initial_deposit, &params.base_currency) {
            status = RunStatus::StrategyFailed;
            error = Some(StrategyExecutionError {
                window: 0,
                message: format!("initial deposit failed: {e}"),
                panicked: false,
            });
        }

        for window in plan.iter() {
            if status != RunStatus::Completed {
                break;
            }
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                warn!("Strategy {} cancelled before window {}", id, window.index);
                break;
            }
            account.set_clock(window.index as u64);
            let view = history.window(window.index, window.start, window.end);
            let rates = view.rates();
            match &rates {
                Ok(table) => {
                    if let Err(e) = account.update_exchange_rates(table) {
                        debug!("Strategy {} window {}: rates ignored: {}", id, window.index, e);
                    }
                }
                Err(e) => debug!("Strategy {} window {}: no rates: {}", id, window.index, e),
            }
            for event in account.settle() {
                debug!("Strategy {} window {}: {}", id, window.index, event);
                if let Some((intent, error)) = event.failure() {
                    trade_failures.push(TradeFailure {
                        window: window.index,
                        step: window.end - 1,
                        intent,
                        error,
                    });
                }
            }
            let input = DecisionInput {
                window: view,
                account: &account,
                ctx: &self.ctx,
            };

            let decision = panic::catch_unwind(AssertUnwindSafe(|| strategy.decide(&input)));
            let intents = match decision {
                Ok(Ok(intents)) => intents,
                Ok(Err(e)) => {
                    status = RunStatus::StrategyFailed;
                    error = Some(StrategyExecutionError {
                        window: window.index,
                        message: e.to_string(),
                        panicked: false,
                    });
                    break;
                }
                Err(payload) => {
                    status = RunStatus::StrategyFailed;
                    error = Some(StrategyExecutionError {
                        window: window.index,
                        message: panic_message(payload.as_ref()),
                        panicked: true,
                    });
                    break;
                }
            };

            for intent in intents {
                if let Err(e) = intent.apply(&mut account) {
                    debug!("Strategy {} window {}: skipped {}: {}", id, window.index, intent, e);
                    trade_failures.push(TradeFailure {
                        window: window.index,
                        step: window.end - 1,
                        intent,
                        error: e,
                    });
                }
            }

            let valued =
                rates.and_then(|rates| account.total_balance(&rates, &params.base_currency));
            match valued {
                Ok(value) => equity_curve.push(EquityPoint {
                    window: window.index,
                    step: window.end - 1,
                    value,
                }),
                Err(e) => debug!("Strategy {} window {}: not valued: {}", id, window.index, e),
            }
            windows_processed += 1;
        }

        if let Some(e) = &error {
            warn!("Strategy {} failed: {}", id, e);
        } else {
            debug!(
                "Strategy {} finished: {} windows, {} skipped intents",
                id,
                windows_processed,
                trade_failures.len()
            );
        }

        Some(RunResult {
            strategy_id: id.to_string(),
            status,
            base_currency: params.base_currency.clone(),
            initial_deposit: params.initial_deposit,
            final_snapshot: account.snapshot(),
            history: account.history().to_vec(),
            trade_failures,
            equity_curve,
            windows_processed,
            error,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}
