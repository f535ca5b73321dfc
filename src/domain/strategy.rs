//! Strategy contract, trade intents and the built-in strategies.
//!
//! A strategy is an immutable parameter set plus a decision function. Given a
//! window of history and a read-only view of its account, it returns the
//! intents to apply, in order. Strategies never mutate shared state, so one
//! instance can be driven from any worker thread.

use std::fmt;

use super::account::Account;
use super::arithmetic::{ArithmeticContext, Value};
use super::currency::{Currency, CurrencyPair};
use super::error::{AccountError, StrategyError};
use super::history::HistoryWindow;
use super::orders::{OrderId, OrderKind, OrderRequest, Trail};

/// Everything a decision function may look at.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub window: HistoryWindow<'a>,
    pub account: &'a Account,
    pub ctx: &'a ArithmeticContext,
}

pub trait Strategy: Send + Sync {
    /// Unique within one engine.
    fn id(&self) -> &str;

    fn decide(&self, input: &DecisionInput<'_>) -> Result<Vec<TradeIntent>, StrategyError>;
}

/// A requested ledger operation, applied by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeIntent {
    Deposit {
        amount: Value,
        currency: Currency,
    },
    Withdraw {
        amount: Value,
        currency: Currency,
    },
    Sell {
        amount: Value,
        rate: Value,
        from: Currency,
        to: Currency,
    },
    Buy {
        amount: Value,
        rate: Value,
        from: Currency,
        to: Currency,
    },
    /// Apply `intent` after `delay` ticks.
    Delayed {
        intent: Box<TradeIntent>,
        delay: u64,
    },
    PlaceOrder(OrderRequest),
    CancelOrder(OrderId),
}

impl TradeIntent {
    pub fn apply(&self, account: &mut Account) -> Result<(), AccountError> {
        match self {
            TradeIntent::Deposit { amount, currency } => account.deposit(*amount, currency),
            TradeIntent::Withdraw { amount, currency } => account.withdraw(*amount, currency),
            TradeIntent::Sell {
                amount,
                rate,
                from,
                to,
            } => account.sell(*amount, *rate, from, to),
            TradeIntent::Buy {
                amount,
                rate,
                from,
                to,
            } => account.buy(*amount, *rate, from, to),
            TradeIntent::Delayed { intent, delay } => account.schedule((**intent).clone(), *delay),
            TradeIntent::PlaceOrder(request) => account.place_order(request.clone()).map(|_| ()),
            TradeIntent::CancelOrder(id) => account.cancel_order(*id).map(|_| ()),
        }
    }
}

impl fmt::Display for TradeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeIntent::Deposit { amount, currency } => write!(f, "deposit {amount} {currency}"),
            TradeIntent::Withdraw { amount, currency } => {
                write!(f, "withdraw {amount} {currency}")
            }
            TradeIntent::Sell {
                amount,
                rate,
                from,
                to,
            } => write!(f, "sell {amount} {from} for {to} at {rate}"),
            TradeIntent::Buy {
                amount,
                rate,
                from,
                to,
            } => write!(f, "buy {amount} {from} with {to} at {rate}"),
            TradeIntent::Delayed { intent, delay } => write!(f, "{intent} after {delay} ticks"),
            TradeIntent::PlaceOrder(request) => write!(f, "place {request}"),
            TradeIntent::CancelOrder(id) => write!(f, "cancel order {id}"),
        }
    }
}

fn check_fraction(fraction: Value) -> Result<(), StrategyError> {
    let f = fraction.to_f64();
    if !(f > 0.0 && f <= 1.0) {
        return Err(StrategyError::new(format!(
            "fraction must be in (0, 1], got {fraction}"
        )));
    }
    Ok(())
}

/// Convert `fraction` of the quote balance into the base currency at the
/// latest price. Empty when there is nothing to convert.
fn enter(
    input: &DecisionInput<'_>,
    pair: &CurrencyPair,
    fraction: Value,
    price: Value,
) -> Result<Vec<TradeIntent>, StrategyError> {
    let ctx = input.ctx;
    let held = input.account.balance(&pair.quote);
    if !held.is_positive() {
        return Ok(Vec::new());
    }
    let amount = ctx.mul(held, fraction)?;
    if !amount.is_positive() {
        return Ok(Vec::new());
    }
    let rate = ctx.div(ctx.from_i64(1)?, price)?;
    Ok(vec![TradeIntent::Sell {
        amount,
        rate,
        from: pair.quote.clone(),
        to: pair.base.clone(),
    }])
}

fn exit(input: &DecisionInput<'_>, pair: &CurrencyPair, price: Value) -> Vec<TradeIntent> {
    let held = input.account.balance(&pair.base);
    if !held.is_positive() {
        return Vec::new();
    }
    vec![TradeIntent::Sell {
        amount: held,
        rate: price,
        from: pair.base.clone(),
        to: pair.quote.clone(),
    }]
}

/// Protective stop placed together with an entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopRule {
    /// Distance below the entry price as a fraction in (0, 1).
    pub distance: Value,
    pub trail: Option<Trail>,
}

/// Buys into the base currency on the first window and holds, optionally
/// behind a stop loss.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    id: String,
    pair: CurrencyPair,
    fraction: Value,
    stop: Option<StopRule>,
}

impl BuyAndHold {
    pub fn new(
        id: impl Into<String>,
        pair: CurrencyPair,
        fraction: Value,
    ) -> Result<Self, StrategyError> {
        check_fraction(fraction)?;
        Ok(Self {
            id: id.into(),
            pair,
            fraction,
            stop: None,
        })
    }

    pub fn with_stop(mut self, stop: StopRule) -> Result<Self, StrategyError> {
        let d = stop.distance.to_f64();
        if !(d > 0.0 && d < 1.0) {
            return Err(StrategyError::new(format!(
                "stop distance must be in (0, 1), got {}",
                stop.distance
            )));
        }
        self.stop = Some(stop);
        Ok(self)
    }

    /// Stop order covering the base bought by `entry`. The volume leaves room
    /// for the fee the stop's own sale will be charged.
    fn stop_order(
        &self,
        input: &DecisionInput<'_>,
        stop: StopRule,
        entry: &TradeIntent,
        price: Value,
    ) -> Result<Option<TradeIntent>, StrategyError> {
        let TradeIntent::Sell { amount, rate, .. } = entry else {
            return Ok(None);
        };
        let ctx = input.ctx;
        let bought = ctx.mul(*amount, *rate)?;
        let fee = input.account.fees().fee_for(ctx, bought)?;
        let volume = ctx.sub(bought, fee)?;
        if !volume.is_positive() {
            return Ok(None);
        }
        let trigger = ctx.mul(price, ctx.sub(ctx.from_i64(1)?, stop.distance)?)?;
        let kind = match stop.trail {
            Some(trail) => OrderKind::TrailingStopLoss(trail),
            None => OrderKind::StopLoss,
        };
        Ok(Some(TradeIntent::PlaceOrder(OrderRequest::new(
            kind,
            self.pair.clone(),
            volume,
            trigger,
            u64::MAX,
        ))))
    }
}

impl Strategy for BuyAndHold {
    fn id(&self) -> &str {
        &self.id
    }

    fn decide(&self, input: &DecisionInput<'_>) -> Result<Vec<TradeIntent>, StrategyError> {
        if input.window.index != 0 {
            return Ok(Vec::new());
        }
        let price = input
            .window
            .latest(&self.pair)
            .ok_or_else(|| StrategyError::new(format!("no prices for {}", self.pair)))?;
        let mut intents = enter(input, &self.pair, self.fraction, price)?;
        if let (Some(stop), Some(entry)) = (self.stop, intents.first())
            && let Some(order) = self.stop_order(input, stop, entry, price)?
        {
            intents.push(order);
        }
        Ok(intents)
    }
}

/// Simple moving average crossover on one pair.
#[derive(Debug, Clone)]
pub struct MovingAverageCrossover {
    id: String,
    pair: CurrencyPair,
    fast: usize,
    slow: usize,
    fraction: Value,
}

impl MovingAverageCrossover {
    pub fn new(
        id: impl Into<String>,
        pair: CurrencyPair,
        fast: usize,
        slow: usize,
        fraction: Value,
    ) -> Result<Self, StrategyError> {
        if fast == 0 || fast >= slow {
            return Err(StrategyError::new(format!(
                "need 0 < fast < slow, got fast={fast} slow={slow}"
            )));
        }
        check_fraction(fraction)?;
        Ok(Self {
            id: id.into(),
            pair,
            fast,
            slow,
            fraction,
        })
    }

    pub fn slow(&self) -> usize {
        self.slow
    }
}

/// Mean of the last `period` values.
fn sma(ctx: &ArithmeticContext, series: &[Value], period: usize) -> Result<Value, StrategyError> {
    let tail = &series[series.len() - period..];
    let total = ctx.sum(tail.iter().copied())?;
    let count = i64::try_from(period).map_err(|_| StrategyError::new("period too large"))?;
    Ok(ctx.div(total, ctx.from_i64(count)?)?)
}

impl Strategy for MovingAverageCrossover {
    fn id(&self) -> &str {
        &self.id
    }

    fn decide(&self, input: &DecisionInput<'_>) -> Result<Vec<TradeIntent>, StrategyError> {
        let series = input
            .window
            .series(&self.pair)
            .ok_or_else(|| StrategyError::new(format!("no prices for {}", self.pair)))?;
        if series.len() < self.slow {
            return Ok(Vec::new());
        }
        let ctx = input.ctx;
        let fast = sma(ctx, &series, self.fast)?;
        let slow = sma(ctx, &series, self.slow)?;
        let price = series[series.len() - 1];

        match ctx.compare(&fast, &slow)? {
            std::cmp::Ordering::Greater => enter(input, &self.pair, self.fraction, price),
            std::cmp::Ordering::Less => Ok(exit(input, &self.pair, price)),
            std::cmp::Ordering::Equal => Ok(Vec::new()),
        }
    }
}
