//! Conditional orders and delayed intents held by an account.
//!
//! An order watches the rate of one pair (quote units per base unit) and
//! trades `volume` of the base currency once its trigger condition holds.
//! Sell side orders go through [`Account::sell`], buy side orders through
//! [`Account::buy`] and therefore follow the account's buy convention.
//! An order placed at clock `t` with lifetime `n` is checked up to and
//! including tick `t + n`, then dropped.
//!
//! [`Account::sell`]: super::account::Account::sell
//! [`Account::buy`]: super::account::Account::buy

use std::fmt;
use std::str::FromStr;

use super::arithmetic::{ArithmeticContext, Value};
use super::currency::CurrencyPair;
use super::error::{AccountError, ArithmeticError};
use super::strategy::TradeIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a trailing stop follows a rising rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trail {
    /// Keep the relative distance: `trigger *= rate / previous`.
    Percent,
    /// Keep the absolute distance: `trigger += rate - previous`.
    Absolute,
}

impl FromStr for Trail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "percent" | "relative" => Ok(Trail::Percent),
            "absolute" => Ok(Trail::Absolute),
            other => Err(format!(
                "unknown trail {other:?} (expected percent or absolute)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// Sell once the rate falls to or below the trigger.
    StopLoss,
    /// Stop loss whose trigger follows the rate upwards, never downwards.
    TrailingStopLoss(Trail),
    /// Buy once the rate rises to or above the trigger.
    StartBuy,
    /// Buy once the rate falls to or below the trigger.
    BuyLimit,
    /// Sell once the rate rises to or above the trigger.
    SellLimit,
}

impl OrderKind {
    pub fn side(&self) -> Side {
        match self {
            OrderKind::StopLoss | OrderKind::TrailingStopLoss(_) | OrderKind::SellLimit => {
                Side::Sell
            }
            OrderKind::StartBuy | OrderKind::BuyLimit => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::StopLoss => "stop_loss",
            OrderKind::TrailingStopLoss(_) => "trailing_stop_loss",
            OrderKind::StartBuy => "start_buy",
            OrderKind::BuyLimit => "buy_limit",
            OrderKind::SellLimit => "sell_limit",
        }
    }

    fn fires(
        &self,
        ctx: &ArithmeticContext,
        rate: Value,
        trigger: Value,
    ) -> Result<bool, ArithmeticError> {
        let ord = ctx.compare(&rate, &trigger)?;
        Ok(match self {
            OrderKind::StopLoss | OrderKind::TrailingStopLoss(_) | OrderKind::BuyLimit => {
                ord.is_le()
            }
            OrderKind::StartBuy | OrderKind::SellLimit => ord.is_ge(),
        })
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub kind: OrderKind,
    pub pair: CurrencyPair,
    /// Base currency units to trade.
    pub volume: Value,
    pub trigger: Value,
    /// Ticks the order stays open after placement.
    pub lifetime: u64,
}

impl OrderRequest {
    pub fn new(
        kind: OrderKind,
        pair: CurrencyPair,
        volume: Value,
        trigger: Value,
        lifetime: u64,
    ) -> Self {
        Self {
            kind,
            pair,
            volume,
            trigger,
            lifetime,
        }
    }
}

impl fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} at {}",
            self.kind, self.volume, self.pair, self.trigger
        )
    }
}

/// An order waiting on the book.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub id: OrderId,
    pub request: OrderRequest,
    /// Live trigger; only trailing stops move it.
    pub trigger: Value,
    /// Highest rate a trailing stop has followed.
    pub reference: Value,
    pub placed_at: u64,
    pub expires_at: u64,
}

impl PendingOrder {
    pub(crate) fn open(id: OrderId, request: OrderRequest, rate: Value, clock: u64) -> Self {
        PendingOrder {
            id,
            trigger: request.trigger,
            reference: rate,
            placed_at: clock,
            expires_at: clock.saturating_add(request.lifetime),
            request,
        }
    }

    pub fn is_expired(&self, clock: u64) -> bool {
        clock > self.expires_at
    }

    /// Feed the current rate. Moves a trailing trigger first, then reports
    /// whether the order fires.
    pub(crate) fn observe(
        &mut self,
        ctx: &ArithmeticContext,
        rate: Value,
    ) -> Result<bool, ArithmeticError> {
        if let OrderKind::TrailingStopLoss(trail) = self.request.kind
            && ctx.compare(&rate, &self.reference)?.is_gt()
        {
            self.trigger = match trail {
                Trail::Percent => ctx.mul(ctx.div(rate, self.reference)?, self.trigger)?,
                Trail::Absolute => ctx.add(self.trigger, ctx.sub(rate, self.reference)?)?,
            };
            self.reference = rate;
        }
        self.request.kind.fires(ctx, rate, self.trigger)
    }
}

/// Result of placing an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The trigger already held and the trade went through.
    Filled,
    Pending(OrderId),
}

/// An intent waiting for its due tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledIntent {
    pub due: u64,
    pub intent: TradeIntent,
}

/// What happened to delayed intents and open orders during one settlement.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementEvent {
    Executed {
        intent: TradeIntent,
    },
    Failed {
        intent: TradeIntent,
        error: AccountError,
    },
    Filled {
        id: OrderId,
        rate: Value,
    },
    Expired {
        id: OrderId,
    },
    /// The order fired but the account refused the trade. It leaves the book.
    Rejected {
        id: OrderId,
        request: OrderRequest,
        error: AccountError,
    },
}

impl SettlementEvent {
    /// The refused intent, for events that failed.
    pub fn failure(&self) -> Option<(TradeIntent, AccountError)> {
        match self {
            SettlementEvent::Failed { intent, error } => Some((intent.clone(), error.clone())),
            SettlementEvent::Rejected { request, error, .. } => {
                Some((TradeIntent::PlaceOrder(request.clone()), error.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for SettlementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementEvent::Executed { intent } => write!(f, "executed delayed {intent}"),
            SettlementEvent::Failed { intent, error } => {
                write!(f, "delayed {intent} failed: {error}")
            }
            SettlementEvent::Filled { id, rate } => write!(f, "order {id} filled at {rate}"),
            SettlementEvent::Expired { id } => write!(f, "order {id} expired"),
            SettlementEvent::Rejected { id, error, .. } => {
                write!(f, "order {id} rejected: {error}")
            }
        }
    }
}
