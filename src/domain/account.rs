//! Multi-currency account ledger.
//!
//! Every mutating operation validates and computes all of its postings before
//! touching a balance, so a failed call leaves the account exactly as it was.
//! Balances never go negative. Value enters and leaves only through
//! [`Account::deposit`], [`Account::withdraw`] and fees; conversions move value
//! between currencies at the given rate.
//!
//! The account also keeps the latest exchange rates it was given, a book of
//! conditional orders and a queue of delayed intents. [`Account::settle`]
//! works through both against those rates; [`Account::tick`] advances the
//! clock and settles.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::arithmetic::{ArithmeticContext, Value};
use super::currency::{Currency, CurrencyPair};
use super::error::{AccountError, ArithmeticError};
use super::orders::{
    OrderId, OrderRequest, PendingOrder, Placement, ScheduledIntent, SettlementEvent, Side,
};
use super::rates::RateTable;
use super::strategy::TradeIntent;

/// Which side of a `buy` carries the stated amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuyConvention {
    /// `amount` is credited in the bought currency; `amount * rate` is debited
    /// from the paying currency.
    #[default]
    BaseVolume,
    /// `amount` is debited from the paying currency; `amount / rate` is
    /// credited in the bought currency.
    QuoteVolume,
}

impl fmt::Display for BuyConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuyConvention::BaseVolume => f.write_str("base_volume"),
            BuyConvention::QuoteVolume => f.write_str("quote_volume"),
        }
    }
}

impl FromStr for BuyConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "base_volume" | "base" => Ok(BuyConvention::BaseVolume),
            "quote_volume" | "quote" => Ok(BuyConvention::QuoteVolume),
            other => Err(format!(
                "unknown buy convention {other:?} (expected base_volume or quote_volume)"
            )),
        }
    }
}

/// Transaction costs: `flat + debited * rate`, charged in the debited currency.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeeSchedule {
    flat: Option<Value>,
    rate: Option<Value>,
}

impl FeeSchedule {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(flat: Option<Value>, rate: Option<Value>) -> Result<Self, AccountError> {
        for (name, value) in [("flat fee", flat), ("fee rate", rate)] {
            if let Some(v) = value
                && v.is_negative()
            {
                return Err(AccountError::InvalidAmount {
                    reason: format!("{name} must not be negative, got {v}"),
                });
            }
        }
        Ok(Self { flat, rate })
    }

    /// Fee values must come from `ctx`.
    pub fn check_context(&self, ctx: &ArithmeticContext) -> Result<(), ArithmeticError> {
        for value in [self.flat, self.rate].into_iter().flatten() {
            ctx.check(&value)?;
        }
        Ok(())
    }

    pub fn is_free(&self) -> bool {
        self.flat.is_none_or(|v| v.is_zero()) && self.rate.is_none_or(|v| v.is_zero())
    }

    pub fn fee_for(&self, ctx: &ArithmeticContext, debited: Value) -> Result<Value, AccountError> {
        let mut fee = ctx.zero();
        if let Some(flat) = self.flat {
            fee = ctx.add(fee, flat)?;
        }
        if let Some(rate) = self.rate {
            fee = ctx.add(fee, ctx.mul(debited, rate)?)?;
        }
        Ok(fee)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Deposit,
    Withdraw,
    Sell,
    Buy,
    TransferIn,
    TransferOut,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdraw => "withdraw",
            EntryKind::Sell => "sell",
            EntryKind::Buy => "buy",
            EntryKind::TransferIn => "transfer_in",
            EntryKind::TransferOut => "transfer_out",
        }
    }

    /// Trades move value between currencies or accounts.
    pub fn is_trade(&self) -> bool {
        matches!(
            self,
            EntryKind::Sell | EntryKind::Buy | EntryKind::TransferIn | EntryKind::TransferOut
        )
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed balance change of one currency. Fees are not included.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub currency: Currency,
    pub delta: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fee {
    pub currency: Currency,
    pub amount: Value,
}

/// One immutable record of a balance-affecting operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub seq: usize,
    pub clock: u64,
    pub kind: EntryKind,
    pub postings: Vec<Posting>,
    pub rate: Option<Value>,
    pub fee: Option<Fee>,
}

/// Frozen copy of an account's balances.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub id: String,
    pub clock: u64,
    pub balances: BTreeMap<Currency, Value>,
}

impl AccountSnapshot {
    pub fn balance(&self, currency: &Currency) -> Option<&Value> {
        self.balances.get(currency)
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    id: String,
    ctx: ArithmeticContext,
    balances: BTreeMap<Currency, Value>,
    history: Vec<LedgerEntry>,
    clock: u64,
    fees: FeeSchedule,
    convention: BuyConvention,
    rates: RateTable,
    orders: Vec<PendingOrder>,
    next_order: u64,
    scheduled: Vec<ScheduledIntent>,
}

impl Account {
    pub fn new(id: impl Into<String>, ctx: ArithmeticContext) -> Self {
        Account {
            id: id.into(),
            ctx,
            balances: BTreeMap::new(),
            history: Vec::new(),
            clock: 0,
            fees: FeeSchedule::none(),
            convention: BuyConvention::default(),
            rates: RateTable::new(),
            orders: Vec::new(),
            next_order: 0,
            scheduled: Vec::new(),
        }
    }

    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_buy_convention(mut self, convention: BuyConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &ArithmeticContext {
        &self.ctx
    }

    pub fn buy_convention(&self) -> BuyConvention {
        self.convention
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Take in `rates`, advance the clock by one and settle.
    pub fn tick(&mut self, rates: &RateTable) -> Result<Vec<SettlementEvent>, AccountError> {
        self.update_exchange_rates(rates)?;
        self.clock += 1;
        Ok(self.settle())
    }

    pub fn set_clock(&mut self, clock: u64) {
        self.clock = clock;
    }

    pub fn exchange_rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn update_exchange_rate(
        &mut self,
        pair: &CurrencyPair,
        rate: Value,
    ) -> Result<(), AccountError> {
        self.ctx.check(&rate)?;
        self.rates.insert(pair, rate)
    }

    /// Merge `rates` into the account's table. All or nothing.
    pub fn update_exchange_rates(&mut self, rates: &RateTable) -> Result<(), AccountError> {
        for (_, _, rate) in rates.iter() {
            self.ctx.check(rate)?;
        }
        self.rates.merge(rates);
        Ok(())
    }

    /// Holdings valued in `reference` at the account's own rates.
    pub fn equity(&self, reference: impl AsRef<str>) -> Result<Value, AccountError> {
        self.total_balance(&self.rates, reference)
    }

    pub fn open_orders(&self) -> &[PendingOrder] {
        &self.orders
    }

    pub fn scheduled(&self) -> &[ScheduledIntent] {
        &self.scheduled
    }

    /// Apply `intent` once `delay` more ticks have passed; zero applies it now.
    pub fn schedule(&mut self, intent: TradeIntent, delay: u64) -> Result<(), AccountError> {
        if delay == 0 {
            return intent.apply(self);
        }
        let due = self
            .clock
            .checked_add(delay)
            .ok_or_else(|| AccountError::InvalidAmount {
                reason: format!("delay {delay} overflows the clock"),
            })?;
        self.scheduled.push(ScheduledIntent { due, intent });
        Ok(())
    }

    /// Check `request` against the current rate of its pair. Fills at once
    /// when the trigger already holds, otherwise books the order.
    pub fn place_order(&mut self, request: OrderRequest) -> Result<Placement, AccountError> {
        self.require_positive(request.volume, "order volume")?;
        self.require_positive(request.trigger, "order trigger")?;
        let rate = self.rates.rate(&self.ctx, &request.pair)?;
        let mut order = PendingOrder::open(OrderId(self.next_order), request, rate, self.clock);
        if order.observe(&self.ctx, rate)? {
            self.fill(&order.request, rate)?;
            return Ok(Placement::Filled);
        }
        self.next_order += 1;
        let id = order.id;
        self.orders.push(order);
        Ok(Placement::Pending(id))
    }

    pub fn cancel_order(&mut self, id: OrderId) -> Result<OrderRequest, AccountError> {
        let pos = self
            .orders
            .iter()
            .position(|o| o.id == id)
            .ok_or(AccountError::UnknownOrder { id: id.0 })?;
        Ok(self.orders.remove(pos).request)
    }

    /// Apply delayed intents that have come due, oldest due first, then check
    /// every open order against the account's rates in placement order.
    /// Orders on pairs without a rate wait.
    pub fn settle(&mut self) -> Vec<SettlementEvent> {
        let clock = self.clock;
        let mut events = Vec::new();

        let (mut due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|s| s.due <= clock);
        self.scheduled = later;
        due.sort_by_key(|s| s.due);
        for ScheduledIntent { intent, .. } in due {
            match intent.apply(self) {
                Ok(()) => events.push(SettlementEvent::Executed { intent }),
                Err(error) => events.push(SettlementEvent::Failed { intent, error }),
            }
        }

        let mut open = Vec::with_capacity(self.orders.len());
        for mut order in std::mem::take(&mut self.orders) {
            if order.is_expired(clock) {
                events.push(SettlementEvent::Expired { id: order.id });
                continue;
            }
            let Ok(rate) = self.rates.rate(&self.ctx, &order.request.pair) else {
                open.push(order);
                continue;
            };
            let outcome = match order.observe(&self.ctx, rate) {
                Ok(true) => self.fill(&order.request, rate).map(|()| true),
                Ok(false) => Ok(false),
                Err(e) => Err(AccountError::from(e)),
            };
            match outcome {
                Ok(true) => events.push(SettlementEvent::Filled { id: order.id, rate }),
                Ok(false) => open.push(order),
                Err(error) => events.push(SettlementEvent::Rejected {
                    id: order.id,
                    request: order.request,
                    error,
                }),
            }
        }
        self.orders = open;
        events
    }

    pub fn balances(&self) -> &BTreeMap<Currency, Value> {
        &self.balances
    }

    pub fn history(&self) -> &[LedgerEntry] {
        &self.history
    }

    /// Balance held in `currency`; zero when never held or the code is invalid.
    pub fn balance(&self, currency: impl AsRef<str>) -> Value {
        Currency::new(currency.as_ref())
            .ok()
            .and_then(|c| self.balances.get(&c).copied())
            .unwrap_or_else(|| self.ctx.zero())
    }

    /// Like [`Account::balance`] but rejects malformed codes.
    pub fn position(&self, currency: impl AsRef<str>) -> Result<Value, AccountError> {
        let currency = Currency::new(currency.as_ref())?;
        Ok(self.held(&currency))
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.id.clone(),
            clock: self.clock,
            balances: self.balances.clone(),
        }
    }

    /// Value of all holdings expressed in `reference`.
    pub fn total_balance(
        &self,
        rates: &RateTable,
        reference: impl AsRef<str>,
    ) -> Result<Value, AccountError> {
        let reference = Currency::new(reference.as_ref())?;
        let mut total = self.ctx.zero();
        for (currency, amount) in &self.balances {
            if amount.is_zero() {
                continue;
            }
            let converted = rates.convert(&self.ctx, *amount, currency, &reference)?;
            total = self.ctx.add(total, converted)?;
        }
        Ok(total)
    }

    pub fn deposit(&mut self, amount: Value, currency: impl AsRef<str>) -> Result<(), AccountError> {
        let currency = Currency::new(currency.as_ref())?;
        self.require_positive(amount, "deposit amount")?;
        let new_balance = self.ctx.add(self.held(&currency), amount)?;

        self.balances.insert(currency.clone(), new_balance);
        self.record(EntryKind::Deposit, vec![Posting { currency, delta: amount }], None, None);
        Ok(())
    }

    pub fn withdraw(
        &mut self,
        amount: Value,
        currency: impl AsRef<str>,
    ) -> Result<(), AccountError> {
        let currency = Currency::new(currency.as_ref())?;
        self.require_positive(amount, "withdraw amount")?;
        let (new_balance, fee) = self.debit(&currency, amount)?;
        let delta = self.ctx.neg(amount)?;

        self.balances.insert(currency.clone(), new_balance);
        let fee = self.fee_entry(&currency, fee);
        self.record(EntryKind::Withdraw, vec![Posting { currency, delta }], None, fee);
        Ok(())
    }

    /// Debit `amount` of `from` and credit `amount * rate` of `to`.
    pub fn sell(
        &mut self,
        amount: Value,
        rate: Value,
        from: impl AsRef<str>,
        to: impl AsRef<str>,
    ) -> Result<(), AccountError> {
        let (from, to) = self.pair(from.as_ref(), to.as_ref())?;
        self.require_positive(amount, "sell amount")?;
        self.require_positive(rate, "rate")?;
        let credited = self.ctx.mul(amount, rate)?;
        self.convert(EntryKind::Sell, &from, amount, &to, credited, rate)
    }

    /// Mirror of [`Account::sell`]: acquire `from` paying with `to`. How
    /// `amount` is interpreted depends on the account's [`BuyConvention`].
    pub fn buy(
        &mut self,
        amount: Value,
        rate: Value,
        from: impl AsRef<str>,
        to: impl AsRef<str>,
    ) -> Result<(), AccountError> {
        let (bought, paid_with) = self.pair(from.as_ref(), to.as_ref())?;
        self.require_positive(amount, "buy amount")?;
        if rate.is_negative() {
            return Err(AccountError::InvalidAmount {
                reason: format!("rate must be positive, got {rate}"),
            });
        }
        match self.convention {
            BuyConvention::BaseVolume => {
                self.require_positive(rate, "rate")?;
                let debited = self.ctx.mul(amount, rate)?;
                self.convert(EntryKind::Buy, &paid_with, debited, &bought, amount, rate)
            }
            BuyConvention::QuoteVolume => {
                let credited = self.ctx.div(amount, rate)?;
                self.convert(EntryKind::Buy, &paid_with, amount, &bought, credited, rate)
            }
        }
    }

    /// Move `amount` of `currency` to `payee`. Fees are charged to the payer.
    pub fn transfer(
        &mut self,
        payee: &mut Account,
        amount: Value,
        currency: impl AsRef<str>,
    ) -> Result<(), AccountError> {
        let currency = Currency::new(currency.as_ref())?;
        if payee.ctx.id() != self.ctx.id() {
            return Err(AccountError::Arithmetic(ArithmeticError::ContextMismatch {
                expected: self.ctx.id(),
                found: payee.ctx.id(),
            }));
        }
        if payee.id == self.id {
            return Err(AccountError::InvalidAmount {
                reason: "cannot transfer to the same account".to_string(),
            });
        }
        self.require_positive(amount, "transfer amount")?;
        let (new_balance, fee) = self.debit(&currency, amount)?;
        let payee_balance = payee.ctx.add(payee.held(&currency), amount)?;
        let delta = self.ctx.neg(amount)?;

        self.balances.insert(currency.clone(), new_balance);
        let fee = self.fee_entry(&currency, fee);
        self.record(
            EntryKind::TransferOut,
            vec![Posting {
                currency: currency.clone(),
                delta,
            }],
            None,
            fee,
        );
        payee.balances.insert(currency.clone(), payee_balance);
        payee.record(
            EntryKind::TransferIn,
            vec![Posting {
                currency,
                delta: amount,
            }],
            None,
            None,
        );
        Ok(())
    }

    fn fill(&mut self, request: &OrderRequest, rate: Value) -> Result<(), AccountError> {
        let pair = &request.pair;
        match request.kind.side() {
            Side::Sell => self.sell(request.volume, rate, &pair.base, &pair.quote),
            Side::Buy => self.buy(request.volume, rate, &pair.base, &pair.quote),
        }
    }

    fn held(&self, currency: &Currency) -> Value {
        self.balances
            .get(currency)
            .copied()
            .unwrap_or_else(|| self.ctx.zero())
    }

    fn pair(&self, from: &str, to: &str) -> Result<(Currency, Currency), AccountError> {
        let from = Currency::new(from)?;
        let to = Currency::new(to)?;
        if from == to {
            return Err(AccountError::InvalidCurrency {
                code: format!("{from}/{to}"),
            });
        }
        Ok((from, to))
    }

    fn require_positive(&self, value: Value, what: &str) -> Result<(), AccountError> {
        self.ctx.check(&value)?;
        if !value.is_positive() {
            return Err(AccountError::InvalidAmount {
                reason: format!("{what} must be positive, got {value}"),
            });
        }
        Ok(())
    }

    /// New balance of `currency` after removing `amount` plus its fee.
    fn debit(&self, currency: &Currency, amount: Value) -> Result<(Value, Value), AccountError> {
        let fee = self.fees.fee_for(&self.ctx, amount)?;
        let required = self.ctx.add(amount, fee)?;
        let available = self.held(currency);
        if self.ctx.compare(&available, &required)?.is_lt() {
            return Err(AccountError::InsufficientFunds {
                currency: currency.to_string(),
                required: required.to_string(),
                available: available.to_string(),
            });
        }
        Ok((self.ctx.sub(available, required)?, fee))
    }

    fn convert(
        &mut self,
        kind: EntryKind,
        debit_currency: &Currency,
        debited: Value,
        credit_currency: &Currency,
        credited: Value,
        rate: Value,
    ) -> Result<(), AccountError> {
        if !credited.is_positive() {
            return Err(AccountError::InvalidAmount {
                reason: format!(
                    "{kind} of {debited} {debit_currency} rounds to nothing in {credit_currency}"
                ),
            });
        }
        if !debited.is_positive() {
            return Err(AccountError::InvalidAmount {
                reason: format!("{kind} would debit nothing from {debit_currency}"),
            });
        }
        let (debit_balance, fee) = self.debit(debit_currency, debited)?;
        let credit_balance = self.ctx.add(self.held(credit_currency), credited)?;
        let debit_delta = self.ctx.neg(debited)?;

        self.balances.insert(debit_currency.clone(), debit_balance);
        self.balances.insert(credit_currency.clone(), credit_balance);
        let fee = self.fee_entry(debit_currency, fee);
        self.record(
            kind,
            vec![
                Posting {
                    currency: debit_currency.clone(),
                    delta: debit_delta,
                },
                Posting {
                    currency: credit_currency.clone(),
                    delta: credited,
                },
            ],
            Some(rate),
            fee,
        );
        Ok(())
    }

    fn fee_entry(&self, currency: &Currency, fee: Value) -> Option<Fee> {
        (!fee.is_zero()).then(|| Fee {
            currency: currency.clone(),
            amount: fee,
        })
    }

    fn record(
        &mut self,
        kind: EntryKind,
        postings: Vec<Posting>,
        rate: Option<Value>,
        fee: Option<Fee>,
    ) {
        self.history.push(LedgerEntry {
            seq: self.history.len(),
            clock: self.clock,
            kind,
            postings,
            rate,
            fee,
        });
    }
}
