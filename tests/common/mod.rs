#![allow(dead_code)]

use fxtrader::domain::arithmetic::{ArithmeticContext, Backend, RoundingMode, Value};
use fxtrader::domain::currency::{Currency, CurrencyPair};
use fxtrader::domain::engine::RunParams;
use fxtrader::domain::error::{FxError, StrategyError};
use fxtrader::domain::history::PriceHistory;
use fxtrader::domain::run_result::RunResults;
use fxtrader::domain::strategy::{DecisionInput, Strategy, TradeIntent};
use fxtrader::ports::history_port::HistoryPort;
use std::fmt::Write as _;
use std::io::Write;

pub fn decimal_ctx() -> ArithmeticContext {
    ArithmeticContext::configure(Backend::Decimal, 28, 8, RoundingMode::HalfEven).unwrap()
}

pub fn ctx_for(backend: Backend) -> ArithmeticContext {
    let precision = match backend {
        Backend::Float64 => 15,
        Backend::Decimal => 28,
        Backend::FastDecimal => 30,
    };
    ArithmeticContext::configure(backend, precision, 8, RoundingMode::HalfEven).unwrap()
}

pub fn cur(code: &str) -> Currency {
    Currency::new(code).unwrap()
}

pub fn eur_usd() -> CurrencyPair {
    "EUR/USD".parse().unwrap()
}

pub fn lit(ctx: &ArithmeticContext, literal: &str) -> Value {
    ctx.from_literal(literal).unwrap()
}

/// Single pair EUR/USD history from price literals.
pub fn history(ctx: &ArithmeticContext, prices: &[&str]) -> PriceHistory {
    let rows = prices.iter().map(|p| vec![lit(ctx, p)]).collect();
    PriceHistory::new(vec![eur_usd()], rows).unwrap()
}

/// Deterministic zig-zag around 1.10, `len` rows.
pub fn zigzag_history(ctx: &ArithmeticContext, len: usize) -> PriceHistory {
    let prices: Vec<String> = (0..len)
        .map(|i| {
            let swing = (i % 7) as i64 - 3;
            let drift = (i / 7) as i64;
            format!("1.{:04}", 1000 + swing * 25 + drift * 10)
        })
        .collect();
    let refs: Vec<&str> = prices.iter().map(String::as_str).collect();
    history(ctx, &refs)
}

pub fn usd_params(ctx: &ArithmeticContext, deposit: i64) -> RunParams {
    RunParams::new(cur("USD"), ctx.from_i64(deposit).unwrap())
}

pub struct MockHistoryPort {
    pub prices: Vec<String>,
    pub error: Option<String>,
}

impl MockHistoryPort {
    pub fn new(prices: &[&str]) -> Self {
        Self {
            prices: prices.iter().map(|p| p.to_string()).collect(),
            error: None,
        }
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

impl HistoryPort for MockHistoryPort {
    fn load(&self, ctx: &ArithmeticContext) -> Result<PriceHistory, FxError> {
        if let Some(reason) = &self.error {
            return Err(FxError::Data {
                reason: reason.clone(),
            });
        }
        let refs: Vec<&str> = self.prices.iter().map(String::as_str).collect();
        Ok(history(ctx, &refs))
    }
}

/// Sells `amount` USD into EUR at the latest inverse price on every window.
pub struct SteadySeller {
    pub id: String,
    pub amount: String,
}

impl SteadySeller {
    pub fn boxed(id: &str, amount: &str) -> Box<dyn Strategy> {
        Box::new(Self {
            id: id.to_string(),
            amount: amount.to_string(),
        })
    }
}

impl Strategy for SteadySeller {
    fn id(&self) -> &str {
        &self.id
    }

    fn decide(&self, input: &DecisionInput<'_>) -> Result<Vec<TradeIntent>, StrategyError> {
        let ctx = input.ctx;
        let price = input
            .window
            .latest(&eur_usd())
            .ok_or_else(|| StrategyError::new("no EUR/USD price"))?;
        let rate = ctx.div(ctx.from_i64(1)?, price)?;
        Ok(vec![TradeIntent::Sell {
            amount: ctx.from_literal(&self.amount)?,
            rate,
            from: cur("USD"),
            to: cur("EUR"),
        }])
    }
}

/// Idle until `window`, where it panics or returns an error.
pub struct FaultyAt {
    pub id: String,
    pub window: usize,
    pub panics: bool,
}

impl FaultyAt {
    pub fn panicking(id: &str, window: usize) -> Box<dyn Strategy> {
        Box::new(Self {
            id: id.to_string(),
            window,
            panics: true,
        })
    }

    pub fn erroring(id: &str, window: usize) -> Box<dyn Strategy> {
        Box::new(Self {
            id: id.to_string(),
            window,
            panics: false,
        })
    }
}

impl Strategy for FaultyAt {
    fn id(&self) -> &str {
        &self.id
    }

    fn decide(&self, input: &DecisionInput<'_>) -> Result<Vec<TradeIntent>, StrategyError> {
        if input.window.index == self.window {
            if self.panics {
                panic!("boom at window {}", self.window);
            }
            return Err(StrategyError::new(format!("gave up at window {}", self.window)));
        }
        Ok(Vec::new())
    }
}

pub fn write_temp_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Text rendering of every value in a run, so scale and representation
/// differences show up even where numeric equality would hide them.
pub fn render(results: &RunResults) -> String {
    let mut out = String::new();
    for result in results {
        writeln!(
            out,
            "{} {} windows={}",
            result.strategy_id, result.status, result.windows_processed
        )
        .unwrap();
        for (currency, amount) in &result.final_snapshot.balances {
            writeln!(out, "  balance {currency}={amount}").unwrap();
        }
        for entry in &result.history {
            write!(out, "  entry {} {} @{}", entry.seq, entry.kind, entry.clock).unwrap();
            for posting in &entry.postings {
                write!(out, " {}{}", posting.currency, posting.delta).unwrap();
            }
            if let Some(rate) = &entry.rate {
                write!(out, " rate={rate}").unwrap();
            }
            if let Some(fee) = &entry.fee {
                write!(out, " fee={}{}", fee.currency, fee.amount).unwrap();
            }
            out.push('\n');
        }
        for point in &result.equity_curve {
            writeln!(out, "  equity {} {} {}", point.window, point.step, point.value).unwrap();
        }
        for failure in &result.trade_failures {
            writeln!(out, "  failed {} {}: {}", failure.window, failure.intent, failure.error)
                .unwrap();
        }
    }
    out
}
