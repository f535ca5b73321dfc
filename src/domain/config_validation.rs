//! Configuration loading and validation.
//!
//! Every field is checked before a run starts. Decimal literals are
//! validated by building the configured arithmetic context and parsing
//! them through it, so a config that loads is a config that runs.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::account::{BuyConvention, FeeSchedule};
use crate::domain::arithmetic::{
    ArithmeticContext, ArithmeticSettings, Backend, RoundingMode, Value,
};
use crate::domain::currency::{Currency, CurrencyPair};
use crate::domain::engine::RunParams;
use crate::domain::error::FxError;
use crate::domain::metrics::MetricsConfig;
use crate::domain::orders::Trail;
use crate::domain::strategy::{BuyAndHold, MovingAverageCrossover, StopRule, Strategy};
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub base_currency: Currency,
    /// Decimal literal, parsed under the run's context.
    pub initial_deposit: String,
    pub start_index: usize,
    pub end_index: Option<usize>,
    pub window_size: usize,
    pub step_size: usize,
    pub parallel: bool,
    pub n_jobs: Option<usize>,
    pub buy_convention: BuyConvention,
    pub fee_flat: Option<String>,
    pub fee_rate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    BuyAndHold,
    SmaCrossover,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::BuyAndHold => "buy_and_hold",
            StrategyKind::SmaCrossover => "sma_crossover",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "buy_and_hold" | "hold" => Ok(StrategyKind::BuyAndHold),
            "sma_crossover" | "sma" => Ok(StrategyKind::SmaCrossover),
            other => Err(format!(
                "unknown strategy kind {other:?} (expected buy_and_hold or sma_crossover)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategySpec {
    pub name: String,
    pub kind: StrategyKind,
    pub pair: CurrencyPair,
    pub fraction: String,
    pub fast: usize,
    pub slow: usize,
    /// Decimal literal: stop distance below the entry price.
    pub stop_loss: Option<String>,
    pub trail: Option<Trail>,
}

impl StrategySpec {
    fn section(&self) -> String {
        strategy_section(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FxConfig {
    pub arithmetic: ArithmeticSettings,
    pub engine: EngineSettings,
    pub history_path: Option<PathBuf>,
    pub metrics: MetricsConfig,
    pub strategies: Vec<StrategySpec>,
}

impl FxConfig {
    pub fn context(&self) -> Result<ArithmeticContext, FxError> {
        ArithmeticContext::new(self.arithmetic).map_err(|e| invalid("arithmetic", "backend", e))
    }

    pub fn run_params(&self, ctx: &ArithmeticContext) -> Result<RunParams, FxError> {
        let engine = &self.engine;
        let deposit = ctx
            .from_literal(&engine.initial_deposit)
            .map_err(|e| invalid("engine", "initial_deposit", e))?;
        if !deposit.is_positive() {
            return Err(invalid(
                "engine",
                "initial_deposit",
                "initial_deposit must be positive",
            ));
        }
        let fee_flat = optional_literal(ctx, "fee_flat", engine.fee_flat.as_deref())?;
        let fee_rate = optional_literal(ctx, "fee_rate", engine.fee_rate.as_deref())?;
        let fees = FeeSchedule::new(fee_flat, fee_rate).map_err(|e| invalid("engine", "fee", e))?;

        let mut params = RunParams::new(engine.base_currency.clone(), deposit)
            .window(engine.window_size, engine.step_size);
        params.start_index = engine.start_index;
        params.end_index = engine.end_index;
        params.parallel = engine.parallel;
        params.n_jobs = engine.n_jobs;
        params.buy_convention = engine.buy_convention;
        params.fees = fees;
        Ok(params)
    }

    pub fn build_strategies(
        &self,
        ctx: &ArithmeticContext,
    ) -> Result<Vec<Box<dyn Strategy>>, FxError> {
        self.strategies
            .iter()
            .map(|spec| build_strategy(spec, ctx))
            .collect()
    }
}

fn build_strategy(
    spec: &StrategySpec,
    ctx: &ArithmeticContext,
) -> Result<Box<dyn Strategy>, FxError> {
    let section = spec.section();
    let fraction = ctx
        .from_literal(&spec.fraction)
        .map_err(|e| invalid(&section, "fraction", e))?;
    let strategy: Box<dyn Strategy> = match spec.kind {
        StrategyKind::BuyAndHold => {
            let mut hold = BuyAndHold::new(&spec.name, spec.pair.clone(), fraction)
                .map_err(|e| invalid(&section, "fraction", e))?;
            if let Some(raw) = &spec.stop_loss {
                let distance = ctx
                    .from_literal(raw)
                    .map_err(|e| invalid(&section, "stop_loss", e))?;
                hold = hold
                    .with_stop(StopRule {
                        distance,
                        trail: spec.trail,
                    })
                    .map_err(|e| invalid(&section, "stop_loss", e))?;
            }
            Box::new(hold)
        }
        StrategyKind::SmaCrossover => Box::new(
            MovingAverageCrossover::new(
                &spec.name,
                spec.pair.clone(),
                spec.fast,
                spec.slow,
                fraction,
            )
            .map_err(|e| invalid(&section, "fast", e))?,
        ),
    };
    Ok(strategy)
}

/// Reads and validates the whole configuration.
pub fn load_config(config: &dyn ConfigPort) -> Result<FxConfig, FxError> {
    let parsed = FxConfig {
        arithmetic: validate_arithmetic(config)?,
        engine: validate_engine(config)?,
        history_path: config
            .get_string("data", "history")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from),
        metrics: validate_metrics(config)?,
        strategies: validate_strategies(config)?,
    };

    let ctx = parsed.context()?;
    parsed.run_params(&ctx)?;
    parsed.build_strategies(&ctx)?;
    Ok(parsed)
}

fn validate_arithmetic(config: &dyn ConfigPort) -> Result<ArithmeticSettings, FxError> {
    let defaults = ArithmeticSettings::default();
    let backend: Backend = parse_field(config, "arithmetic", "backend", defaults.backend)?;
    let precision: u32 = parse_field(config, "arithmetic", "precision", defaults.precision)?;
    if precision == 0 {
        return Err(invalid(
            "arithmetic",
            "precision",
            "precision must be positive",
        ));
    }
    let max_fraction_digits: u32 = parse_field(
        config,
        "arithmetic",
        "max_fraction_digits",
        defaults.max_fraction_digits,
    )?;
    let rounding_mode: RoundingMode =
        parse_field(config, "arithmetic", "rounding_mode", defaults.rounding_mode)?;

    let settings = ArithmeticSettings {
        backend,
        precision,
        max_fraction_digits,
        rounding_mode,
    };
    ArithmeticContext::new(settings).map_err(|e| invalid("arithmetic", "precision", e))?;
    Ok(settings)
}

fn validate_engine(config: &dyn ConfigPort) -> Result<EngineSettings, FxError> {
    let base_currency = match config.get_string("engine", "base_currency") {
        None => return Err(missing("engine", "base_currency")),
        Some(code) => {
            Currency::new(&code).map_err(|e| invalid("engine", "base_currency", e))?
        }
    };
    let initial_deposit = required_string(config, "engine", "initial_deposit")?;

    let start_index: usize = parse_field(config, "engine", "start_index", 0)?;
    let end_index: Option<usize> = optional_field(config, "engine", "end_index")?;
    if let Some(end) = end_index
        && end <= start_index
    {
        return Err(invalid(
            "engine",
            "end_index",
            "end_index must be greater than start_index",
        ));
    }

    let window_size: usize = parse_field(config, "engine", "window_size", 1)?;
    if window_size == 0 {
        return Err(invalid("engine", "window_size", "window_size must be at least 1"));
    }
    let step_size: usize = parse_field(config, "engine", "step_size", 1)?;
    if step_size == 0 {
        return Err(invalid("engine", "step_size", "step_size must be at least 1"));
    }

    let n_jobs: Option<usize> = optional_field(config, "engine", "n_jobs")?;
    if n_jobs == Some(0) {
        return Err(invalid("engine", "n_jobs", "n_jobs must be at least 1"));
    }

    Ok(EngineSettings {
        base_currency,
        initial_deposit,
        start_index,
        end_index,
        window_size,
        step_size,
        parallel: parse_field(config, "engine", "parallel", Flag(true))?.0,
        n_jobs,
        buy_convention: parse_field(
            config,
            "engine",
            "buy_convention",
            BuyConvention::default(),
        )?,
        fee_flat: optional_string(config, "engine", "fee_flat"),
        fee_rate: optional_string(config, "engine", "fee_rate"),
    })
}

fn validate_metrics(config: &dyn ConfigPort) -> Result<MetricsConfig, FxError> {
    let defaults = MetricsConfig::default();

    let risk_free_rate: f64 =
        parse_field(config, "metrics", "risk_free_rate", defaults.risk_free_rate)?;
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(invalid(
            "metrics",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    let periods_per_year: f64 =
        parse_field(config, "metrics", "periods_per_year", defaults.periods_per_year)?;
    if periods_per_year <= 0.0 || !periods_per_year.is_finite() {
        return Err(invalid(
            "metrics",
            "periods_per_year",
            "periods_per_year must be positive",
        ));
    }
    let var_confidence: f64 =
        parse_field(config, "metrics", "var_confidence", defaults.var_confidence)?;
    if var_confidence <= 0.0 || var_confidence >= 1.0 {
        return Err(invalid(
            "metrics",
            "var_confidence",
            "var_confidence must be between 0 and 1 exclusive",
        ));
    }

    Ok(MetricsConfig {
        risk_free_rate,
        periods_per_year,
        var_confidence,
    })
}

fn validate_strategies(config: &dyn ConfigPort) -> Result<Vec<StrategySpec>, FxError> {
    let names = required_string(config, "strategies", "names")?;
    let names: Vec<&str> = names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Err(invalid(
            "strategies",
            "names",
            "at least one strategy is required",
        ));
    }

    let mut seen = BTreeSet::new();
    let mut specs = Vec::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.to_lowercase()) {
            return Err(invalid(
                "strategies",
                "names",
                format!("duplicate strategy name {name:?}"),
            ));
        }
        specs.push(validate_strategy(config, name)?);
    }
    Ok(specs)
}

fn validate_strategy(config: &dyn ConfigPort, name: &str) -> Result<StrategySpec, FxError> {
    let section = strategy_section(name);
    if !config.has_section(&section) {
        return Err(missing(&section, "kind"));
    }
    let kind: StrategyKind = match config.get_string(&section, "kind") {
        None => return Err(missing(&section, "kind")),
        Some(raw) => raw.parse().map_err(|e: String| invalid(&section, "kind", e))?,
    };
    let pair: CurrencyPair = required_string(config, &section, "pair")?
        .parse()
        .map_err(|e| invalid(&section, "pair", e))?;
    let fraction = optional_string(config, &section, "fraction").unwrap_or_else(|| "1".into());

    let (fast, slow) = match kind {
        StrategyKind::BuyAndHold => (0, 0),
        StrategyKind::SmaCrossover => {
            let fast: usize = required_field(config, &section, "fast")?;
            let slow: usize = required_field(config, &section, "slow")?;
            if fast == 0 || fast >= slow {
                return Err(invalid(&section, "fast", "need 0 < fast < slow"));
            }
            (fast, slow)
        }
    };

    let stop_loss = optional_string(config, &section, "stop_loss");
    let trail = optional_field::<Trail>(config, &section, "trailing")?;
    if kind != StrategyKind::BuyAndHold && stop_loss.is_some() {
        return Err(invalid(&section, "stop_loss", "stops apply to buy_and_hold only"));
    }
    if trail.is_some() && stop_loss.is_none() {
        return Err(invalid(&section, "trailing", "trailing needs stop_loss"));
    }

    Ok(StrategySpec {
        name: name.to_string(),
        kind,
        pair,
        fraction,
        fast,
        slow,
        stop_loss,
        trail,
    })
}

/// INI boolean: true/false, yes/no, on/off or 1/0.
struct Flag(bool);

impl FromStr for Flag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Flag(true)),
            "false" | "no" | "off" | "0" => Ok(Flag(false)),
            other => Err(format!("expected a boolean, got {other:?}")),
        }
    }
}

fn strategy_section(name: &str) -> String {
    format!("strategy.{}", name.to_lowercase())
}

fn optional_literal(
    ctx: &ArithmeticContext,
    key: &str,
    literal: Option<&str>,
) -> Result<Option<Value>, FxError> {
    literal
        .map(|s| ctx.from_literal(s).map_err(|e| invalid("engine", key, e)))
        .transpose()
}

fn optional_string(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, FxError> {
    optional_string(config, section, key).ok_or_else(|| missing(section, key))
}

fn optional_field<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, FxError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_string(config, section, key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| invalid(section, key, format!("cannot parse {raw:?}: {e}")))
        })
        .transpose()
}

fn parse_field<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, FxError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(optional_field(config, section, key)?.unwrap_or(default))
}

fn required_field<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, FxError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_field(config, section, key)?.ok_or_else(|| missing(section, key))
}

fn missing(section: &str, key: &str) -> FxError {
    FxError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn invalid(section: &str, key: &str, reason: impl ToString) -> FxError {
    FxError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
