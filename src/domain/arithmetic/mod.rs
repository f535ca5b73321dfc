//! Pluggable arithmetic: one immutable context, three numeric backends.
//!
//! An [`ArithmeticContext`] is built once from [`ArithmeticSettings`] and then
//! shared read-only (it is a cheap `Arc` handle). Every [`Value`] remembers the
//! id of the context that created it; handing a value to a different context
//! fails with [`ArithmeticError::ContextMismatch`].
//!
//! Backends:
//! - `Float64`: plain IEEE doubles, no extra rounding.
//! - `Decimal`: `rust_decimal` values limited to `precision` significant digits.
//! - `FastDecimal`: `i128` fixed point at `max_fraction_digits` scale.
//!
//! Decimal and fast-decimal results are rounded to `max_fraction_digits` after
//! every multiply and divide, never after add or subtract.

pub mod rounding;

mod decimal;
mod fixed;
mod float;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use rust_decimal::Decimal;

use self::decimal::DecimalBackend;
use self::fixed::{FixedBackend, format_fixed};
use self::float::FloatBackend;
use crate::domain::error::ArithmeticError;

pub use self::rounding::RoundingMode;

/// Capability set every numeric backend provides.
pub(crate) trait Numeric {
    type Repr: Copy;

    fn parse(&self, literal: &str) -> Result<Self::Repr, ArithmeticError>;
    fn from_i64(&self, value: i64) -> Result<Self::Repr, ArithmeticError>;
    fn add(&self, a: Self::Repr, b: Self::Repr) -> Result<Self::Repr, ArithmeticError>;
    fn sub(&self, a: Self::Repr, b: Self::Repr) -> Result<Self::Repr, ArithmeticError>;
    fn mul(&self, a: Self::Repr, b: Self::Repr) -> Result<Self::Repr, ArithmeticError>;
    fn div(&self, a: Self::Repr, b: Self::Repr) -> Result<Self::Repr, ArithmeticError>;
    fn compare(&self, a: Self::Repr, b: Self::Repr) -> Ordering;
    fn round(&self, a: Self::Repr, digits: u32) -> Result<Self::Repr, ArithmeticError>;
    fn is_zero(&self, a: Self::Repr) -> bool;
    fn is_negative(&self, a: Self::Repr) -> bool;
    fn to_f64(&self, a: Self::Repr) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    Float64,
    #[default]
    Decimal,
    FastDecimal,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Float64 => "float64",
            Backend::Decimal => "decimal",
            Backend::FastDecimal => "fast_decimal",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ArithmeticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "float64" | "float" | "f64" => Ok(Backend::Float64),
            "decimal" => Ok(Backend::Decimal),
            "fast_decimal" | "fastdecimal" | "fixed" => Ok(Backend::FastDecimal),
            _ => Err(ArithmeticError::Configuration {
                reason: format!("unknown arithmetic backend {s:?}"),
            }),
        }
    }
}

/// Raw parameters of an arithmetic context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticSettings {
    pub backend: Backend,
    pub precision: u32,
    pub max_fraction_digits: u32,
    pub rounding_mode: RoundingMode,
}

impl Default for ArithmeticSettings {
    fn default() -> Self {
        ArithmeticSettings {
            backend: Backend::Decimal,
            precision: 28,
            max_fraction_digits: 8,
            rounding_mode: RoundingMode::HalfEven,
        }
    }
}

/// Identifies the context a [`Value`] was created under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Repr {
    Float(f64),
    Decimal(Decimal),
    Fixed { mantissa: i128, scale: u32 },
}

/// A number owned by one arithmetic context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Value {
    context: ContextId,
    repr: Repr,
}

impl Value {
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn backend(&self) -> Backend {
        match self.repr {
            Repr::Float(_) => Backend::Float64,
            Repr::Decimal(_) => Backend::Decimal,
            Repr::Fixed { .. } => Backend::FastDecimal,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self.repr {
            Repr::Float(v) => v == 0.0,
            Repr::Decimal(v) => v.is_zero(),
            Repr::Fixed { mantissa, .. } => mantissa == 0,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self.repr {
            Repr::Float(v) => v < 0.0,
            Repr::Decimal(v) => v.is_sign_negative() && !v.is_zero(),
            Repr::Fixed { mantissa, .. } => mantissa < 0,
        }
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && !self.is_negative()
    }

    /// Lossy conversion for statistics and display only.
    pub fn to_f64(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        match self.repr {
            Repr::Float(v) => v,
            Repr::Decimal(v) => v.to_f64().unwrap_or(f64::NAN),
            Repr::Fixed { mantissa, scale } => mantissa as f64 / 10f64.powi(scale as i32),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            Repr::Float(v) => write!(f, "{v}"),
            Repr::Decimal(v) => write!(f, "{v}"),
            Repr::Fixed { mantissa, scale } => f.write_str(&format_fixed(mantissa, scale)),
        }
    }
}

#[derive(Debug)]
enum BackendImpl {
    Float(FloatBackend),
    Decimal(DecimalBackend),
    Fixed(FixedBackend),
}

#[derive(Debug)]
struct ContextInner {
    id: ContextId,
    settings: ArithmeticSettings,
    backend: BackendImpl,
}

/// Builds a frozen [`ArithmeticContext`].
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    settings: ArithmeticSettings,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: ArithmeticSettings) -> Self {
        Self { settings }
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.settings.backend = backend;
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.settings.precision = precision;
        self
    }

    pub fn max_fraction_digits(mut self, digits: u32) -> Self {
        self.settings.max_fraction_digits = digits;
        self
    }

    pub fn rounding_mode(mut self, mode: RoundingMode) -> Self {
        self.settings.rounding_mode = mode;
        self
    }

    pub fn build(self) -> Result<ArithmeticContext, ArithmeticError> {
        let s = self.settings;
        if s.precision == 0 {
            return Err(ArithmeticError::Configuration {
                reason: "precision must be positive".to_string(),
            });
        }
        let backend = match s.backend {
            Backend::Float64 => BackendImpl::Float(FloatBackend::new(s.rounding_mode)),
            Backend::Decimal => BackendImpl::Decimal(DecimalBackend::new(
                s.precision,
                s.max_fraction_digits,
                s.rounding_mode,
            )?),
            Backend::FastDecimal => BackendImpl::Fixed(FixedBackend::new(
                s.precision,
                s.max_fraction_digits,
                s.rounding_mode,
            )?),
        };
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, AtomicOrdering::Relaxed));
        Ok(ArithmeticContext {
            inner: Arc::new(ContextInner {
                id,
                settings: s,
                backend,
            }),
        })
    }
}

/// Immutable, shareable arithmetic configuration.
#[derive(Debug, Clone)]
pub struct ArithmeticContext {
    inner: Arc<ContextInner>,
}

macro_rules! binary_op {
    ($self:ident, $a:ident, $b:ident, $op:ident) => {{
        $self.check(&$a)?;
        $self.check(&$b)?;
        let repr = match (&$self.inner.backend, $a.repr, $b.repr) {
            (BackendImpl::Float(e), Repr::Float(x), Repr::Float(y)) => Repr::Float(e.$op(x, y)?),
            (BackendImpl::Decimal(e), Repr::Decimal(x), Repr::Decimal(y)) => {
                Repr::Decimal(e.$op(x, y)?)
            }
            (
                BackendImpl::Fixed(e),
                Repr::Fixed { mantissa: x, .. },
                Repr::Fixed { mantissa: y, .. },
            ) => Repr::Fixed {
                mantissa: e.$op(x, y)?,
                scale: e.scale(),
            },
            _ => return Err($self.mismatch(&$a)),
        };
        Ok($self.wrap(repr))
    }};
}

impl ArithmeticContext {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn new(settings: ArithmeticSettings) -> Result<Self, ArithmeticError> {
        ContextBuilder::from_settings(settings).build()
    }

    /// Build a context in one call; the returned handle cannot be reconfigured.
    pub fn configure(
        backend: Backend,
        precision: u32,
        max_fraction_digits: u32,
        rounding_mode: RoundingMode,
    ) -> Result<Self, ArithmeticError> {
        ContextBuilder::new()
            .backend(backend)
            .precision(precision)
            .max_fraction_digits(max_fraction_digits)
            .rounding_mode(rounding_mode)
            .build()
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn settings(&self) -> &ArithmeticSettings {
        &self.inner.settings
    }

    pub fn backend(&self) -> Backend {
        self.inner.settings.backend
    }

    pub fn owns(&self, value: &Value) -> bool {
        value.context == self.inner.id
    }

    /// Fail fast when `value` was created under another context.
    pub fn check(&self, value: &Value) -> Result<(), ArithmeticError> {
        if self.owns(value) {
            Ok(())
        } else {
            Err(self.mismatch(value))
        }
    }

    fn mismatch(&self, value: &Value) -> ArithmeticError {
        ArithmeticError::ContextMismatch {
            expected: self.inner.id,
            found: value.context,
        }
    }

    fn wrap(&self, repr: Repr) -> Value {
        Value {
            context: self.inner.id,
            repr,
        }
    }

    pub fn from_literal(&self, literal: &str) -> Result<Value, ArithmeticError> {
        let repr = match &self.inner.backend {
            BackendImpl::Float(e) => Repr::Float(e.parse(literal)?),
            BackendImpl::Decimal(e) => Repr::Decimal(e.parse(literal)?),
            BackendImpl::Fixed(e) => Repr::Fixed {
                mantissa: e.parse(literal)?,
                scale: e.scale(),
            },
        };
        Ok(self.wrap(repr))
    }

    pub fn from_i64(&self, value: i64) -> Result<Value, ArithmeticError> {
        let repr = match &self.inner.backend {
            BackendImpl::Float(e) => Repr::Float(e.from_i64(value)?),
            BackendImpl::Decimal(e) => Repr::Decimal(e.from_i64(value)?),
            BackendImpl::Fixed(e) => Repr::Fixed {
                mantissa: e.from_i64(value)?,
                scale: e.scale(),
            },
        };
        Ok(self.wrap(repr))
    }

    /// Convert a float through its shortest round-trip decimal text, so
    /// `1.1` becomes exactly `1.1` under the decimal backends.
    pub fn from_f64(&self, value: f64) -> Result<Value, ArithmeticError> {
        if !value.is_finite() {
            return Err(ArithmeticError::InvalidLiteral {
                literal: value.to_string(),
            });
        }
        match &self.inner.backend {
            BackendImpl::Float(_) => Ok(self.wrap(Repr::Float(value))),
            _ => self.from_literal(&value.to_string()),
        }
    }

    pub fn zero(&self) -> Value {
        let repr = match &self.inner.backend {
            BackendImpl::Float(_) => Repr::Float(0.0),
            BackendImpl::Decimal(_) => Repr::Decimal(Decimal::ZERO),
            BackendImpl::Fixed(e) => Repr::Fixed {
                mantissa: 0,
                scale: e.scale(),
            },
        };
        self.wrap(repr)
    }

    pub fn add(&self, a: Value, b: Value) -> Result<Value, ArithmeticError> {
        binary_op!(self, a, b, add)
    }

    pub fn sub(&self, a: Value, b: Value) -> Result<Value, ArithmeticError> {
        binary_op!(self, a, b, sub)
    }

    pub fn mul(&self, a: Value, b: Value) -> Result<Value, ArithmeticError> {
        binary_op!(self, a, b, mul)
    }

    pub fn div(&self, a: Value, b: Value) -> Result<Value, ArithmeticError> {
        binary_op!(self, a, b, div)
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Result<Ordering, ArithmeticError> {
        self.check(a)?;
        self.check(b)?;
        let ordering = match (&self.inner.backend, a.repr, b.repr) {
            (BackendImpl::Float(e), Repr::Float(x), Repr::Float(y)) => e.compare(x, y),
            (BackendImpl::Decimal(e), Repr::Decimal(x), Repr::Decimal(y)) => e.compare(x, y),
            (
                BackendImpl::Fixed(e),
                Repr::Fixed { mantissa: x, .. },
                Repr::Fixed { mantissa: y, .. },
            ) => e.compare(x, y),
            _ => return Err(self.mismatch(a)),
        };
        Ok(ordering)
    }

    /// Round to `digits` fractional digits with the context's rounding mode.
    pub fn round(&self, value: Value, digits: u32) -> Result<Value, ArithmeticError> {
        self.check(&value)?;
        let repr = match (&self.inner.backend, value.repr) {
            (BackendImpl::Float(e), Repr::Float(x)) => Repr::Float(e.round(x, digits)?),
            (BackendImpl::Decimal(e), Repr::Decimal(x)) => Repr::Decimal(e.round(x, digits)?),
            (BackendImpl::Fixed(e), Repr::Fixed { mantissa, scale }) => Repr::Fixed {
                mantissa: e.round(mantissa, digits)?,
                scale,
            },
            _ => return Err(self.mismatch(&value)),
        };
        Ok(self.wrap(repr))
    }

    pub fn neg(&self, value: Value) -> Result<Value, ArithmeticError> {
        self.sub(self.zero(), value)
    }

    pub fn sum<I>(&self, values: I) -> Result<Value, ArithmeticError>
    where
        I: IntoIterator<Item = Value>,
    {
        values
            .into_iter()
            .try_fold(self.zero(), |acc, v| self.add(acc, v))
    }

    pub fn is_zero(&self, value: &Value) -> Result<bool, ArithmeticError> {
        self.check(value)?;
        Ok(match (&self.inner.backend, value.repr) {
            (BackendImpl::Float(e), Repr::Float(x)) => e.is_zero(x),
            (BackendImpl::Decimal(e), Repr::Decimal(x)) => e.is_zero(x),
            (BackendImpl::Fixed(e), Repr::Fixed { mantissa, .. }) => e.is_zero(mantissa),
            _ => return Err(self.mismatch(value)),
        })
    }

    pub fn is_negative(&self, value: &Value) -> Result<bool, ArithmeticError> {
        self.check(value)?;
        Ok(match (&self.inner.backend, value.repr) {
            (BackendImpl::Float(e), Repr::Float(x)) => e.is_negative(x),
            (BackendImpl::Decimal(e), Repr::Decimal(x)) => e.is_negative(x),
            (BackendImpl::Fixed(e), Repr::Fixed { mantissa, .. }) => e.is_negative(mantissa),
            _ => return Err(self.mismatch(value)),
        })
    }

    pub fn to_f64(&self, value: &Value) -> Result<f64, ArithmeticError> {
        self.check(value)?;
        Ok(match (&self.inner.backend, value.repr) {
            (BackendImpl::Float(e), Repr::Float(x)) => e.to_f64(x),
            (BackendImpl::Decimal(e), Repr::Decimal(x)) => e.to_f64(x),
            (BackendImpl::Fixed(e), Repr::Fixed { mantissa, .. }) => e.to_f64(mantissa),
            _ => return Err(self.mismatch(value)),
        })
    }
}
