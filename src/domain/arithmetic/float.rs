//! IEEE-754 double backend. No rounding beyond what the hardware does.

use std::cmp::Ordering;

use super::Numeric;
use super::rounding::RoundingMode;
use crate::domain::error::ArithmeticError;

#[derive(Debug, Clone, Copy)]
pub(crate) struct FloatBackend {
    rounding: RoundingMode,
}

impl FloatBackend {
    pub(crate) fn new(rounding: RoundingMode) -> Self {
        Self { rounding }
    }

    fn finite(value: f64, op: &'static str) -> Result<f64, ArithmeticError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ArithmeticError::Overflow { op })
        }
    }
}

fn round_unit(value: f64, mode: RoundingMode) -> f64 {
    let truncated = value.trunc();
    let fraction = value - truncated;
    if fraction == 0.0 {
        return value;
    }
    match mode {
        RoundingMode::HalfEven => value.round_ties_even(),
        RoundingMode::HalfAwayFromZero => value.round(),
        RoundingMode::Up => truncated + value.signum(),
        RoundingMode::Down => truncated,
        RoundingMode::Ceiling => value.ceil(),
        RoundingMode::Floor => value.floor(),
        RoundingMode::HalfTowardsZero => {
            if fraction.abs() == 0.5 {
                truncated
            } else {
                value.round()
            }
        }
    }
}

impl Numeric for FloatBackend {
    type Repr = f64;

    fn parse(&self, literal: &str) -> Result<f64, ArithmeticError> {
        let value: f64 = literal
            .trim()
            .parse()
            .map_err(|_| ArithmeticError::InvalidLiteral {
                literal: literal.to_string(),
            })?;
        if !value.is_finite() {
            return Err(ArithmeticError::InvalidLiteral {
                literal: literal.to_string(),
            });
        }
        Ok(value)
    }

    fn from_i64(&self, value: i64) -> Result<f64, ArithmeticError> {
        Ok(value as f64)
    }

    fn add(&self, a: f64, b: f64) -> Result<f64, ArithmeticError> {
        Self::finite(a + b, "add")
    }

    fn sub(&self, a: f64, b: f64) -> Result<f64, ArithmeticError> {
        Self::finite(a - b, "sub")
    }

    fn mul(&self, a: f64, b: f64) -> Result<f64, ArithmeticError> {
        Self::finite(a * b, "mul")
    }

    fn div(&self, a: f64, b: f64) -> Result<f64, ArithmeticError> {
        if b == 0.0 {
            return Err(ArithmeticError::DivisionByZero);
        }
        Self::finite(a / b, "div")
    }

    fn compare(&self, a: f64, b: f64) -> Ordering {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }

    fn round(&self, a: f64, digits: u32) -> Result<f64, ArithmeticError> {
        let exponent = i32::try_from(digits).map_err(|_| ArithmeticError::Overflow { op: "round" })?;
        let factor = 10f64.powi(exponent);
        let scaled = Self::finite(a * factor, "round")?;
        Ok(round_unit(scaled, self.rounding) / factor)
    }

    fn is_zero(&self, a: f64) -> bool {
        a == 0.0
    }

    fn is_negative(&self, a: f64) -> bool {
        a < 0.0
    }

    fn to_f64(&self, a: f64) -> f64 {
        a
    }
}
