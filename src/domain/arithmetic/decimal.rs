//! Decimal backend on `rust_decimal`, limited to `precision` significant digits.

use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::Numeric;
use super::rounding::{RoundingMode, digit_count, pow10};
use crate::domain::error::ArithmeticError;

pub(crate) const MAX_PRECISION: u32 = 28;

#[derive(Debug, Clone, Copy)]
pub(crate) struct DecimalBackend {
    precision: u32,
    max_fraction_digits: u32,
    strategy: RoundingStrategy,
}

fn strategy_for(mode: RoundingMode) -> RoundingStrategy {
    match mode {
        RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
        RoundingMode::HalfAwayFromZero => RoundingStrategy::MidpointAwayFromZero,
        RoundingMode::HalfTowardsZero => RoundingStrategy::MidpointTowardZero,
        RoundingMode::Up => RoundingStrategy::AwayFromZero,
        RoundingMode::Down => RoundingStrategy::ToZero,
        RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
        RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
    }
}

impl DecimalBackend {
    pub(crate) fn new(
        precision: u32,
        max_fraction_digits: u32,
        rounding: RoundingMode,
    ) -> Result<Self, ArithmeticError> {
        if precision == 0 || precision > MAX_PRECISION {
            return Err(ArithmeticError::Configuration {
                reason: format!("decimal precision must be between 1 and {MAX_PRECISION}"),
            });
        }
        if max_fraction_digits > MAX_PRECISION {
            return Err(ArithmeticError::Configuration {
                reason: format!("decimal max_fraction_digits must be at most {MAX_PRECISION}"),
            });
        }
        Ok(Self {
            precision,
            max_fraction_digits,
            strategy: strategy_for(rounding),
        })
    }

    /// Round `value` to at most `precision` significant digits.
    fn fit(&self, value: Decimal, op: &'static str) -> Result<Decimal, ArithmeticError> {
        let digits = digit_count(value.mantissa().unsigned_abs());
        if digits <= self.precision {
            return Ok(value);
        }
        let excess = digits - self.precision;
        let scale = value.scale();
        if excess <= scale {
            return Ok(value.round_dp_with_strategy(scale - excess, self.strategy));
        }

        // Integer digits beyond the precision: round at a power of ten.
        let shift = excess - scale;
        let shifted = Decimal::try_from_i128_with_scale(value.mantissa(), scale + shift)
            .map_err(|_| ArithmeticError::Overflow { op })?;
        let factor = pow10(shift).ok_or(ArithmeticError::Overflow { op })?;
        let factor = Decimal::try_from_i128_with_scale(factor, 0)
            .map_err(|_| ArithmeticError::Overflow { op })?;
        shifted
            .round_dp_with_strategy(0, self.strategy)
            .checked_mul(factor)
            .ok_or(ArithmeticError::Overflow { op })
    }

    fn quantize(&self, value: Decimal, op: &'static str) -> Result<Decimal, ArithmeticError> {
        let rounded = value.round_dp_with_strategy(self.max_fraction_digits, self.strategy);
        self.fit(rounded, op)
    }
}

impl Numeric for DecimalBackend {
    type Repr = Decimal;

    fn parse(&self, literal: &str) -> Result<Decimal, ArithmeticError> {
        let text = literal.trim();
        let invalid = || ArithmeticError::InvalidLiteral {
            literal: literal.to_string(),
        };
        let parsed = if text.contains(['e', 'E']) {
            Decimal::from_scientific(text).map_err(|_| invalid())?
        } else {
            Decimal::from_str_exact(text)
                .or_else(|_| text.parse::<Decimal>())
                .map_err(|_| invalid())?
        };
        self.fit(parsed, "parse")
    }

    fn from_i64(&self, value: i64) -> Result<Decimal, ArithmeticError> {
        self.fit(Decimal::from(value), "from_i64")
    }

    fn add(&self, a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
        let sum = a.checked_add(b).ok_or(ArithmeticError::Overflow { op: "add" })?;
        self.fit(sum, "add")
    }

    fn sub(&self, a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
        let diff = a.checked_sub(b).ok_or(ArithmeticError::Overflow { op: "sub" })?;
        self.fit(diff, "sub")
    }

    fn mul(&self, a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
        let product = a.checked_mul(b).ok_or(ArithmeticError::Overflow { op: "mul" })?;
        self.quantize(product, "mul")
    }

    fn div(&self, a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
        if b.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }
        let quotient = a.checked_div(b).ok_or(ArithmeticError::Overflow { op: "div" })?;
        self.quantize(quotient, "div")
    }

    fn compare(&self, a: Decimal, b: Decimal) -> Ordering {
        a.cmp(&b)
    }

    fn round(&self, a: Decimal, digits: u32) -> Result<Decimal, ArithmeticError> {
        Ok(a.round_dp_with_strategy(digits, self.strategy))
    }

    fn is_zero(&self, a: Decimal) -> bool {
        a.is_zero()
    }

    fn is_negative(&self, a: Decimal) -> bool {
        a.is_sign_negative() && !a.is_zero()
    }

    fn to_f64(&self, a: Decimal) -> f64 {
        a.to_f64().unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn backend(precision: u32, fraction: u32) -> DecimalBackend {
        DecimalBackend::new(precision, fraction, RoundingMode::HalfEven).unwrap()
    }

    #[test]
    fn rejects_out_of_range_precision() {
        assert!(DecimalBackend::new(0, 2, RoundingMode::HalfEven).is_err());
        assert!(DecimalBackend::new(29, 2, RoundingMode::HalfEven).is_err());
        assert!(DecimalBackend::new(10, 29, RoundingMode::HalfEven).is_err());
    }

    #[test]
    fn parse_is_exact() {
        let b = backend(28, 8);
        assert_eq!(b.parse("1.1").unwrap(), dec!(1.1));
        assert_eq!(b.parse("-0.30").unwrap(), dec!(-0.30));
        assert_eq!(b.parse("1.5e2").unwrap(), dec!(150));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(backend(28, 8).parse("1.2.3").is_err());
        assert!(backend(28, 8).parse("").is_err());
    }

    #[test]
    fn addition_is_not_quantized() {
        let b = backend(28, 2);
        assert_eq!(b.add(dec!(0.001), dec!(0.002)).unwrap(), dec!(0.003));
    }

    #[test]
    fn multiplication_is_quantized() {
        let b = backend(28, 2);
        assert_eq!(b.mul(dec!(1.005), dec!(1)).unwrap(), dec!(1.00));
        assert_eq!(b.mul(dec!(1.015), dec!(1)).unwrap(), dec!(1.02));
        assert_eq!(b.mul(dec!(100), dec!(1.1)).unwrap(), dec!(110.0));
    }

    #[test]
    fn division_is_quantized() {
        let b = backend(28, 4);
        assert_eq!(b.div(dec!(1), dec!(3)).unwrap(), dec!(0.3333));
        assert_eq!(b.div(dec!(2), dec!(3)).unwrap(), dec!(0.6667));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(
            backend(28, 4).div(dec!(1), dec!(0)),
            Err(ArithmeticError::DivisionByZero)
        );
    }

    #[test]
    fn precision_limits_significant_digits() {
        let b = backend(4, 8);
        assert_eq!(b.parse("1.23456").unwrap(), dec!(1.235));
        assert_eq!(b.add(dec!(999.9), dec!(0.06)).unwrap(), dec!(1000.0));
        assert_eq!(b.parse("123456").unwrap(), dec!(123500));
    }

    #[test]
    fn rounding_mode_maps_to_strategy() {
        let floor = DecimalBackend::new(28, 1, RoundingMode::Floor).unwrap();
        assert_eq!(floor.mul(dec!(-1.25), dec!(1)).unwrap(), dec!(-1.3));
        let ceiling = DecimalBackend::new(28, 1, RoundingMode::Ceiling).unwrap();
        assert_eq!(ceiling.mul(dec!(-1.25), dec!(1)).unwrap(), dec!(-1.2));
    }

    #[test]
    fn negative_zero_is_not_negative() {
        let b = backend(28, 2);
        assert!(!b.is_negative(dec!(-0)));
        assert!(b.is_negative(dec!(-0.01)));
    }
}
