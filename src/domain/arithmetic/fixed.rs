//! Fast-decimal backend: a signed 128-bit mantissa at a constant scale.
//!
//! The scale equals `max_fraction_digits`, so every value is an integer count
//! of `10^-scale` units. Addition and subtraction are exact; multiplication and
//! division round back to the scale with the configured mode. `precision`
//! bounds the total number of mantissa digits.

use std::cmp::Ordering;

use super::Numeric;
use super::rounding::{Discarded, RoundingMode, digit_count, div_round, mul_div_round, pow10};
use crate::domain::error::ArithmeticError;

pub(crate) const MAX_PRECISION: u32 = 38;

#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedBackend {
    scale: u32,
    precision: u32,
    rounding: RoundingMode,
    unit: i128,
}

impl FixedBackend {
    pub(crate) fn new(
        precision: u32,
        scale: u32,
        rounding: RoundingMode,
    ) -> Result<Self, ArithmeticError> {
        if precision == 0 || precision > MAX_PRECISION {
            return Err(ArithmeticError::Configuration {
                reason: format!("fast decimal precision must be between 1 and {MAX_PRECISION}"),
            });
        }
        if scale >= precision {
            return Err(ArithmeticError::Configuration {
                reason: "fast decimal max_fraction_digits must be below precision".to_string(),
            });
        }
        let unit = pow10(scale).ok_or_else(|| ArithmeticError::Configuration {
            reason: "fast decimal scale out of range".to_string(),
        })?;
        Ok(Self {
            scale,
            precision,
            rounding,
            unit,
        })
    }

    pub(crate) fn scale(&self) -> u32 {
        self.scale
    }

    fn bounded(&self, mantissa: i128, op: &'static str) -> Result<i128, ArithmeticError> {
        if digit_count(mantissa.unsigned_abs()) > self.precision {
            return Err(ArithmeticError::Overflow { op });
        }
        Ok(mantissa)
    }
}

/// Parse a decimal literal straight into a mantissa at `scale`, rounding any
/// digits beyond the scale with `mode`. Never goes through binary floats.
pub(crate) fn parse_fixed(
    literal: &str,
    scale: u32,
    mode: RoundingMode,
) -> Result<i128, ArithmeticError> {
    let invalid = || ArithmeticError::InvalidLiteral {
        literal: literal.to_string(),
    };
    let overflow = ArithmeticError::Overflow { op: "parse" };

    let text = literal.trim();
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (number, exponent) = match body.find(['e', 'E']) {
        Some(pos) => {
            let exponent: i64 = body[pos + 1..].parse().map_err(|_| invalid())?;
            (&body[..pos], exponent)
        }
        None => (body, 0),
    };
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes())
        .map(|b| b - b'0')
        .collect();
    // Index of the first digit that falls below the target scale.
    let point = i64::try_from(int_part.len())
        .ok()
        .and_then(|len| len.checked_add(exponent))
        .and_then(|p| p.checked_add(i64::from(scale)))
        .ok_or(overflow.clone())?;
    let kept = point.clamp(0, digits.len() as i64) as usize;

    let mut mantissa: i128 = 0;
    for &digit in &digits[..kept] {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit)))
            .ok_or(overflow.clone())?;
    }
    if point > digits.len() as i64 && mantissa != 0 {
        let zeros = u32::try_from(point - digits.len() as i64).map_err(|_| overflow.clone())?;
        let factor = pow10(zeros).ok_or(overflow.clone())?;
        mantissa = mantissa.checked_mul(factor).ok_or(overflow.clone())?;
    }

    let discarded = if point < 0 {
        if digits.iter().any(|&d| d != 0) {
            Discarded::BelowHalf
        } else {
            Discarded::Zero
        }
    } else {
        Discarded::from_digits(&digits[kept..])
    };
    if mode.rounds_away(negative, discarded, mantissa % 2 != 0) {
        mantissa = mantissa.checked_add(1).ok_or(overflow)?;
    }

    Ok(if negative { -mantissa } else { mantissa })
}

/// Render a mantissa at `scale` as a plain decimal string.
pub(crate) fn format_fixed(mantissa: i128, scale: u32) -> String {
    let magnitude = mantissa.unsigned_abs().to_string();
    let sign = if mantissa < 0 { "-" } else { "" };
    if scale == 0 {
        return format!("{sign}{magnitude}");
    }
    let width = scale as usize + 1;
    let padded = format!("{magnitude:0>width$}");
    let (int_part, frac_part) = padded.split_at(padded.len() - scale as usize);
    format!("{sign}{int_part}.{frac_part}")
}

impl Numeric for FixedBackend {
    type Repr = i128;

    fn parse(&self, literal: &str) -> Result<i128, ArithmeticError> {
        let mantissa = parse_fixed(literal, self.scale, self.rounding)?;
        self.bounded(mantissa, "parse")
    }

    fn from_i64(&self, value: i64) -> Result<i128, ArithmeticError> {
        let mantissa = i128::from(value)
            .checked_mul(self.unit)
            .ok_or(ArithmeticError::Overflow { op: "from_i64" })?;
        self.bounded(mantissa, "from_i64")
    }

    fn add(&self, a: i128, b: i128) -> Result<i128, ArithmeticError> {
        let sum = a.checked_add(b).ok_or(ArithmeticError::Overflow { op: "add" })?;
        self.bounded(sum, "add")
    }

    fn sub(&self, a: i128, b: i128) -> Result<i128, ArithmeticError> {
        let diff = a.checked_sub(b).ok_or(ArithmeticError::Overflow { op: "sub" })?;
        self.bounded(diff, "sub")
    }

    fn mul(&self, a: i128, b: i128) -> Result<i128, ArithmeticError> {
        let rounded = mul_div_round(a, b, self.unit, self.rounding, "mul")?;
        self.bounded(rounded, "mul")
    }

    fn div(&self, a: i128, b: i128) -> Result<i128, ArithmeticError> {
        if b == 0 {
            return Err(ArithmeticError::DivisionByZero);
        }
        let rounded = mul_div_round(a, self.unit, b, self.rounding, "div")?;
        self.bounded(rounded, "div")
    }

    fn compare(&self, a: i128, b: i128) -> Ordering {
        a.cmp(&b)
    }

    fn round(&self, a: i128, digits: u32) -> Result<i128, ArithmeticError> {
        if digits >= self.scale {
            return Ok(a);
        }
        let factor = pow10(self.scale - digits).ok_or(ArithmeticError::Overflow { op: "round" })?;
        div_round(a, factor, self.rounding)?
            .checked_mul(factor)
            .ok_or(ArithmeticError::Overflow { op: "round" })
    }

    fn is_zero(&self, a: i128) -> bool {
        a == 0
    }

    fn is_negative(&self, a: i128) -> bool {
        a < 0
    }

    fn to_f64(&self, a: i128) -> f64 {
        a as f64 / self.unit as f64
    }
}
