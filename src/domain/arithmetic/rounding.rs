//! Rounding modes and integer rounding helpers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::ArithmeticError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoundingMode {
    #[default]
    HalfEven,
    HalfAwayFromZero,
    Up,
    Down,
    Ceiling,
    Floor,
    HalfTowardsZero,
}

/// How the digits dropped by a rounding step compare to half a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discarded {
    Zero,
    BelowHalf,
    Half,
    AboveHalf,
}

impl Discarded {
    /// Classify a run of dropped decimal digits, most significant first.
    pub(crate) fn from_digits(digits: &[u8]) -> Self {
        let Some((&first, rest)) = digits.split_first() else {
            return Discarded::Zero;
        };
        let tail_nonzero = rest.iter().any(|&d| d != 0);
        match first {
            0 if !tail_nonzero => Discarded::Zero,
            0..=4 => Discarded::BelowHalf,
            5 if !tail_nonzero => Discarded::Half,
            _ => Discarded::AboveHalf,
        }
    }
}

impl RoundingMode {
    pub const ALL: [RoundingMode; 7] = [
        RoundingMode::HalfEven,
        RoundingMode::HalfAwayFromZero,
        RoundingMode::Up,
        RoundingMode::Down,
        RoundingMode::Ceiling,
        RoundingMode::Floor,
        RoundingMode::HalfTowardsZero,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoundingMode::HalfEven => "half_even",
            RoundingMode::HalfAwayFromZero => "half_away_from_zero",
            RoundingMode::Up => "up",
            RoundingMode::Down => "down",
            RoundingMode::Ceiling => "ceiling",
            RoundingMode::Floor => "floor",
            RoundingMode::HalfTowardsZero => "half_towards_zero",
        }
    }

    /// Whether a magnitude truncated towards zero must be bumped by one unit.
    pub(crate) fn rounds_away(self, negative: bool, discarded: Discarded, odd: bool) -> bool {
        if discarded == Discarded::Zero {
            return false;
        }
        match self {
            RoundingMode::Down => false,
            RoundingMode::Up => true,
            RoundingMode::Ceiling => !negative,
            RoundingMode::Floor => negative,
            RoundingMode::HalfAwayFromZero => discarded != Discarded::BelowHalf,
            RoundingMode::HalfTowardsZero => discarded == Discarded::AboveHalf,
            RoundingMode::HalfEven => {
                discarded == Discarded::AboveHalf || (discarded == Discarded::Half && odd)
            }
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundingMode {
    type Err = ArithmeticError;

    /// Accepts snake case names as well as the `ROUND_*` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let key: String = lowered
            .strip_prefix("round_")
            .unwrap_or(&lowered)
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect();
        match key.as_str() {
            "halfeven" => Ok(RoundingMode::HalfEven),
            "halfawayfromzero" | "halfup" => Ok(RoundingMode::HalfAwayFromZero),
            "up" => Ok(RoundingMode::Up),
            "down" => Ok(RoundingMode::Down),
            "ceiling" => Ok(RoundingMode::Ceiling),
            "floor" => Ok(RoundingMode::Floor),
            "halftowardszero" | "halfdown" => Ok(RoundingMode::HalfTowardsZero),
            _ => Err(ArithmeticError::Configuration {
                reason: format!("unknown rounding mode {s:?}"),
            }),
        }
    }
}

pub(crate) fn pow10(exponent: u32) -> Option<i128> {
    10i128.checked_pow(exponent)
}

/// Number of decimal digits in `magnitude`; zero counts as one digit.
pub(crate) fn digit_count(magnitude: u128) -> u32 {
    magnitude.checked_ilog10().map_or(1, |log| log + 1)
}

/// Integer division rounded with `mode`.
pub(crate) fn div_round(
    numerator: i128,
    divisor: i128,
    mode: RoundingMode,
) -> Result<i128, ArithmeticError> {
    if divisor == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    let quotient = numerator
        .checked_div(divisor)
        .ok_or(ArithmeticError::Overflow { op: "div" })?;
    let remainder = numerator
        .checked_rem(divisor)
        .ok_or(ArithmeticError::Overflow { op: "div" })?;
    if remainder == 0 {
        return Ok(quotient);
    }

    let negative = (numerator < 0) != (divisor < 0);
    let rem = remainder.unsigned_abs();
    let rest = divisor.unsigned_abs() - rem;
    let discarded = match rem.cmp(&rest) {
        Ordering::Less => Discarded::BelowHalf,
        Ordering::Equal => Discarded::Half,
        Ordering::Greater => Discarded::AboveHalf,
    };

    if mode.rounds_away(negative, discarded, quotient % 2 != 0) {
        let step = if negative { -1 } else { 1 };
        quotient
            .checked_add(step)
            .ok_or(ArithmeticError::Overflow { op: "div" })
    } else {
        Ok(quotient)
    }
}

/// Full 256-bit product of two magnitudes as `(high, low)` halves.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);
    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;
    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let low = (mid << 64) | (ll & MASK);
    let high = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (high, low)
}

/// Shift-subtract division of `(high, low)` by `divisor`, returning the
/// quotient and remainder. `None` when the quotient needs more than 128 bits.
fn widening_div(high: u128, low: u128, divisor: u128) -> Option<(u128, u128)> {
    if divisor == 0 || high >= divisor {
        return None;
    }
    let mut rem = high;
    let mut quot = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quot <<= 1;
        if carry == 1 || rem >= divisor {
            rem = rem.wrapping_sub(divisor);
            quot |= 1;
        }
    }
    Some((quot, rem))
}

/// `a * b / divisor` rounded with `mode`. The product is kept at 256 bits, so
/// only a quotient that does not fit in `i128` overflows.
pub(crate) fn mul_div_round(
    a: i128,
    b: i128,
    divisor: i128,
    mode: RoundingMode,
    op: &'static str,
) -> Result<i128, ArithmeticError> {
    if divisor == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    if a == 0 || b == 0 {
        return Ok(0);
    }
    let negative = ((a < 0) ^ (b < 0)) ^ (divisor < 0);
    let divisor = divisor.unsigned_abs();
    let (high, low) = widening_mul(a.unsigned_abs(), b.unsigned_abs());
    let (quotient, rem) = widening_div(high, low, divisor).ok_or(ArithmeticError::Overflow { op })?;

    let discarded = if rem == 0 {
        Discarded::Zero
    } else {
        match rem.cmp(&(divisor - rem)) {
            Ordering::Less => Discarded::BelowHalf,
            Ordering::Equal => Discarded::Half,
            Ordering::Greater => Discarded::AboveHalf,
        }
    };
    let mut magnitude = quotient;
    if mode.rounds_away(negative, discarded, quotient % 2 != 0) {
        magnitude = magnitude
            .checked_add(1)
            .ok_or(ArithmeticError::Overflow { op })?;
    }
    let signed = i128::try_from(magnitude).map_err(|_| ArithmeticError::Overflow { op })?;
    Ok(if negative { -signed } else { signed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("half_even".parse::<RoundingMode>().unwrap(), RoundingMode::HalfEven);
        assert_eq!(
            "ROUND_HALF_UP".parse::<RoundingMode>().unwrap(),
            RoundingMode::HalfAwayFromZero
        );
        assert_eq!(
            "half-down".parse::<RoundingMode>().unwrap(),
            RoundingMode::HalfTowardsZero
        );
        assert_eq!("Ceiling".parse::<RoundingMode>().unwrap(), RoundingMode::Ceiling);
        assert!("sideways".parse::<RoundingMode>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for mode in RoundingMode::ALL {
            assert_eq!(mode.to_string().parse::<RoundingMode>().unwrap(), mode);
        }
    }

    #[test]
    fn classify_discarded_digits() {
        assert_eq!(Discarded::from_digits(&[]), Discarded::Zero);
        assert_eq!(Discarded::from_digits(&[0, 0]), Discarded::Zero);
        assert_eq!(Discarded::from_digits(&[0, 1]), Discarded::BelowHalf);
        assert_eq!(Discarded::from_digits(&[4, 9]), Discarded::BelowHalf);
        assert_eq!(Discarded::from_digits(&[5]), Discarded::Half);
        assert_eq!(Discarded::from_digits(&[5, 0, 1]), Discarded::AboveHalf);
        assert_eq!(Discarded::from_digits(&[9]), Discarded::AboveHalf);
    }

    #[test]
    fn div_round_half_even_ties() {
        assert_eq!(div_round(25, 10, RoundingMode::HalfEven).unwrap(), 2);
        assert_eq!(div_round(35, 10, RoundingMode::HalfEven).unwrap(), 4);
        assert_eq!(div_round(-25, 10, RoundingMode::HalfEven).unwrap(), -2);
        assert_eq!(div_round(26, 10, RoundingMode::HalfEven).unwrap(), 3);
    }

    #[test]
    fn div_round_every_mode_on_positive_tie() {
        let expected = [
            (RoundingMode::HalfEven, 2),
            (RoundingMode::HalfAwayFromZero, 3),
            (RoundingMode::Up, 3),
            (RoundingMode::Down, 2),
            (RoundingMode::Ceiling, 3),
            (RoundingMode::Floor, 2),
            (RoundingMode::HalfTowardsZero, 2),
        ];
        for (mode, want) in expected {
            assert_eq!(div_round(25, 10, mode).unwrap(), want, "{mode}");
        }
    }

    #[test]
    fn div_round_every_mode_on_negative_value() {
        let expected = [
            (RoundingMode::HalfEven, -1),
            (RoundingMode::HalfAwayFromZero, -1),
            (RoundingMode::Up, -2),
            (RoundingMode::Down, -1),
            (RoundingMode::Ceiling, -1),
            (RoundingMode::Floor, -2),
            (RoundingMode::HalfTowardsZero, -1),
        ];
        for (mode, want) in expected {
            assert_eq!(div_round(-13, 10, mode).unwrap(), want, "{mode}");
        }
    }

    #[test]
    fn div_round_exact_is_untouched() {
        for mode in RoundingMode::ALL {
            assert_eq!(div_round(40, 10, mode).unwrap(), 4);
        }
    }

    #[test]
    fn div_round_by_zero() {
        assert_eq!(
            div_round(1, 0, RoundingMode::HalfEven),
            Err(ArithmeticError::DivisionByZero)
        );
    }

    #[test]
    fn digit_counts() {
        assert_eq!(digit_count(0), 1);
        assert_eq!(digit_count(9), 1);
        assert_eq!(digit_count(10), 2);
        assert_eq!(digit_count(12345), 5);
    }

    #[test]
    fn widening_product_of_extremes() {
        assert_eq!(widening_mul(u128::MAX, u128::MAX), (u128::MAX - 1, 1));
        assert_eq!(widening_mul(1 << 64, 1 << 64), (1, 0));
        assert_eq!(widening_div(u128::MAX - 1, 1, u128::MAX), Some((u128::MAX, 0)));
        assert_eq!(widening_div(1, 0, 1), None);
    }

    #[test]
    fn mul_div_round_beyond_i128_intermediate() {
        let thousand = 1_000 * 10i128.pow(18);
        let rate = 11 * 10i128.pow(17);
        let unit = 10i128.pow(18);
        assert_eq!(
            mul_div_round(thousand, rate, unit, RoundingMode::HalfEven, "mul").unwrap(),
            1_100 * 10i128.pow(18)
        );
        assert_eq!(
            mul_div_round(-thousand, rate, unit, RoundingMode::HalfEven, "mul").unwrap(),
            -1_100 * 10i128.pow(18)
        );
    }

    #[test]
    fn mul_div_round_rounds_like_div_round() {
        for mode in RoundingMode::ALL {
            for (a, b, d) in [(5, 5, 10), (-13, 1, 10), (7, 3, -4), (2, 1, 3)] {
                assert_eq!(
                    mul_div_round(a, b, d, mode, "mul").unwrap(),
                    div_round(a * b, d, mode).unwrap(),
                    "{a}*{b}/{d} {mode}"
                );
            }
        }
    }

    #[test]
    fn mul_div_round_overflowing_quotient() {
        assert_eq!(
            mul_div_round(i128::MAX, 4, 2, RoundingMode::HalfEven, "mul"),
            Err(ArithmeticError::Overflow { op: "mul" })
        );
        assert_eq!(
            mul_div_round(1, 1, 0, RoundingMode::HalfEven, "div"),
            Err(ArithmeticError::DivisionByZero)
        );
    }
}
