//! # Fixed-Point Money
//!
//! **NO FLOATING POINT IN CURRENCY**
//!
//! Sale totals, item prices and deposits are `Money`: a u64 holding the
//! value times 1,000,000. Prices enter through decimal strings in the
//! config (`"0.25"`) and never pass through `f64`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use crate::error::{SpawnerError, SpawnerResult};

/// Number of decimal places.
const DECIMAL_PLACES: u32 = 6;

/// The multiplier for 6 decimal places.
const MULTIPLIER: u64 = 10u64.pow(DECIMAL_PLACES);

/// Fixed-point currency amount with 6 decimal places.
///
/// # Range
///
/// - Minimum: 0.000000
/// - Maximum: 18,446,744,073,709.551615
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// One unit (1.000000).
    pub const ONE: Self = Self(MULTIPLIER);

    /// Maximum representable value.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates an amount from a whole number.
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole * MULTIPLIER)
    }

    /// Creates an amount from parts.
    ///
    /// ```rust,ignore
    /// let price = Money::from_parts(3, 250_000); // 3.250000
    /// ```
    #[inline]
    #[must_use]
    pub const fn from_parts(whole: u64, decimal: u32) -> Self {
        Self(whole * MULTIPLIER + (decimal as u64 % MULTIPLIER))
    }

    /// Creates an amount from its raw representation.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw representation.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the whole number part.
    #[inline]
    #[must_use]
    pub const fn whole(self) -> u64 {
        self.0 / MULTIPLIER
    }

    /// Returns the decimal part (0-999999).
    #[inline]
    #[must_use]
    pub const fn decimal(self) -> u32 {
        (self.0 % MULTIPLIER) as u32
    }

    /// Checked addition. Returns `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. Returns `None` if `rhs` is larger.
    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked multiplication by a quantity.
    #[inline]
    #[must_use]
    pub const fn checked_mul_int(self, rhs: u64) -> Option<Self> {
        match self.0.checked_mul(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating addition.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Returns true if zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `self * quantity`, surfacing overflow as an error.
    #[inline]
    pub fn times(self, quantity: u64) -> SpawnerResult<Self> {
        self.checked_mul_int(quantity)
            .ok_or(SpawnerError::ArithmeticOverflow)
    }

    /// Safe addition with error.
    #[inline]
    pub fn safe_add(self, rhs: Self) -> SpawnerResult<Self> {
        self.checked_add(rhs).ok_or(SpawnerError::ArithmeticOverflow)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl FromStr for Money {
    type Err = SpawnerError;

    /// Parses `"12"`, `"12.5"` or `"0.000001"`; more than 6 decimals is an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SpawnerError::InvalidConfig(format!("invalid money amount: {s:?}"));
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > DECIMAL_PLACES as usize
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut decimal: u64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };
        for _ in frac.len()..DECIMAL_PLACES as usize {
            decimal *= 10;
        }
        whole
            .checked_mul(MULTIPLIER)
            .and_then(|w| w.checked_add(decimal))
            .map(Self)
            .ok_or(SpawnerError::ArithmeticOverflow)
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({self})")
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.whole(), self.decimal())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts() {
        let value = Money::from_parts(3, 141_592);
        assert_eq!(value.whole(), 3);
        assert_eq!(value.decimal(), 141_592);
    }

    #[test]
    fn test_parse() {
        assert_eq!("12".parse::<Money>().unwrap(), Money::from_whole(12));
        assert_eq!("0.25".parse::<Money>().unwrap(), Money::from_parts(0, 250_000));
        assert_eq!(".5".parse::<Money>().unwrap(), Money::from_parts(0, 500_000));
        assert!("1.0000001".parse::<Money>().is_err());
        assert!("-1".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn test_times_overflow() {
        assert!(Money::MAX.times(2).is_err());
        assert_eq!(Money::from_parts(0, 500_000).times(3).unwrap(), Money::from_parts(1, 500_000));
    }

    #[test]
    fn test_display() {
        let value = Money::from_parts(42, 123_456);
        assert_eq!(format!("{value}"), "42.123456");
    }
}
