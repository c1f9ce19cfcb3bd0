//! Fixed-point decimal values for thresholds and computed coverage values.

use crate::result::{CovError, CovResult};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Digits kept after the decimal point
pub const MAX_SCALE: u8 = 6;

const UNIT: i64 = 1_000_000;

/// Decimal with six fractional digits and a display scale.
///
/// Comparison and hashing look at the value only; `scale` only decides how
/// many fractional digits [`fmt::Display`] prints, so a count prints as `8`
/// and a rate as `0.076923`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    micros: i64,
    scale: u8,
}

impl Decimal {
    /// Zero
    pub const ZERO: Self = Self {
        micros: 0,
        scale: 0,
    };

    /// Whole number
    #[must_use]
    pub const fn from_count(count: u64) -> Self {
        let micros = if count > (i64::MAX / UNIT) as u64 {
            i64::MAX
        } else {
            count as i64 * UNIT
        };
        Self { micros, scale: 0 }
    }

    /// `numerator / denominator` rounded half-up to six digits; zero when
    /// `denominator` is zero
    #[must_use]
    pub fn ratio(numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            return Self::from_micros(0, MAX_SCALE);
        }
        let den = u128::from(denominator);
        let scaled = u128::from(numerator) * UNIT as u128 * 2 + den;
        let micros = i64::try_from(scaled / (den * 2)).unwrap_or(i64::MAX);
        Self::from_micros(micros, MAX_SCALE)
    }

    /// Value in millionths
    #[must_use]
    pub const fn from_micros(micros: i64, scale: u8) -> Self {
        let scale = if scale > MAX_SCALE { MAX_SCALE } else { scale };
        Self { micros, scale }
    }

    /// `1 - self`, at full scale
    #[must_use]
    pub const fn complement(self) -> Self {
        Self::from_micros(UNIT.saturating_sub(self.micros), MAX_SCALE)
    }

    /// Value in millionths
    #[must_use]
    pub const fn micros(&self) -> i64 {
        self.micros
    }

    /// Printed fractional digits
    #[must_use]
    pub const fn scale(&self) -> u8 {
        self.scale
    }

    const fn negate(self) -> Self {
        Self {
            micros: -self.micros,
            scale: self.scale,
        }
    }

    /// Approximate floating point value
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.micros as f64 / UNIT as f64
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.micros == other.micros
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.micros.cmp(&other.micros)
    }
}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.micros.hash(state);
    }
}

impl From<u32> for Decimal {
    fn from(count: u32) -> Self {
        Self::from_count(u64::from(count))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.micros < 0 { "-" } else { "" };
        let abs = self.micros.unsigned_abs();
        let whole = abs / UNIT as u64;
        let frac = abs % UNIT as u64;
        if self.scale == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = frac / 10u64.pow(u32::from(MAX_SCALE - self.scale));
        write!(f, "{sign}{whole}.{digits:0width$}", width = usize::from(self.scale))
    }
}

impl FromStr for Decimal {
    type Err = CovError;

    /// Parse `[-]digits[.digits]`; digits beyond the sixth fractional one
    /// round half-up
    fn from_str(input: &str) -> CovResult<Self> {
        let invalid = || CovError::InvalidDecimal {
            input: input.to_string(),
        };
        let trimmed = input.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(invalid());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut micros: i64 = 0;
        for (idx, digit) in frac.bytes().take(usize::from(MAX_SCALE)).enumerate() {
            let weight = 10i64.pow(u32::from(MAX_SCALE) - 1 - idx as u32);
            micros += i64::from(digit - b'0') * weight;
        }
        if frac.as_bytes().get(usize::from(MAX_SCALE)).is_some_and(|&d| d >= b'5') {
            micros += 1;
        }
        let micros = whole
            .checked_mul(UNIT)
            .and_then(|w| w.checked_add(micros))
            .ok_or_else(invalid)?;
        let scale = frac.len().min(usize::from(MAX_SCALE)) as u8;
        Ok(Self::from_micros(if negative { -micros } else { micros }, scale))
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalVisitor)
    }
}

struct DecimalVisitor;

impl Visitor<'_> for DecimalVisitor {
    type Value = Decimal;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal number or numeric string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Decimal, E> {
        Ok(Decimal::from_count(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Decimal, E> {
        if value < 0 {
            return Ok(Decimal::from_count(value.unsigned_abs()).negate());
        }
        Ok(Decimal::from_count(value.unsigned_abs()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Decimal, E> {
        if !value.is_finite() {
            return Err(E::custom(format!("non-finite decimal {value}")));
        }
        value.to_string().parse().map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Decimal, E> {
        value.parse().map_err(E::custom)
    }
}
