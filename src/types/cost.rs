//! Fixed-point monetary amounts
//!
//! Costs reported by the agent CLI arrive as JSON numbers in US dollars.
//! They are converted from their decimal text into whole micro-dollars, so
//! accumulation never drifts and no digit is silently truncated: anything
//! below one micro-dollar is rounded half away from zero.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Number of fractional digits kept
pub const COST_SCALE: u32 = 6;

const MICROS_PER_UNIT: i64 = 1_000_000;

/// Monetary amount in micro-dollars
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cost(i64);

impl Cost {
    /// Zero cost
    pub const ZERO: Self = Self(0);

    /// Build a cost from whole micro-dollars
    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Raw value in micro-dollars
    #[must_use]
    pub const fn micros(self) -> i64 {
        self.0
    }

    /// `true` when the amount is exactly zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parse a decimal literal such as `0.0123`, `-4`, or `1.5e-3`
    ///
    /// Returns `None` for malformed text or amounts that do not fit.
    #[must_use]
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, body) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };

        let (mantissa, exponent) = match body.find(['e', 'E']) {
            Some(idx) => (&body[..idx], body[idx + 1..].parse::<i32>().ok()?),
            None => (body, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let digits: String = format!("{int_part}{frac_part}");
        let digits = digits.trim_start_matches('0');
        let frac_len = i32::try_from(frac_part.len()).ok()?;
        // value = digits * 10^(exponent - frac_len); micros = value * 10^6
        let shift = exponent
            .checked_sub(frac_len)?
            .checked_add(COST_SCALE as i32)?;

        let magnitude = if digits.is_empty() {
            0
        } else if shift >= 0 {
            let base: i128 = digits.parse().ok()?;
            let factor = 10_i128.checked_pow(u32::try_from(shift).ok()?)?;
            base.checked_mul(factor)?
        } else {
            let cut = usize::try_from(shift.checked_neg()?).ok()?;
            if cut > digits.len() {
                0
            } else {
                let keep = &digits[..digits.len() - cut];
                let round_digit = digits.as_bytes()[digits.len() - cut] - b'0';
                let base: i128 = if keep.is_empty() { 0 } else { keep.parse().ok()? };
                if round_digit >= 5 { base + 1 } else { base }
            }
        };

        let signed = if negative { -magnitude } else { magnitude };
        i64::try_from(signed).ok().map(Self)
    }

    /// Convert a JSON number by way of its decimal text
    #[must_use]
    pub fn from_json_number(number: &serde_json::Number) -> Option<Self> {
        Self::parse_decimal(&number.to_string())
    }

    /// Subtract, clamping at zero
    #[must_use]
    pub fn saturating_delta(self, earlier: Self) -> Self {
        Self(self.0.saturating_sub(earlier.0).max(0))
    }

    /// Render as dollars and cents (`$0.07`), rounding half away from zero
    #[must_use]
    pub fn display_usd(self) -> String {
        let per_cent = MICROS_PER_UNIT / 100;
        let magnitude = self.0.unsigned_abs();
        let cents = (magnitude + (per_cent as u64) / 2) / per_cent as u64;
        let sign = if self.0 < 0 && cents > 0 { "-" } else { "" };
        format!("{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / MICROS_PER_UNIT as u64;
        let frac = format!("{:06}", magnitude % MICROS_PER_UNIT as u64);
        let frac = frac.trim_end_matches('0');
        if frac.len() < 2 {
            write!(f, "{sign}{whole}.{frac:0<2}")
        } else {
            write!(f, "{sign}{whole}.{frac}")
        }
    }
}

impl Add for Cost {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Serialize for Cost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CostVisitor;

        impl Visitor<'_> for CostVisitor {
            type Value = Cost;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal amount as string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Cost, E> {
                Cost::parse_decimal(v).ok_or_else(|| E::custom(format!("invalid amount: {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cost, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cost, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Cost, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(CostVisitor)
    }
}
