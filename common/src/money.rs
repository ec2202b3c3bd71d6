//! Fixed-point decimal amounts (two fractional digits). Never binary floating
//! point, per spec §4.3 step 6 — prices and totals are exact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An amount in whole cents. `Display`/`Serialize` render as `"12.34"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(i64);

#[derive(Debug, thiserror::Error)]
pub enum MoneyParseError {
    #[error("invalid decimal amount: {0}")]
    Invalid(String),
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn checked_mul_qty(&self, quantity: i64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Money)
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        let mut total = Money::ZERO;
        for a in amounts {
            total = total.checked_add(a)?;
        }
        Some(total)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let (whole, frac) = (abs / 100, abs % 100);
        if negative {
            write!(f, "-{whole}.{frac:02}")
        } else {
            write!(f, "{whole}.{frac:02}")
        }
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let negative = s.starts_with('-');
        let unsigned = s.strip_prefix('-').unwrap_or(s);

        let mut parts = unsigned.splitn(2, '.');
        let whole_part = parts.next().unwrap_or("");
        let frac_part = parts.next().unwrap_or("0");

        if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyParseError::Invalid(s.to_string()));
        }
        if frac_part.len() > 2 || !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyParseError::Invalid(s.to_string()));
        }

        let whole: i64 = whole_part
            .parse()
            .map_err(|_| MoneyParseError::Invalid(s.to_string()))?;
        let frac: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().unwrap_or(0) * 10,
            _ => frac_part.parse().unwrap_or(0),
        };

        let cents = whole * 100 + frac;
        Ok(Money(if negative { -cents } else { cents }))
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Money> for String {
    fn from(m: Money) -> Self {
        m.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        assert_eq!("10.00".parse::<Money>().unwrap().to_string(), "10.00");
        assert_eq!("7.5".parse::<Money>().unwrap().to_string(), "7.50");
        assert_eq!("0".parse::<Money>().unwrap().to_string(), "0.00");
    }

    #[test]
    fn rejects_garbage() {
        assert!("abc".parse::<Money>().is_err());
        assert!("1.234".parse::<Money>().is_err());
    }

    #[test]
    fn sum_matches_line_totals() {
        let price = "10.00".parse::<Money>().unwrap();
        let line_total = price.checked_mul_qty(2).unwrap();
        assert_eq!(line_total.to_string(), "20.00");

        let other = "7.50".parse::<Money>().unwrap();
        let total = Money::sum([line_total, other]).unwrap();
        assert_eq!(total.to_string(), "27.50");
    }
}
