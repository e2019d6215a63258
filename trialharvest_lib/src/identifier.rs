//! The registry's numeric record key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifiers are laid out as `Year * 100000 + sequence`.
pub const YEAR_SPAN: u64 = 100_000;

/// A registry identifier such as `202500051`. The leading four digits are
/// the registration year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(u64);

impl Identifier {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The registration year encoded in the leading digits.
    pub const fn year(self) -> u32 {
        (self.0 / YEAR_SPAN) as u32
    }

    /// First identifier of `year` (`YYYY00001`).
    pub const fn year_start(year: u32) -> Self {
        Self(year as u64 * YEAR_SPAN + 1)
    }

    /// First identifier past `year`'s range (`(YYYY+1)00000`).
    pub const fn year_end_exclusive(year: u32) -> Self {
        Self((year as u64 + 1) * YEAR_SPAN)
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn saturating_sub(self, n: u64) -> Self {
        Self(self.0.saturating_sub(n))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identifier {
    type Err = std::num::ParseIntError;

    /// Accepts surrounding whitespace and a trailing `.0`, which spreadsheet
    /// exports sometimes add to numeric columns.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        digits.parse().map(Self)
    }
}

impl From<u64> for Identifier {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_is_leading_four_digits() {
        assert_eq!(Identifier::new(202500051).year(), 2025);
        assert_eq!(Identifier::new(201900001).year(), 2019);
    }

    #[test]
    fn year_bounds() {
        assert_eq!(Identifier::year_start(2020).get(), 202000001);
        assert_eq!(Identifier::year_end_exclusive(2020).get(), 202100000);
    }

    #[test]
    fn parses_spreadsheet_forms() {
        assert_eq!(" 202500051 ".parse::<Identifier>().unwrap().get(), 202500051);
        assert_eq!("202500051.0".parse::<Identifier>().unwrap().get(), 202500051);
        assert!("abc".parse::<Identifier>().is_err());
        assert!("".parse::<Identifier>().is_err());
    }

    #[test]
    fn orders_numerically() {
        let mut ids = vec![Identifier::new(202000010), Identifier::new(99), Identifier::new(202000002)];
        ids.sort();
        assert_eq!(ids, vec![Identifier::new(99), Identifier::new(202000002), Identifier::new(202000010)]);
    }
}
