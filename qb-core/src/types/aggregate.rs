//! The running aggregate held per key.
use std::fmt::Display;

use chrono::{DateTime, Datelike, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A calendar month, derived from a data point's own timestamp
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct YearMonth {
    /// Calendar year
    pub year: i32,
    /// Month of year, 1-based
    pub month: u32,
}

impl From<&DateTime<Utc>> for YearMonth {
    fn from(timestamp: &DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Running per-category sums for one key in one month.
///
/// For a fixed key and month, the total of a category equals the sum of
/// `value` over all data points with that key and category observed so far
/// in that month. Categories not yet seen are absent from the map, never
/// present with a zero value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySubtotalByCategory {
    month: YearMonth,
    totals: IndexMap<String, Decimal>,
}

impl MonthlySubtotalByCategory {
    pub(crate) fn new(month: YearMonth) -> Self {
        Self {
            month,
            totals: IndexMap::new(),
        }
    }

    /// The month this aggregate covers
    pub fn month(&self) -> YearMonth {
        self.month
    }

    /// Running sum per category
    pub fn totals(&self) -> &IndexMap<String, Decimal> {
        &self.totals
    }

    pub(crate) fn add(&mut self, category: &str, value: Decimal) {
        *self
            .totals
            .entry(category.to_owned())
            .or_insert(Decimal::ZERO) += value;
    }
}
