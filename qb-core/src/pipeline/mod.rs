//! The aggregation pipeline: record validation and the pure fold step.
//!
//! The fold is a deterministic reduction over `(state, point)` with no side
//! effects, so any replay-based recovery strategy composes with it. Summation
//! is commutative: the resulting totals do not depend on arrival order.
use std::cmp::Ordering;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use thiserror::Error;

use crate::types::{DataPoint, MonthlySubtotalByCategory, YearMonth};

/// A data point which cannot be attributed to any aggregate.
///
/// Malformed points are rejected individually; they never corrupt state for
/// other keys or halt ingestion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedInput {
    /// A required key field was empty
    #[error("data point has an empty {0} field")]
    EmptyKeyField(&'static str),
}

/// A data point whose month precedes the bucket currently retained for its
/// key. Only the current month is kept, so the point has no bucket to land
/// in and is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("data point for {observed} arrived after the bucket rolled to {retained}")]
pub struct LateDataPoint {
    /// Month the point belongs to
    pub observed: YearMonth,
    /// Month currently retained for the key
    pub retained: YearMonth,
}

/// Check a data point carries all fields needed to key it
pub fn validate(point: &DataPoint) -> Result<(), MalformedInput> {
    if point.customer.is_empty() {
        return Err(MalformedInput::EmptyKeyField("customer"));
    }
    if point.event_type.is_empty() {
        return Err(MalformedInput::EmptyKeyField("event_type"));
    }
    if point.category.is_empty() {
        return Err(MalformedInput::EmptyKeyField("category"));
    }
    Ok(())
}

/// Fold one data point into the running subtotal of its key.
///
/// The month bucket is derived from the point's own timestamp. A point of a
/// newer month rolls the state over to a fresh empty bucket first; a point of
/// an older month is refused and leaves the state untouched.
pub fn fold_point(
    state: &mut MonthlySubtotalByCategory,
    point: &DataPoint,
) -> Result<(), LateDataPoint> {
    let observed = YearMonth::from(&point.timestamp);
    match observed.cmp(&state.month()) {
        Ordering::Greater => {
            *state = MonthlySubtotalByCategory::new(observed);
            state.add(&point.category, point.value);
            Ok(())
        }
        Ordering::Equal => {
            state.add(&point.category, point.value);
            Ok(())
        }
        Ordering::Less => Err(LateDataPoint {
            observed,
            retained: state.month(),
        }),
    }
}

/// Shared counter of records the pipeline refused to fold, either malformed
/// at ingestion or late for their key's retained month.
#[derive(Debug, Default, Clone)]
pub struct RejectedCounter(Arc<AtomicU64>);

impl RejectedCounter {
    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Number of records rejected so far
    pub fn get(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}
