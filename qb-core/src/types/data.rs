//! The ingested event record.
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single observed monetary event.
///
/// Data points are immutable: one instance is created per observed event,
/// consumed exactly once by the aggregation pipeline and discarded after
/// being folded into the running subtotals. The timestamp is the event's own
/// occurrence time, never processing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Monetary amount of the event
    pub value: Decimal,
    /// Customer the event is billed to
    pub customer: String,
    /// Kind of billable event, e.g. a subscription or a one-off purchase
    pub event_type: String,
    /// Category the amount is accounted under, e.g. "video" or "music"
    pub category: String,
}

impl DataPoint {
    /// Create a new data point
    pub fn new(
        timestamp: DateTime<Utc>,
        value: Decimal,
        customer: impl Into<String>,
        event_type: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            value,
            customer: customer.into(),
            event_type: event_type.into(),
            category: category.into(),
        }
    }
}
