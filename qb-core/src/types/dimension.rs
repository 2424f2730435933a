//! The two independent keyings under which subtotals are maintained.
use serde::{Deserialize, Serialize};

use super::DataPoint;

/// Name of the logical state registry holding per-customer subtotals
pub const PER_CUSTOMER_STATE_NAME: &str = "per-customer-subtotals";
/// Name of the logical state registry holding per-event-type subtotals
pub const PER_EVENT_TYPE_STATE_NAME: &str = "per-event-type-subtotals";

/// One of the two ways data points are grouped into aggregates.
///
/// Each dimension owns an independent set of state entries. Both are derived
/// from the same input stream, but an update under one dimension never
/// affects the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// Key the aggregate by the point's customer id
    ByCustomer,
    /// Key the aggregate by the point's event type
    ByEventType,
}

impl Dimension {
    /// Both dimensions, in the order they are folded
    pub const ALL: [Dimension; 2] = [Dimension::ByCustomer, Dimension::ByEventType];

    /// Extract the grouping key of this dimension from a data point
    pub fn key_of<'a>(&self, point: &'a DataPoint) -> &'a str {
        match self {
            Dimension::ByCustomer => &point.customer,
            Dimension::ByEventType => &point.event_type,
        }
    }

    /// Name of the state registry this dimension's entries live in
    pub fn state_name(&self) -> &'static str {
        match self {
            Dimension::ByCustomer => PER_CUSTOMER_STATE_NAME,
            Dimension::ByEventType => PER_EVENT_TYPE_STATE_NAME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::point;

    #[test]
    fn key_follows_dimension() {
        let p = point(5, "emma", "subscription", "video", 10);
        assert_eq!(Dimension::ByCustomer.key_of(&p), "emma");
        assert_eq!(Dimension::ByEventType.key_of(&p), "subscription");
    }
}
