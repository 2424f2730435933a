//! Value types shared by the pipeline, the state store and the query layer.
mod aggregate;
mod data;
mod dimension;

pub use aggregate::{MonthlySubtotalByCategory, YearMonth};
pub use data::DataPoint;
pub use dimension::{Dimension, PER_CUSTOMER_STATE_NAME, PER_EVENT_TYPE_STATE_NAME};

/// Identifies one partition worker within a running job
pub type PartitionId = u64;
