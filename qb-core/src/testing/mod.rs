//! Fixtures and helpers shared between unit tests.
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use crate::sources::DataPointSource;
use crate::types::DataPoint;

/// Install a test subscriber so runs with `--nocapture` show the job's
/// tracing output
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A data point on the given day of May 2024
pub(crate) fn point(
    day: u32,
    customer: &str,
    event_type: &str,
    category: &str,
    value: i64,
) -> DataPoint {
    let timestamp = Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap();
    DataPoint::new(
        timestamp,
        Decimal::from(value),
        customer,
        event_type,
        category,
    )
}

/// A source backed by a channel, for feeding points into a running job.
/// Finishes once the sender is dropped and the channel drained.
pub(crate) struct ChannelSource(pub(crate) flume::Receiver<DataPoint>);

impl DataPointSource for ChannelSource {
    fn poll(&mut self) -> Option<DataPoint> {
        self.0.try_recv().ok()
    }

    fn is_finished(&mut self) -> bool {
        self.0.is_disconnected() && self.0.is_empty()
    }
}
