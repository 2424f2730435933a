//! Ingress: abstract sources of data points.
//!
//! How points arrive (message queue, file, socket) is a concern of the
//! surrounding deployment; the pipeline only requires a pollable sequence
//! which either ends or keeps producing.
use std::iter::Peekable;

use crate::types::DataPoint;

/// A sequence of data points consumed by the ingest router.
pub trait DataPointSource: Send + 'static {
    /// Next point if one is available right now. `None` means "nothing at
    /// the moment", not necessarily end-of-stream.
    fn poll(&mut self) -> Option<DataPoint>;
    /// True once the source will never yield another point
    fn is_finished(&mut self) -> bool;
}

/// A source yielding the values of an iterator, then finishing.
/// Mostly useful for tests and demos.
pub struct IteratorSource(Peekable<Box<dyn Iterator<Item = DataPoint> + Send>>);

impl IteratorSource {
    /// Create a new source from an iterable collection of data points
    pub fn new<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = DataPoint>,
        <I as IntoIterator>::IntoIter: Send + 'static,
    {
        let boxed: Box<dyn Iterator<Item = DataPoint> + Send> = Box::new(iter.into_iter());
        Self(boxed.peekable())
    }
}

impl DataPointSource for IteratorSource {
    fn poll(&mut self) -> Option<DataPoint> {
        self.0.next()
    }

    fn is_finished(&mut self) -> bool {
        self.0.peek().is_none()
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use crate::testing::point;

    use super::*;

    #[test]
    fn yields_all_points_then_finishes() {
        let points = (1..=5)
            .map(|day| point(day, "emma", "sub", "video", day as i64))
            .collect_vec();
        let mut source = IteratorSource::new(points.clone());

        let mut seen = Vec::new();
        while !source.is_finished() {
            if let Some(p) = source.poll() {
                seen.push(p);
            }
        }
        assert_eq!(seen, points);
        assert!(source.poll().is_none());
    }
}
