//! Point lookups against live partition state.
//!
//! A query is routed to the partition owning the key (same rendezvous hash
//! the ingest router uses), answered from that partition's live state and
//! returned serialized, to be decoded client-side. Queries are strictly
//! read-only: a miss returns [QueryError::KeyNotFound] and never creates an
//! entry.
//!
//! Results are "recent, not linearizable": a lookup racing an in-flight
//! update may trail by that update. Repeating a query has no side effects;
//! two calls only differ if the underlying state changed in between.
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tracing::debug;

use crate::partitioners::rendezvous_select;
use crate::runtime::PartitionMessage;
use crate::snapshot::deserialize_state;
use crate::types::{Dimension, MonthlySubtotalByCategory, PartitionId};

/// How long a lookup waits for the owning partition by default
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A single lookup sent to the partition owning the key. The reply channel
/// is the lookup's only resource; it is dropped on every exit path.
pub(crate) struct QueryRequest {
    pub(crate) dimension: Dimension,
    pub(crate) key: String,
    pub(crate) reply: flume::Sender<Option<Vec<u8>>>,
}

/// Why a lookup did not produce an aggregate.
///
/// `KeyNotFound` is a valid empty result. The other variants are transient:
/// the caller may retry.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The key has never been observed in any data point
    #[error("key {0:?} has not been observed in any data point")]
    KeyNotFound(String),
    /// The owning partition did not answer within the configured bound
    #[error("owning partition did not answer within {0:?}")]
    QueryTimeout(Duration),
    /// No partition currently owns the key's address space, e.g. while the
    /// topology is unknown or rebalancing
    #[error("no partition currently owns the key's address space")]
    RoutingFailure,
}

/// Read-only access to the running aggregates of a live job.
///
/// Clients are cheap to clone and may issue any number of concurrent
/// queries; no query blocks another and none throttles ingestion.
#[derive(Debug, Clone)]
pub struct QueryClient {
    routes: IndexMap<PartitionId, flume::Sender<PartitionMessage>>,
    partitions: IndexSet<PartitionId>,
    timeout: Duration,
}

impl QueryClient {
    pub(crate) fn new(
        routes: IndexMap<PartitionId, flume::Sender<PartitionMessage>>,
        timeout: Duration,
    ) -> Self {
        let partitions = routes.keys().copied().collect();
        Self {
            routes,
            partitions,
            timeout,
        }
    }

    /// Current monthly subtotal per category for one customer
    pub fn query_customer(&self, customer: &str) -> Result<MonthlySubtotalByCategory, QueryError> {
        self.query(Dimension::ByCustomer, customer)
    }

    /// Current monthly subtotal per category for one event type
    pub fn query_type(&self, event_type: &str) -> Result<MonthlySubtotalByCategory, QueryError> {
        self.query(Dimension::ByEventType, event_type)
    }

    fn query(
        &self,
        dimension: Dimension,
        key: &str,
    ) -> Result<MonthlySubtotalByCategory, QueryError> {
        if key.is_empty() {
            // an empty key can never have been observed
            return Err(QueryError::KeyNotFound(String::new()));
        }
        if self.partitions.is_empty() {
            return Err(QueryError::RoutingFailure);
        }
        let owner = rendezvous_select(&key, &self.partitions);
        debug!(key, ?dimension, owner, "routing query");
        let sender = self
            .routes
            .get(&owner)
            .expect("routes and partitions share keys");

        let (reply_tx, reply_rx) = flume::bounded(1);
        let request = QueryRequest {
            dimension,
            key: key.to_owned(),
            reply: reply_tx,
        };
        sender
            .send(PartitionMessage::Query(request))
            .map_err(|_| QueryError::RoutingFailure)?;

        match reply_rx.recv_timeout(self.timeout) {
            Ok(Some(encoded)) => Ok(deserialize_state(encoded)),
            Ok(None) => Err(QueryError::KeyNotFound(key.to_owned())),
            Err(flume::RecvTimeoutError::Timeout) => Err(QueryError::QueryTimeout(self.timeout)),
            Err(flume::RecvTimeoutError::Disconnected) => Err(QueryError::RoutingFailure),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn client_with_route(
        timeout: Duration,
    ) -> (QueryClient, flume::Receiver<PartitionMessage>) {
        let (tx, rx) = flume::unbounded();
        let routes = IndexMap::from_iter([(0, tx)]);
        (QueryClient::new(routes, timeout), rx)
    }

    /// a partition which holds the request without answering must surface a
    /// timeout within the configured bound, never hang
    #[test]
    fn unresponsive_partition_times_out() {
        let timeout = Duration::from_millis(200);
        let (client, _inbox) = client_with_route(timeout);

        let started = Instant::now();
        let result = client.query_customer("emma");
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(QueryError::QueryTimeout(_))));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout * 10);
    }

    #[test]
    fn dead_partition_is_a_routing_failure() {
        let (client, inbox) = client_with_route(Duration::from_millis(200));
        drop(inbox);
        assert!(matches!(
            client.query_customer("emma"),
            Err(QueryError::RoutingFailure)
        ));
    }

    #[test]
    fn no_partitions_is_a_routing_failure() {
        let client = QueryClient::new(IndexMap::new(), Duration::from_millis(200));
        assert!(matches!(
            client.query_customer("emma"),
            Err(QueryError::RoutingFailure)
        ));
    }

    #[test]
    fn empty_key_is_not_found() {
        let (client, _inbox) = client_with_route(Duration::from_millis(200));
        assert!(matches!(
            client.query_customer(""),
            Err(QueryError::KeyNotFound(_))
        ));
    }
}
