//! Job runtime: partition worker threads, ingest routing and lifecycle.
mod worker;

use std::any::Any;
use std::thread::JoinHandle;
use std::time::Duration;

use bon::Builder;
use indexmap::IndexMap;
use thiserror::Error;

use crate::pipeline::RejectedCounter;
use crate::query::{QueryClient, QueryRequest, DEFAULT_QUERY_TIMEOUT};
use crate::snapshot::{PersistenceBackend, SnapshotVersion};
use crate::sources::DataPointSource;
use crate::types::{DataPoint, Dimension, PartitionId};

use worker::{run_router, PartitionWorker};

/// Everything a partition worker can receive through its inbox. One channel
/// per partition carries updates, lookups and snapshot markers, so they
/// apply in delivery order.
pub(crate) enum PartitionMessage {
    Upsert(Dimension, DataPoint),
    Query(QueryRequest),
    Snapshot {
        version: SnapshotVersion,
        ack: flume::Sender<PartitionId>,
    },
}

/// Failure of a job thread, surfaced on join
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A partition worker thread panicked
    #[error("partition worker {0} panicked: {1:?}")]
    WorkerPanic(PartitionId, Box<dyn Any + Send>),
    /// The ingest router thread panicked
    #[error("ingest router panicked: {0:?}")]
    RouterPanic(Box<dyn Any + Send>),
}

/// A billing aggregation job: consumes a source of data points and keeps
/// per-customer and per-event-type monthly subtotals queryable while the
/// stream is running.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use queryable_billing::runtime::BillingJob;
/// use queryable_billing::snapshot::NoPersistence;
/// use queryable_billing::sources::IteratorSource;
/// use queryable_billing::types::DataPoint;
/// use rust_decimal::Decimal;
///
/// let ts = Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap();
/// let points = vec![
///     DataPoint::new(ts, Decimal::from(10), "A", "sub", "video"),
///     DataPoint::new(ts, Decimal::from(5), "A", "sub", "music"),
///     DataPoint::new(ts, Decimal::from(3), "B", "sub", "video"),
/// ];
///
/// let mut handle = BillingJob::builder()
///     .persistence(NoPersistence)
///     .parallelism(2)
///     .build(IteratorSource::new(points))
///     .start();
/// handle.wait_for_ingest().unwrap();
///
/// let client = handle.client();
/// let a = client.query_customer("A").unwrap();
/// assert_eq!(a.totals().get("video"), Some(&Decimal::from(10)));
/// assert_eq!(a.totals().get("music"), Some(&Decimal::from(5)));
/// let sub = client.query_type("sub").unwrap();
/// assert_eq!(sub.totals().get("video"), Some(&Decimal::from(13)));
///
/// drop(client);
/// handle.shutdown().unwrap();
/// ```
#[derive(Builder)]
pub struct BillingJob<S, P> {
    #[builder(finish_fn)]
    source: S,
    persistence: P,
    /// Number of partition workers. Keys are spread over partitions by
    /// rendezvous hash.
    #[builder(default = 1)]
    parallelism: u64,
    /// How long a query waits for the owning partition
    #[builder(default = DEFAULT_QUERY_TIMEOUT)]
    query_timeout: Duration,
    /// Interval between snapshot rounds. A final round always runs at
    /// end-of-stream.
    snapshots: Option<Duration>,
}

impl<S, P> BillingJob<S, P>
where
    S: DataPointSource,
    P: PersistenceBackend + Clone,
{
    /// Spawn the partition workers and the ingest router and start
    /// consuming the source.
    ///
    /// **PANIC:** if `parallelism` is zero
    pub fn start(self) -> JobHandle {
        assert!(self.parallelism > 0, "parallelism must be at least 1");
        let rejected = RejectedCounter::default();
        let mut routes = IndexMap::with_capacity(self.parallelism as usize);
        let mut workers = Vec::with_capacity(self.parallelism as usize);
        for id in 0..self.parallelism {
            let (tx, rx) = flume::unbounded();
            routes.insert(id, tx);
            let worker = PartitionWorker::new(id, rx, self.persistence.clone(), rejected.clone());
            workers.push((id, std::thread::spawn(move || worker.run())));
        }

        let client = QueryClient::new(routes.clone(), self.query_timeout);
        let router_rejected = rejected.clone();
        let source = self.source;
        let persistence = self.persistence;
        let snapshots = self.snapshots;
        let router = std::thread::spawn(move || {
            run_router(source, routes, router_rejected, snapshots, persistence)
        });

        JobHandle {
            client,
            workers,
            router: Some(router),
            rejected,
        }
    }
}

/// Handle to a running job.
///
/// Partition workers keep serving queries after the source is exhausted;
/// they exit once the handle and every [QueryClient] cloned from it have
/// been dropped.
pub struct JobHandle {
    client: QueryClient,
    workers: Vec<(PartitionId, JoinHandle<()>)>,
    router: Option<JoinHandle<()>>,
    rejected: RejectedCounter,
}

impl JobHandle {
    /// A client for querying the running aggregates. Cheap to clone, safe to
    /// use from any thread.
    pub fn client(&self) -> QueryClient {
        self.client.clone()
    }

    /// Number of rejected updates so far. Malformed points count once, late
    /// points once per dimension they were routed to.
    pub fn rejected_records(&self) -> u64 {
        self.rejected.get()
    }

    /// Block until the source is exhausted and every routed update has been
    /// applied. Queries issued afterwards observe the complete ingest.
    pub fn wait_for_ingest(&mut self) -> Result<(), ExecutionError> {
        if let Some(router) = self.router.take() {
            router.join().map_err(ExecutionError::RouterPanic)?;
        }
        Ok(())
    }

    /// Wait for ingest to finish, then stop and join all partition workers.
    ///
    /// Workers only exit once every [QueryClient] is gone, so any client
    /// cloned from this handle must be dropped before calling this.
    pub fn shutdown(mut self) -> Result<(), ExecutionError> {
        self.wait_for_ingest()?;
        drop(self.client);
        for (id, handle) in self.workers {
            handle
                .join()
                .map_err(|cause| ExecutionError::WorkerPanic(id, cause))?;
        }
        Ok(())
    }
}
