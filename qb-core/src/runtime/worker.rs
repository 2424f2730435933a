//! The partition worker and the ingest router.
use std::time::{Duration, Instant};

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::errorhandling::BillingFatal;
use crate::partitioners::rendezvous_select;
use crate::pipeline::{validate, RejectedCounter};
use crate::snapshot::{serialize_state, PersistenceBackend, SnapshotVersion};
use crate::state::PartitionStore;
use crate::types::{Dimension, PartitionId};

use super::PartitionMessage;

/// A partition worker stopped accepting messages, i.e. its thread died.
/// This is an engine fault: aggregate state can no longer be kept complete.
#[derive(Debug, Error)]
#[error("partition {0} is no longer accepting messages")]
struct PartitionLost(PartitionId);

/// Owns the state of one partition and applies every mutation to it.
///
/// The worker is single-threaded with respect to its state: upserts, lookups
/// and snapshot writes all arrive through one inbox and are applied in
/// delivery order. Exclusive write ownership comes from this routing, not
/// from locking. The worker runs until every sender to its inbox is gone.
pub(crate) struct PartitionWorker<P> {
    id: PartitionId,
    store: PartitionStore,
    inbox: flume::Receiver<PartitionMessage>,
    persistence: P,
    rejected: RejectedCounter,
}

impl<P> PartitionWorker<P>
where
    P: PersistenceBackend,
{
    pub(crate) fn new(
        id: PartitionId,
        inbox: flume::Receiver<PartitionMessage>,
        persistence: P,
        rejected: RejectedCounter,
    ) -> Self {
        Self {
            id,
            store: PartitionStore::default(),
            inbox,
            persistence,
            rejected,
        }
    }

    pub(crate) fn run(mut self) {
        if let Some(version) = self.persistence.last_commited() {
            let client = self.persistence.for_version(self.id, &version);
            self.store = PartitionStore::restore(&client);
            info!(worker = self.id, version, "restored partition state");
        }
        while let Ok(msg) = self.inbox.recv() {
            match msg {
                PartitionMessage::Upsert(dimension, point) => {
                    if let Err(reason) = self.store.upsert(dimension, &point) {
                        warn!(worker = self.id, %reason, "dropping late data point");
                        self.rejected.increment();
                    }
                }
                PartitionMessage::Query(request) => {
                    let value = self
                        .store
                        .get(request.dimension, &request.key)
                        .map(serialize_state);
                    // the caller may have timed out and dropped the receiver
                    let _ = request.reply.send(value);
                }
                PartitionMessage::Snapshot { version, ack } => {
                    let mut client = self.persistence.for_version(self.id, &version);
                    self.store.persist_into(&mut client);
                    let _ = ack.send(self.id);
                }
            }
        }
        debug!(worker = self.id, "partition worker shutting down");
    }
}

/// Feed a source into the partition workers.
///
/// Each valid point is routed twice, once per dimension, to the partition
/// owning that dimension's key. Malformed points are rejected and counted
/// here, before either fold. The router also drives snapshot rounds and
/// always runs a final one on end-of-stream, which doubles as a drain
/// barrier: once acked, every routed upsert has been applied.
pub(crate) fn run_router<S, P>(
    mut source: S,
    routes: IndexMap<PartitionId, flume::Sender<PartitionMessage>>,
    rejected: RejectedCounter,
    snapshot_interval: Option<Duration>,
    persistence: P,
) where
    S: crate::sources::DataPointSource,
    P: PersistenceBackend,
{
    let partitions: IndexSet<PartitionId> = routes.keys().copied().collect();
    info!(partitions = partitions.len(), "ingest router started");
    let mut next_version = persistence.last_commited().map_or(0, |v| v + 1);
    let mut last_snapshot = Instant::now();
    loop {
        match source.poll() {
            Some(point) => {
                if let Err(reason) = validate(&point) {
                    warn!(%reason, "rejecting malformed data point");
                    rejected.increment();
                } else {
                    for dimension in Dimension::ALL {
                        let key = dimension.key_of(&point);
                        let owner = rendezvous_select(&key, &partitions);
                        routes
                            .get(&owner)
                            .expect("routes and partitions share keys")
                            .send(PartitionMessage::Upsert(dimension, point.clone()))
                            .map_err(|_| PartitionLost(owner))
                            .billing_fatal();
                    }
                }
            }
            None => {
                if source.is_finished() {
                    break;
                }
                std::thread::yield_now();
            }
        }
        if let Some(interval) = snapshot_interval {
            if last_snapshot.elapsed() >= interval {
                snapshot_round(&routes, &persistence, next_version);
                next_version += 1;
                last_snapshot = Instant::now();
            }
        }
    }
    snapshot_round(&routes, &persistence, next_version);
    info!("ingest finished");
}

/// One ack'd snapshot round across all partitions. The version is only
/// committed once every worker has persisted it.
fn snapshot_round<P: PersistenceBackend>(
    routes: &IndexMap<PartitionId, flume::Sender<PartitionMessage>>,
    persistence: &P,
    version: SnapshotVersion,
) {
    let (ack_tx, ack_rx) = flume::bounded(routes.len());
    for (id, sender) in routes {
        sender
            .send(PartitionMessage::Snapshot {
                version,
                ack: ack_tx.clone(),
            })
            .map_err(|_| PartitionLost(*id))
            .billing_fatal();
    }
    drop(ack_tx);
    let acked = ack_rx.iter().count();
    if acked == routes.len() {
        persistence.commit_version(&version);
        debug!(version, "committed snapshot");
    } else {
        // a worker died mid-round; a partial snapshot must never be committed
        error!(version, acked, "snapshot round incomplete, version not committed");
    }
}
