//! Snapshots are periodically saved partition state. Regular snapshots allow
//! resuming aggregation after restarts without double-counting and without
//! loss; the folding logic itself stays pure so any replay strategy composes.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};

use crate::errorhandling::BillingFatal;
use crate::types::PartitionId;

/// Version of a snapshot
pub type SnapshotVersion = u64;

pub(crate) fn serialize_state<S: Serialize>(state: &S) -> Vec<u8> {
    rmp_serde::to_vec(state).billing_fatal()
}

pub(crate) fn deserialize_state<S: DeserializeOwned>(state: Vec<u8>) -> S {
    rmp_serde::from_slice(&state).billing_fatal()
}

/// A persistence backend provides persistent storage for snapshots across job
/// restarts. This may be a local disk, remote storage, a database or anything
/// really which can reliably store data.
pub trait PersistenceBackend: Send + Sync + 'static {
    /// Client for this backend. The client is used to store and load state
    /// for one partition at one snapshot version.
    type Client: PersistenceClient;
    /// Return the version of the last committed snapshot or `None` if no
    /// version has been committed yet.
    fn last_commited(&self) -> Option<SnapshotVersion>;
    /// Create a client for loading/saving state for a specific snapshot
    /// version
    fn for_version(&self, partition: PartitionId, version: &SnapshotVersion) -> Self::Client;
    /// Mark a specific snapshot version as finished. Only committed versions
    /// are ever resumed from.
    fn commit_version(&self, version: &SnapshotVersion);
}

/// A client for saving snapshot data to and loading that data from one
/// partition's slot in persistent storage
pub trait PersistenceClient: Send + 'static {
    /// Load the state registry with the given name, returning `None` if no
    /// state exists under this name
    fn load(&self, state_name: &str) -> Option<Vec<u8>>;
    /// Retain the given state under the given registry name
    fn persist(&mut self, state: &[u8], state_name: &str);
}

/// A persistence backend which does not retain any data. This is mostly
/// useful for testing or situations where you always want to restart the job
/// statelessly.
#[derive(Clone, Debug)]
pub struct NoPersistence;

impl PersistenceBackend for NoPersistence {
    type Client = NoPersistence;

    fn last_commited(&self) -> Option<SnapshotVersion> {
        None
    }

    fn for_version(&self, _partition: PartitionId, _version: &SnapshotVersion) -> Self::Client {
        NoPersistence
    }

    fn commit_version(&self, _version: &SnapshotVersion) {}
}

impl PersistenceClient for NoPersistence {
    fn load(&self, _state_name: &str) -> Option<Vec<u8>> {
        None
    }

    fn persist(&mut self, _state: &[u8], _state_name: &str) {}
}

type VersionSlot = HashMap<(PartitionId, SnapshotVersion, String), Vec<u8>>;

#[derive(Debug, Default)]
struct InMemoryShared {
    committed: Option<SnapshotVersion>,
    slots: VersionSlot,
}

/// A backend which keeps all snapshots in process memory, shared between
/// clones. Useful to exercise restart/resume behaviour without touching real
/// storage.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    shared: Arc<Mutex<InMemoryShared>>,
}

impl PersistenceBackend for InMemoryBackend {
    type Client = InMemoryClient;

    fn last_commited(&self) -> Option<SnapshotVersion> {
        #[allow(clippy::unwrap_used)]
        let shared = self.shared.lock().unwrap();
        shared.committed
    }

    fn for_version(&self, partition: PartitionId, version: &SnapshotVersion) -> Self::Client {
        InMemoryClient {
            partition,
            version: *version,
            shared: Arc::clone(&self.shared),
        }
    }

    fn commit_version(&self, version: &SnapshotVersion) {
        #[allow(clippy::unwrap_used)]
        let mut shared = self.shared.lock().unwrap();
        shared.committed = Some(*version);
    }
}

/// Client of [InMemoryBackend] scoped to one partition and version
#[derive(Debug)]
pub struct InMemoryClient {
    partition: PartitionId,
    version: SnapshotVersion,
    shared: Arc<Mutex<InMemoryShared>>,
}

impl PersistenceClient for InMemoryClient {
    fn load(&self, state_name: &str) -> Option<Vec<u8>> {
        #[allow(clippy::unwrap_used)]
        let shared = self.shared.lock().unwrap();
        shared
            .slots
            .get(&(self.partition, self.version, state_name.to_owned()))
            .cloned()
    }

    fn persist(&mut self, state: &[u8], state_name: &str) {
        #[allow(clippy::unwrap_used)]
        let mut shared = self.shared.lock().unwrap();
        shared.slots.insert(
            (self.partition, self.version, state_name.to_owned()),
            state.into(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// This test won't compile if PersistenceClient is not object safe
    #[test]
    fn is_object_safe() {
        struct _Foo {
            _bar: Box<dyn PersistenceClient>,
        }
    }

    #[test]
    fn commit_marks_version_visible() {
        let backend = InMemoryBackend::default();
        assert_eq!(backend.last_commited(), None);

        let mut client = backend.for_version(0, &0);
        client.persist(b"totals", "per-customer-subtotals");
        // persisted but not yet committed
        assert_eq!(backend.last_commited(), None);

        backend.commit_version(&0);
        assert_eq!(backend.last_commited(), Some(0));

        let reader = backend.for_version(0, &0);
        assert_eq!(
            reader.load("per-customer-subtotals"),
            Some(b"totals".to_vec())
        );
        assert_eq!(reader.load("per-event-type-subtotals"), None);
    }

    #[test]
    fn partitions_do_not_share_slots() {
        let backend = InMemoryBackend::default();
        let mut first = backend.for_version(0, &0);
        first.persist(b"a", "per-customer-subtotals");

        let second = backend.for_version(1, &0);
        assert_eq!(second.load("per-customer-subtotals"), None);
    }

    #[test]
    fn state_roundtrips_through_codec() {
        let state = vec![("emma".to_string(), 42u64)];
        let encoded = serialize_state(&state);
        let decoded: Vec<(String, u64)> = deserialize_state(encoded);
        assert_eq!(decoded, state);
    }
}
