//! The keyed state of one partition.
//!
//! A partition owns a disjoint subset of keys per dimension, assigned by
//! hash. Its store is written exclusively by the owning partition worker;
//! the query layer only ever receives serialized read-only copies of single
//! entries.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::pipeline::{fold_point, LateDataPoint};
use crate::snapshot::{deserialize_state, serialize_state, PersistenceClient};
use crate::types::{
    DataPoint, Dimension, MonthlySubtotalByCategory, YearMonth, PER_CUSTOMER_STATE_NAME,
    PER_EVENT_TYPE_STATE_NAME,
};

type Registry = IndexMap<String, MonthlySubtotalByCategory>;

/// Current aggregate per key for the subset of keys one partition owns,
/// held independently per dimension.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PartitionStore {
    by_customer: Registry,
    by_event_type: Registry,
}

impl PartitionStore {
    fn registry(&self, dimension: Dimension) -> &Registry {
        match dimension {
            Dimension::ByCustomer => &self.by_customer,
            Dimension::ByEventType => &self.by_event_type,
        }
    }

    fn registry_mut(&mut self, dimension: Dimension) -> &mut Registry {
        match dimension {
            Dimension::ByCustomer => &mut self.by_customer,
            Dimension::ByEventType => &mut self.by_event_type,
        }
    }

    /// Fold a data point into the entry of its key under the given
    /// dimension, creating the entry on first sight of the key.
    pub fn upsert(&mut self, dimension: Dimension, point: &DataPoint) -> Result<(), LateDataPoint> {
        let registry = self.registry_mut(dimension);
        match registry.get_mut(dimension.key_of(point)) {
            Some(state) => fold_point(state, point),
            None => {
                let month = YearMonth::from(&point.timestamp);
                let mut state = MonthlySubtotalByCategory::new(month);
                // cannot be late relative to its own month
                fold_point(&mut state, point)?;
                registry.insert(dimension.key_of(point).to_owned(), state);
                Ok(())
            }
        }
    }

    /// Current aggregate for a key, `None` if the key has never been
    /// observed. Reading never creates an entry.
    pub fn get(&self, dimension: Dimension, key: &str) -> Option<&MonthlySubtotalByCategory> {
        self.registry(dimension).get(key)
    }

    /// Write both registries into a persistence client under their state
    /// names
    pub(crate) fn persist_into(&self, client: &mut impl PersistenceClient) {
        for dimension in Dimension::ALL {
            let encoded = serialize_state(self.registry(dimension));
            client.persist(&encoded, dimension.state_name());
        }
    }

    /// Rebuild a store from a persistence client, starting empty for any
    /// registry with no persisted state
    pub(crate) fn restore(client: &impl PersistenceClient) -> Self {
        let by_customer = client
            .load(PER_CUSTOMER_STATE_NAME)
            .map(deserialize_state)
            .unwrap_or_default();
        let by_event_type = client
            .load(PER_EVENT_TYPE_STATE_NAME)
            .map(deserialize_state)
            .unwrap_or_default();
        Self {
            by_customer,
            by_event_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::snapshot::{InMemoryBackend, PersistenceBackend};
    use crate::testing::point;

    use super::*;

    #[test]
    fn dimensions_are_independent() {
        let mut store = PartitionStore::default();
        store
            .upsert(Dimension::ByCustomer, &point(1, "emma", "sub", "video", 10))
            .unwrap();

        assert!(store.get(Dimension::ByCustomer, "emma").is_some());
        // the same point under the other dimension was never folded
        assert!(store.get(Dimension::ByEventType, "sub").is_none());
        assert!(store.get(Dimension::ByEventType, "emma").is_none());
    }

    #[test]
    fn unseen_key_is_absent() {
        let store = PartitionStore::default();
        assert!(store.get(Dimension::ByCustomer, "ghost").is_none());
    }

    #[test]
    fn upsert_accumulates_per_key() {
        let mut store = PartitionStore::default();
        for p in [
            point(1, "emma", "sub", "video", 10),
            point(2, "emma", "sub", "video", 5),
            point(3, "hans", "sub", "video", 3),
        ] {
            store.upsert(Dimension::ByCustomer, &p).unwrap();
        }

        let emma = store.get(Dimension::ByCustomer, "emma").unwrap();
        assert_eq!(emma.totals().get("video"), Some(&Decimal::from(15)));
        let hans = store.get(Dimension::ByCustomer, "hans").unwrap();
        assert_eq!(hans.totals().get("video"), Some(&Decimal::from(3)));
    }

    #[test]
    fn late_point_leaves_state_untouched() {
        use chrono::{TimeZone, Utc};

        let mut store = PartitionStore::default();
        let may = point(1, "emma", "sub", "video", 10);
        store.upsert(Dimension::ByCustomer, &may).unwrap();

        let mut april = point(1, "emma", "sub", "video", 99);
        april.timestamp = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert!(store.upsert(Dimension::ByCustomer, &april).is_err());

        let emma = store.get(Dimension::ByCustomer, "emma").unwrap();
        assert_eq!(emma.totals().get("video"), Some(&Decimal::from(10)));
    }

    #[test]
    fn persists_and_restores() {
        let mut store = PartitionStore::default();
        store
            .upsert(Dimension::ByCustomer, &point(1, "emma", "sub", "video", 10))
            .unwrap();
        store
            .upsert(Dimension::ByEventType, &point(1, "emma", "sub", "video", 10))
            .unwrap();

        let backend = InMemoryBackend::default();
        let mut client = backend.for_version(0, &0);
        store.persist_into(&mut client);

        let restored = PartitionStore::restore(&backend.for_version(0, &0));
        assert_eq!(
            restored
                .get(Dimension::ByCustomer, "emma")
                .unwrap()
                .totals()
                .get("video"),
            Some(&Decimal::from(10))
        );
        assert_eq!(
            restored
                .get(Dimension::ByEventType, "sub")
                .unwrap()
                .totals()
                .get("video"),
            Some(&Decimal::from(10))
        );
    }
}
