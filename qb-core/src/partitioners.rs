//! Partitioning functions for assigning keys to the partition which owns them.
use std::hash::Hash;
use std::hash::Hasher;

use indexmap::IndexSet;

/// Select a partition from a set of choices by applying
/// [rendezvous hashing](https://en.wikipedia.org/wiki/Rendezvous_hashing).
/// Rendezvous hashing ensures minimal shuffling when the set of options
/// changes, at the cost of being O(n) with n == options.len().
///
/// The hash is seahash-based and therefore stable across processes and
/// restarts; the query client and the ingest router must compute the same
/// owner for a key, so this stability is load-bearing.
///
/// **PANIC:** if the set is empty
pub fn rendezvous_select<V: Hash, T: Hash + Copy>(value: &V, options: &IndexSet<T>) -> T {
    let mut hasher = seahash::SeaHasher::new();
    value.hash(&mut hasher);

    options
        .iter()
        .map(|x| {
            let mut h = hasher.clone();
            x.hash(&mut h);
            (h.finish(), x)
        })
        .max_by_key(|x| x.0)
        .map(|x| x.1)
        .expect("Collection not empty")
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartitionId;

    #[test]
    fn selection_is_deterministic() {
        let options: IndexSet<PartitionId> = (0..8).collect();
        for key in ["emma", "hans", "subscription", ""] {
            let first = rendezvous_select(&key, &options);
            for _ in 0..10 {
                assert_eq!(rendezvous_select(&key, &options), first);
            }
            assert!(options.contains(&first));
        }
    }

    /// growing the option set must only move keys onto the new option,
    /// never shuffle keys between surviving options
    #[test]
    fn grows_with_minimal_movement() {
        let small: IndexSet<PartitionId> = (0..4).collect();
        let large: IndexSet<PartitionId> = (0..5).collect();
        for i in 0..100 {
            let key = format!("customer-{i}");
            let before = rendezvous_select(&key, &small);
            let after = rendezvous_select(&key, &large);
            assert!(after == before || after == 4);
        }
    }
}
