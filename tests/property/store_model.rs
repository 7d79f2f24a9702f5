//! Concurrent state store against a `HashMap` model.

use std::collections::HashMap;
use std::thread;

use proptest::prelude::*;
use reach_rs::store::Insert;
use reach_rs::{ConcurrentStateStore, State, StateId, StoreConfig};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Threads insert overlapping batches of arbitrary byte strings. Each
    /// distinct content gets exactly one id and exactly one winning insert,
    /// and every thread sees that id.
    #[test]
    fn concurrent_batches_match_model(
        batches in prop::collection::vec(
            prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 0..200),
            1..6,
        ),
        initial_capacity in 1usize..64,
    ) {
        let store = ConcurrentStateStore::new(StoreConfig {
            initial_capacity,
            max_states: None,
        })
        .unwrap();

        let results: Vec<Vec<Insert>> = thread::scope(|s| {
            let handles: Vec<_> = batches
                .iter()
                .map(|batch| {
                    let store = &store;
                    s.spawn(move || {
                        batch
                            .iter()
                            .map(|bytes| store.try_insert(State::new(bytes.clone()), None).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut ids: HashMap<&[u8], StateId> = HashMap::new();
        let mut wins: HashMap<&[u8], usize> = HashMap::new();
        for (batch, inserts) in batches.iter().zip(&results) {
            for (bytes, ins) in batch.iter().zip(inserts) {
                let id = *ids.entry(bytes.as_slice()).or_insert(ins.id);
                prop_assert_eq!(id, ins.id);
                if ins.inserted {
                    *wins.entry(bytes.as_slice()).or_default() += 1;
                }
            }
        }

        prop_assert_eq!(store.len(), ids.len());
        for (bytes, id) in &ids {
            prop_assert_eq!(wins.get(bytes).copied(), Some(1));
            prop_assert_eq!(store.get(*id).bytes(), *bytes);
            prop_assert_eq!(store.contains(&State::new(bytes.to_vec())), Some(*id));
        }
    }
}
