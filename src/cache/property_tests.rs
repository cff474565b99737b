//! Property-Based Tests for the Store and Key Deriver
//!
//! Uses proptest to check capacity, recency and key invariants over random
//! operation sequences.

use proptest::prelude::*;
use serde_json::json;
use std::collections::{HashMap, HashSet};

use crate::cache::PersistentStore;
use crate::key::{derive_key, EMPTY_ARGS_KEY};

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,12}"
}

#[derive(Debug, Clone)]
enum StoreOp {
    Set { key: String, value: i64 },
    Get { key: String },
    Remove { key: String },
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        (key_strategy(), any::<i64>()).prop_map(|(key, value)| StoreOp::Set { key, value }),
        key_strategy().prop_map(|key| StoreOp::Get { key }),
        key_strategy().prop_map(|key| StoreOp::Remove { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // The store never holds more entries than its limit.
    #[test]
    fn prop_capacity_enforced(
        max in 1usize..20,
        ops in prop::collection::vec(store_op_strategy(), 1..200)
    ) {
        let mut store = PersistentStore::in_memory("prop", max, None);
        for op in ops {
            match op {
                StoreOp::Set { key, value } => store.set(key, json!(value)),
                StoreOp::Get { key } => { store.get(&key); }
                StoreOp::Remove { key } => { store.remove(&key); }
            }
            prop_assert!(store.len() <= max, "len {} exceeds max {}", store.len(), max);
        }
    }

    // Without a limit the store behaves like a plain map.
    #[test]
    fn prop_unlimited_matches_model(ops in prop::collection::vec(store_op_strategy(), 1..200)) {
        let mut store = PersistentStore::in_memory("prop", 0, None);
        let mut model: HashMap<String, i64> = HashMap::new();

        for op in ops {
            match op {
                StoreOp::Set { key, value } => {
                    store.set(key.clone(), json!(value));
                    model.insert(key, value);
                }
                StoreOp::Get { key } => {
                    prop_assert_eq!(store.get(&key), model.get(&key).map(|v| json!(v)));
                }
                StoreOp::Remove { key } => {
                    prop_assert_eq!(store.remove(&key), model.remove(&key).is_some());
                }
            }
        }
        prop_assert_eq!(store.len(), model.len());
    }

    // Filling past capacity evicts the least recently used key.
    #[test]
    fn prop_lru_eviction_order(
        keys in prop::collection::hash_set(key_strategy(), 2..10),
        new_key in key_strategy()
    ) {
        prop_assume!(!keys.contains(&new_key));
        let keys: Vec<String> = keys.into_iter().collect();

        let mut store = PersistentStore::in_memory("prop", keys.len(), None);
        for key in &keys {
            store.set(key.clone(), json!(key));
        }
        // Refresh the first key so the second becomes the oldest
        store.get(&keys[0]);
        store.set(new_key.clone(), json!(0));

        prop_assert!(store.contains(&keys[0]));
        prop_assert!(!store.contains(&keys[1]));
        prop_assert!(store.contains(&new_key));
        prop_assert_eq!(store.len(), keys.len());
    }

    // Equal arguments give equal keys; distinct arguments give distinct keys.
    #[test]
    fn prop_key_equivalence(
        a in (key_strategy(), any::<i32>(), any::<bool>()),
        b in (key_strategy(), any::<i32>(), any::<bool>())
    ) {
        let ka = derive_key(&a).unwrap();
        let kb = derive_key(&b).unwrap();
        prop_assert_eq!(ka == kb, a == b);
        prop_assert_eq!(derive_key(&a.clone()).unwrap(), ka.clone());
        prop_assert_ne!(ka, EMPTY_ARGS_KEY.to_string());
    }

    // Distinct string arguments never collide, whatever their content.
    #[test]
    fn prop_string_keys_unique(values in prop::collection::hash_set(".*", 1..30)) {
        let keys: HashSet<String> = values
            .iter()
            .map(|v| derive_key(&(v.as_str(),)).unwrap())
            .collect();
        prop_assert_eq!(keys.len(), values.len());
    }
}
