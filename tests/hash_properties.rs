// tests/hash_properties.rs

//! Property coverage for the content hash: the same key/value set must hash
//! identically regardless of the order entries were inserted in.

use indexmap::IndexMap;
use livecfg::core::resolver::compute_hash;
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::Value;

fn arbitrary_entry() -> impl Strategy<Value = (String, Value)> {
    (
        "[a-z]{1,8}",
        prop_oneof![
            any::<i64>().prop_map(|n| Value::from(n)),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ],
    )
}

proptest! {
    #[test]
    fn hash_is_independent_of_insertion_order(
        entries in vec(arbitrary_entry(), 0..12)
    ) {
        // De-duplicate keys: later entries win, matching how `IndexMap::insert`
        // would behave if the same key appeared twice.
        let mut canonical: IndexMap<String, Value> = IndexMap::new();
        for (k, v) in &entries {
            canonical.insert(k.clone(), v.clone());
        }

        let mut shuffled_keys: Vec<&String> = canonical.keys().collect();
        shuffled_keys.reverse();
        let mut shuffled: IndexMap<String, Value> = IndexMap::new();
        for k in shuffled_keys {
            shuffled.insert(k.clone(), canonical[k].clone());
        }

        prop_assert_eq!(compute_hash(&canonical), compute_hash(&shuffled));
    }

    #[test]
    fn hash_has_fixed_length(entries in vec(arbitrary_entry(), 0..12)) {
        let mut map: IndexMap<String, Value> = IndexMap::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        prop_assert_eq!(compute_hash(&map).len(), 16);
    }
}
