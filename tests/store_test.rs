use proptest::prelude::*;
use serde_json::{json, Value};

use flowlet::path::StatePath;
use flowlet::StateStore;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,8}".prop_map(|s| s.to_string())
}

fn path() -> impl Strategy<Value = StatePath> {
    prop::collection::vec(segment(), 1..5).prop_map(StatePath::from_segments)
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{1,16}".prop_map(Value::String),
    ]
}

proptest! {
    #[test]
    fn set_then_get_returns_the_written_value(path in path(), value in scalar()) {
        let store = StateStore::new();
        store.set(&path, value.clone());
        prop_assert_eq!(store.get(&path), Some(value));
    }

    #[test]
    fn set_creates_object_intermediates(path in path(), value in scalar()) {
        let store = StateStore::new();
        store.set(&path, value);
        // Every proper prefix resolves to an object.
        let segments = path.segments();
        for depth in 1..segments.len() {
            let prefix = StatePath::from_segments(segments[..depth].to_vec());
            let node = store.get(&prefix).expect("intermediate must exist");
            prop_assert!(node.is_object());
        }
    }

    #[test]
    fn push_initializes_then_appends(path in path(), values in prop::collection::vec(scalar(), 1..6)) {
        let store = StateStore::new();
        for value in &values {
            store.push(&path, value.clone());
        }
        prop_assert_eq!(store.get(&path), Some(Value::Array(values)));
    }

    #[test]
    fn every_mutation_bumps_the_revision(path in path(), value in scalar()) {
        let store = StateStore::new();
        let before = store.revision();
        store.set(&path, value.clone());
        let after_set = store.revision();
        prop_assert!(after_set > before);
        store.push(&path.child("list"), value);
        prop_assert!(store.revision() > after_set);
    }

    #[test]
    fn overwrite_is_last_write_wins(path in path(), first in scalar(), second in scalar()) {
        let store = StateStore::new();
        store.set(&path, first);
        store.set(&path, second.clone());
        prop_assert_eq!(store.get(&path), Some(second));
    }
}
