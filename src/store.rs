//! # State Store
//!
//! The single mutable JSON document backing a running flow. All reads and
//! writes go through path-addressed operations; no component holds a
//! structural reference into the document.
//!
//! ## Visibility contract
//!
//! There is exactly one logical mutator at a time. Every mutation is applied
//! under the write lock and the revision counter is published on a watch
//! channel before the call returns, so every subscriber observes the new
//! document before the next read. There is no path-scoped invalidation:
//! subscribers are expected to re-evaluate all of their bindings on every
//! revision, regardless of which path changed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::path::StatePath;

/// A single `{op:"set"}` step applied to one artifact's sub-document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ArtifactPatch {
    pub op: PatchOp,
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Set,
}

/// A patch payload may be a single operation or an ordered list of them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Patches {
    One(ArtifactPatch),
    Many(Vec<ArtifactPatch>),
}

impl Patches {
    fn into_vec(self) -> Vec<ArtifactPatch> {
        match self {
            Patches::One(p) => vec![p],
            Patches::Many(ps) => ps,
        }
    }
}

pub struct StateStore {
    data: RwLock<Value>,
    revision: AtomicU64,
    revision_tx: watch::Sender<u64>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_document(json!({}))
    }

    pub fn with_document(document: Value) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            data: RwLock::new(document),
            revision: AtomicU64::new(0),
            revision_tx,
        }
    }

    /// Returns the value at `path`, or `None` if any segment along the way
    /// is missing or null.
    pub fn get(&self, path: &StatePath) -> Option<Value> {
        let doc = self.data.read().expect("state lock poisoned");
        lookup(&doc, path.segments()).cloned()
    }

    /// Convenience wrapper parsing a dot-separated path. Malformed paths
    /// resolve to `None`.
    pub fn get_str(&self, path: &str) -> Option<Value> {
        StatePath::parse(path).ok().and_then(|p| self.get(&p))
    }

    /// Writes `value` at `path`, creating empty objects for missing or null
    /// intermediate segments. Arrays are never auto-created; a numeric
    /// segment only indexes an array that already exists.
    pub fn set(&self, path: &StatePath, value: Value) {
        {
            let mut doc = self.data.write().expect("state lock poisoned");
            set_in(&mut doc, path.segments(), value);
        }
        self.touch();
    }

    pub fn set_str(&self, path: &str, value: Value) {
        match StatePath::parse(path) {
            Ok(p) => self.set(&p, value),
            Err(e) => warn!("set ignored, bad path {:?}: {}", path, e),
        }
    }

    /// Appends `value` if the target is already an array; otherwise the
    /// target is initialised to a single-element array.
    pub fn push(&self, path: &StatePath, value: Value) {
        {
            let mut doc = self.data.write().expect("state lock poisoned");
            match lookup_mut(&mut doc, path.segments()) {
                Some(Value::Array(items)) => items.push(value),
                _ => set_in(&mut doc, path.segments(), Value::Array(vec![value])),
            }
        }
        self.touch();
    }

    pub fn push_str(&self, path: &str, value: Value) {
        match StatePath::parse(path) {
            Ok(p) => self.push(&p, value),
            Err(e) => warn!("push ignored, bad path {:?}: {}", path, e),
        }
    }

    /// Applies `patches` to the artifact with the given id, addressing each
    /// patch path relative to `workspace.artifacts.<idx>`. A reference to an
    /// unknown artifact is a silent no-op: malformed references never error
    /// and never bump the revision.
    pub fn apply_artifact_patch(&self, artifact_id: &str, patches: Patches) {
        let base = {
            let doc = self.data.read().expect("state lock poisoned");
            let artifacts = match lookup(&doc, &["workspace".into(), "artifacts".into()]) {
                Some(Value::Array(items)) => items,
                _ => {
                    debug!("artifact patch ignored, no artifact list");
                    return;
                }
            };
            let idx = artifacts
                .iter()
                .position(|a| a.get("id").and_then(Value::as_str) == Some(artifact_id));
            match idx {
                Some(idx) => StatePath::from_segments(["workspace", "artifacts"]).child(idx.to_string()),
                None => {
                    debug!("artifact patch ignored, unknown id {:?}", artifact_id);
                    return;
                }
            }
        };

        {
            let mut doc = self.data.write().expect("state lock poisoned");
            for patch in patches.into_vec() {
                let PatchOp::Set = patch.op;
                match StatePath::parse(&patch.path) {
                    Ok(rel) => set_in(&mut doc, base.join(&rel).segments(), patch.value),
                    Err(e) => warn!("artifact patch step skipped, bad path: {}", e),
                }
            }
        }
        self.touch();
    }

    /// Wholesale overwrite of one top-level region (new-project semantics:
    /// replace, never merge).
    pub fn replace_region(&self, name: &str, value: Value) {
        {
            let mut doc = self.data.write().expect("state lock poisoned");
            if let Value::Object(map) = &mut *doc {
                map.insert(name.to_string(), value);
            }
        }
        self.touch();
    }

    /// Deep copy of the whole document.
    pub fn snapshot(&self) -> Value {
        self.data.read().expect("state lock poisoned").clone()
    }

    /// Replaces the entire document (rehydration at boot).
    pub fn restore(&self, document: Value) {
        {
            let mut doc = self.data.write().expect("state lock poisoned");
            *doc = document;
        }
        self.touch();
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Subscribes to revision bumps. Every mutation produces exactly one
    /// notification; receivers re-evaluate all bindings against a fresh
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    fn touch(&self) {
        let rev = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        // send_replace never fails even with zero receivers
        self.revision_tx.send_replace(rev);
    }
}

pub(crate) fn lookup<'a>(doc: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = doc;
    for segment in segments {
        if current.is_null() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn lookup_mut<'a>(doc: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_in(doc: &mut Value, segments: &[String], value: Value) {
    let (last, intermediates) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut current = doc;
    for segment in intermediates {
        current = match current {
            Value::Array(items) => {
                let idx = match segment.parse::<usize>() {
                    Ok(i) if i < items.len() => i,
                    _ => {
                        warn!("set skipped, array index out of range: {:?}", segment);
                        return;
                    }
                };
                &mut items[idx]
            }
            other => {
                if !other.is_object() {
                    *other = json!({});
                }
                let map = other.as_object_mut().expect("just ensured object");
                map.entry(segment.clone()).or_insert(Value::Null);
                let slot = map.get_mut(segment).expect("just inserted");
                if slot.is_null() {
                    *slot = json!({});
                }
                slot
            }
        };
    }

    match current {
        Value::Array(items) => match last.parse::<usize>() {
            Ok(idx) if idx < items.len() => items[idx] = value,
            Ok(idx) if idx == items.len() => items.push(value),
            _ => warn!("set skipped, array index out of range: {:?}", last),
        },
        other => {
            if !other.is_object() {
                *other = json!({});
            }
            other
                .as_object_mut()
                .expect("just ensured object")
                .insert(last.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(p: &str) -> StatePath {
        StatePath::parse(p).unwrap()
    }

    #[test]
    fn set_then_get_roundtrip() {
        let store = StateStore::new();
        store.set(&path("workspace.prospectName"), json!("Acme"));
        assert_eq!(store.get(&path("workspace.prospectName")), Some(json!("Acme")));
        assert_eq!(store.get(&path("workspace")), Some(json!({"prospectName": "Acme"})));
    }

    #[test]
    fn set_creates_intermediate_objects_not_arrays() {
        let store = StateStore::new();
        store.set(&path("a.b.c"), json!(1));
        assert_eq!(store.snapshot(), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_through_null_intermediate() {
        let store = StateStore::with_document(json!({"a": null}));
        store.set(&path("a.b"), json!(true));
        assert_eq!(store.snapshot(), json!({"a": {"b": true}}));
    }

    #[test]
    fn get_missing_or_null_is_none() {
        let store = StateStore::with_document(json!({"a": {"b": null}}));
        assert_eq!(store.get(&path("a.b")), None);
        assert_eq!(store.get(&path("a.x.y")), None);
    }

    #[test]
    fn push_appends_or_initialises() {
        let store = StateStore::new();
        store.push(&path("workspace.errors"), json!("first"));
        assert_eq!(store.get(&path("workspace.errors")), Some(json!(["first"])));
        store.push(&path("workspace.errors"), json!("second"));
        assert_eq!(
            store.get(&path("workspace.errors")),
            Some(json!(["first", "second"]))
        );
    }

    #[test]
    fn push_replaces_non_array_target() {
        let store = StateStore::with_document(json!({"x": 42}));
        store.push(&path("x"), json!("v"));
        assert_eq!(store.get(&path("x")), Some(json!(["v"])));
    }

    #[test]
    fn numeric_segment_indexes_existing_array() {
        let store = StateStore::with_document(json!({"items": [{"id": "a"}, {"id": "b"}]}));
        store.set(&path("items.1.id"), json!("c"));
        assert_eq!(store.get(&path("items.1.id")), Some(json!("c")));
    }

    #[test]
    fn artifact_patch_applies_in_order() {
        let store = StateStore::with_document(json!({
            "workspace": {"artifacts": [{"id": "a1", "data": {"email": "old"}}]}
        }));
        store.apply_artifact_patch(
            "a1",
            Patches::Many(vec![
                ArtifactPatch {
                    op: PatchOp::Set,
                    path: "data.email".into(),
                    value: json!("new"),
                },
                ArtifactPatch {
                    op: PatchOp::Set,
                    path: "data.email".into(),
                    value: json!("newer"),
                },
            ]),
        );
        assert_eq!(
            store.get(&path("workspace.artifacts.0.data.email")),
            Some(json!("newer"))
        );
    }

    #[test]
    fn artifact_patch_unknown_id_is_silent_noop() {
        let initial = json!({"workspace": {"artifacts": [{"id": "a1", "data": {}}]}});
        let store = StateStore::with_document(initial.clone());
        let before = store.revision();
        store.apply_artifact_patch(
            "missing",
            Patches::One(ArtifactPatch {
                op: PatchOp::Set,
                path: "data".into(),
                value: json!({"x": 1}),
            }),
        );
        assert_eq!(store.snapshot(), initial);
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn every_mutation_bumps_the_revision() {
        let store = StateStore::new();
        let mut rx = store.subscribe();
        store.set(&path("a"), json!(1));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();
        // an unrelated path still notifies: whole-tree recompute contract
        store.set(&path("b.c"), json!(2));
        assert!(rx.has_changed().unwrap());
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn replace_region_overwrites_wholesale() {
        let store = StateStore::with_document(json!({"workspace": {"status": "DONE", "extra": 1}}));
        store.replace_region("workspace", json!({"status": "IDLE"}));
        assert_eq!(store.get(&path("workspace")), Some(json!({"status": "IDLE"})));
    }
}
