use rustc_hash::FxHashMap;

use crate::name::Name;

use super::node::NodeId;

/// Optional O(1) exact-name lookup accelerator sitting beside the
/// canonical-order `NameTree`. The tree remains the source of truth for
/// ordering (NSEC/NSEC3 walks, closest-encloser search); this index only
/// short-circuits the common case of an exact-match query, trading an
/// `FxHashMap` (non-cryptographic hasher, since keys are already
/// attacker-influenced-but-bounded domain names under our own zone) for
/// avoiding the `BTreeMap`'s O(log n) descent on the hot query path.
#[derive(Default)]
pub struct HashIndex {
    by_key: FxHashMap<Vec<u8>, NodeId>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &Name, id: NodeId) {
        self.by_key.insert(name.canonical_key(), id);
    }

    pub fn remove(&mut self, name: &Name) {
        self.by_key.remove(&name.canonical_key());
    }

    pub fn get(&self, name: &Name) -> Option<NodeId> {
        self.by_key.get(&name.canonical_key()[..]).copied()
    }

    pub fn shallow_copy(&self) -> Self {
        HashIndex {
            by_key: self.by_key.clone(),
        }
    }
}
