use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

use super::Name;

/// A stable handle to an interned name. Cheap to copy and compare; the
/// backing `Name` is looked up through the owning `NameInterner`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternedName(u32);

/// Deduplicates `Name` values across a zone so that nodes, rrsets and the
/// NSEC3 tree can hold a cheap `InternedName` instead of cloning wire bytes
/// at every reference. Grounded on the teacher's `DashMap`-backed
/// `StringInterner` (`pool.rs`), generalized from `Arc<str>` text to `Name`.
pub struct NameInterner {
    by_name: DashMap<Vec<u8>, InternedName>,
    by_id: DashMap<u32, Arc<Name>>,
    next_id: AtomicU32,
}

impl Default for NameInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl NameInterner {
    pub fn new() -> Self {
        NameInterner {
            by_name: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    pub fn intern(&self, name: &Name) -> InternedName {
        let key = name.canonical_key();
        if let Some(existing) = self.by_name.get(&key) {
            return *existing;
        }
        let id = InternedName(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.by_id.insert(id.0, Arc::new(name.clone()));
        self.by_name.insert(key, id);
        id
    }

    pub fn resolve(&self, id: InternedName) -> Option<Arc<Name>> {
        self.by_id.get(&id.0).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_name_returns_the_same_id() {
        let interner = NameInterner::new();
        let a = interner.intern(&Name::parse("example.com."));
        let b = interner.intern(&Name::parse("EXAMPLE.com."));
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn distinct_names_get_distinct_ids() {
        let interner = NameInterner::new();
        let a = interner.intern(&Name::parse("a.example.com."));
        let b = interner.intern(&Name::parse("b.example.com."));
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a).unwrap().to_text(), "a.example.com.");
    }
}
