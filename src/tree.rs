use std::collections::BTreeMap;

use crate::name::Name;

/// Canonical-order name tree backed by `BTreeMap`'s own ordering. Keys are
/// `Name::canonical_key()` byte strings; because that key is built
/// root-label-first, a zone apex's key is always a byte-prefix of (and
/// therefore immediately precedes) every one of its descendants' keys in
/// iteration order. That single property is what lets `apply_inorder` visit
/// every ancestor before its descendants in one linear pass, and what makes
/// `less_or_equal` double as "closest enclosing name or empty non-terminal".
pub struct NameTree<V> {
    map: BTreeMap<Vec<u8>, V>,
}

impl<V> Default for NameTree<V> {
    fn default() -> Self {
        NameTree { map: BTreeMap::new() }
    }
}

impl<V> NameTree<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` at `name`'s canonical key. Returns `true` if no
    /// entry existed for `name` (insert performed) or `false` if one
    /// already did, in which case the existing entry is left untouched —
    /// this tree never silently overwrites a duplicate key.
    pub fn insert(&mut self, name: &Name, value: V) -> bool {
        use std::collections::btree_map::Entry;
        match self.map.entry(name.canonical_key()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, name: &Name) -> Option<&V> {
        self.map.get(&name.canonical_key()[..])
    }

    pub fn get_mut(&mut self, name: &Name) -> Option<&mut V> {
        self.map.get_mut(&name.canonical_key()[..])
    }

    pub fn remove(&mut self, name: &Name) -> Option<V> {
        self.map.remove(&name.canonical_key()[..])
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.map.contains_key(&name.canonical_key()[..])
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the entry whose key is the greatest key `<=` `name`'s key —
    /// the canonical-order predecessor used by NSEC/NSEC3 "previous name"
    /// lookups and by closest-encloser search. When `name` precedes every
    /// entry in the tree, wraps around to the tree's largest entry, so a
    /// query at the very start of the canonical ring still gets a usable
    /// predecessor for denial-of-existence proofs.
    pub fn less_or_equal(&self, name: &Name) -> Option<(&Vec<u8>, &V)> {
        let key = name.canonical_key();
        self.map
            .range::<[u8], _>(..=key.as_slice())
            .next_back()
            .or_else(|| self.map.iter().next_back())
    }

    /// Visits every entry in canonical (ancestors-first) order.
    pub fn apply_inorder<F: FnMut(&Vec<u8>, &V)>(&self, mut f: F) {
        for (k, v) in self.map.iter() {
            f(k, v);
        }
    }

    /// Visits every entry in reverse canonical (descendants-first) order.
    pub fn apply_reverse<F: FnMut(&Vec<u8>, &V)>(&self, mut f: F) {
        for (k, v) in self.map.iter().rev() {
            f(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &V)> {
        self.map.iter()
    }
}

impl<V: Clone> NameTree<V> {
    /// Shallow copy: new map, cloned values. Used to materialize the next
    /// zone generation without disturbing readers of the current one.
    pub fn shallow_copy(&self) -> Self {
        NameTree {
            map: self.map.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apex_key_precedes_descendants_in_iteration_order() {
        let mut tree: NameTree<&str> = NameTree::new();
        tree.insert(&Name::parse("www.example.com."), "www");
        tree.insert(&Name::parse("example.com."), "apex");
        tree.insert(&Name::parse("mail.example.com."), "mail");

        let order: Vec<&str> = tree.iter().map(|(_, v)| *v).collect();
        assert_eq!(order[0], "apex");
    }

    #[test]
    fn less_or_equal_finds_closest_encloser() {
        let mut tree: NameTree<&str> = NameTree::new();
        tree.insert(&Name::parse("example.com."), "apex");
        tree.insert(&Name::parse("a.example.com."), "a");

        let (_, v) = tree
            .less_or_equal(&Name::parse("deep.a.example.com."))
            .unwrap();
        assert_eq!(*v, "a");
    }

    #[test]
    fn less_or_equal_wraps_to_largest_entry_when_name_precedes_all() {
        let mut tree: NameTree<&str> = NameTree::new();
        tree.insert(&Name::parse("b.example.com."), "b");
        tree.insert(&Name::parse("m.example.com."), "m");

        // "aaa..." sorts before every stored key, so the predecessor wraps
        // around to the tree's maximum entry instead of returning nothing.
        let (_, v) = tree
            .less_or_equal(&Name::parse("aaa.example.com."))
            .unwrap();
        assert_eq!(*v, "m");
    }

    #[test]
    fn insert_rejects_duplicate_without_overwriting() {
        let mut tree: NameTree<&str> = NameTree::new();
        assert!(tree.insert(&Name::parse("example.com."), "first"));
        assert!(!tree.insert(&Name::parse("example.com."), "second"));
        assert_eq!(*tree.get(&Name::parse("example.com.")).unwrap(), "first");
    }
}
