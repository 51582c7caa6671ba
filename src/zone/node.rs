use crate::error::{CoreError, Result};
use crate::name::InternedName;

use super::rrset::RRSet;

/// How `add_rrset` should handle an owner name that already carries an
/// RRSet of the incoming type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupPolicy {
    /// Fold the incoming rdata into the existing RRSet, skipping any rdata
    /// already present (by exact wire-byte match), and adopt the incoming
    /// TTL per RFC 2181 §5.2.
    Merge,
    /// Fail instead of touching the existing RRSet.
    Reject,
}

/// Minimal hand-rolled bitflags, since this crate does not otherwise depend
/// on the `bitflags` crate and the set is small and fixed.
macro_rules! bitflags_like {
    (
        $(#[$outer:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$outer])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
        pub struct $name($ty);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(&self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_like! {
    /// Per-node flags. Only the two bits that change query-time behavior are
    /// modeled; `is_auth()` must test exactly this mask, not the whole byte
    /// (an earlier revision compared the raw flags byte against zero and
    /// misclassified any node carrying an unrelated bit as non-authoritative).
    pub struct NodeFlags: u8 {
        const DELEG = 0b0000_0001;
        const NON_AUTH = 0b0000_0010;
        const WILDCARD_CHILD = 0b0000_0100;
        const NSEC3_NODE = 0b0000_1000;
    }
}

/// Index into a `ZoneContents`' node arena. Not a pointer: nodes reference
/// each other by `NodeId` rather than `Rc`/`Arc`, so the parent/children and
/// canonical-order ring relations never form a reference cycle.
pub type NodeId = usize;

/// One owner name's worth of state in a zone's canonical-order tree.
pub struct Node {
    pub owner: InternedName,
    pub parent: Option<NodeId>,
    pub children: u32,
    pub flags: NodeFlags,
    /// Canonical-order ring: every authoritative node in a zone forms a
    /// doubly linked ring via these, so `get_previous`/NSEC "next owner"
    /// walks never need to re-touch the tree.
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    /// For a node whose hashed owner appears in the NSEC3 tree, the id of
    /// that NSEC3 node; for an NSEC3 node itself, the id of the node it
    /// covers (the "referer").
    pub nsec3_node: Option<NodeId>,
    pub nsec3_referer: Option<NodeId>,
    pub rrsets: Vec<RRSet>,
}

impl Node {
    pub fn new(owner: InternedName) -> Self {
        Node {
            owner,
            parent: None,
            children: 0,
            flags: NodeFlags::empty(),
            prev: None,
            next: None,
            nsec3_node: None,
            nsec3_referer: None,
            rrsets: Vec::new(),
        }
    }

    pub fn is_auth(&self) -> bool {
        !self
            .flags
            .intersects(NodeFlags::DELEG | NodeFlags::NON_AUTH)
    }

    pub fn is_delegation(&self) -> bool {
        self.flags.contains(NodeFlags::DELEG)
    }

    pub fn find_rrset(&self, rtype: crate::dns::enums::DNSResourceType) -> Option<&RRSet> {
        self.rrsets.iter().find(|r| r.rtype == rtype)
    }

    pub fn find_rrset_mut(
        &mut self,
        rtype: crate::dns::enums::DNSResourceType,
    ) -> Option<&mut RRSet> {
        self.rrsets.iter_mut().find(|r| r.rtype == rtype)
    }

    /// Attaches `rrset` to this node under `policy`. `Merge` appends any
    /// rdata not already present into the existing same-type RRSet (and
    /// adopts the incoming TTL); `Reject` fails with `CoreError::Duplicate`
    /// if an RRSet of that type is already here. Either way, if no RRSet of
    /// that type exists yet, `rrset` is simply attached.
    pub fn add_rrset(&mut self, rrset: RRSet, policy: DupPolicy) -> Result<()> {
        if let Some(existing) = self.find_rrset_mut(rrset.rtype) {
            match policy {
                DupPolicy::Reject => {
                    return Err(CoreError::Duplicate(format!(
                        "RRset of type {:?} already exists",
                        rrset.rtype
                    )));
                }
                DupPolicy::Merge => {
                    existing.ttl = rrset.ttl;
                    for rdata in rrset.rdata {
                        if !existing.rdata.iter().any(|r| r.raw == rdata.raw) {
                            existing.rdata.push(rdata);
                        }
                    }
                }
            }
        } else {
            self.rrsets.push(rrset);
        }
        Ok(())
    }

    pub fn is_empty_non_terminal(&self) -> bool {
        self.rrsets.is_empty()
    }

    /// Removes the whole RRset of `rtype`, if present. Used by RFC 2136
    /// UPDATE's "delete an RRset" form.
    pub fn remove_rrset(&mut self, rtype: crate::dns::enums::DNSResourceType) {
        self.rrsets.retain(|r| r.rtype != rtype);
    }

    /// Removes every RRset at this node. Used by UPDATE's "delete all RRsets
    /// at a name" form.
    pub fn remove_all_rrsets(&mut self) {
        self.rrsets.clear();
    }

    /// Removes a single RR matching `rtype` and exact `rdata` from its
    /// RRset, dropping the RRset entirely if it becomes empty. Used by
    /// UPDATE's "delete an RR from an RRset" form.
    pub fn remove_rr(&mut self, rtype: crate::dns::enums::DNSResourceType, rdata: &[u8]) {
        if let Some(rrset) = self.find_rrset_mut(rtype) {
            rrset.rdata.retain(|r| r.raw != rdata);
            if rrset.rdata.is_empty() {
                self.remove_rrset(rtype);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_auth_tests_only_deleg_and_non_auth_bits() {
        let mut n = Node::new(InternedName::default());
        n.flags.insert(NodeFlags::WILDCARD_CHILD);
        assert!(n.is_auth(), "an unrelated flag must not suppress is_auth");

        n.flags.insert(NodeFlags::DELEG);
        assert!(!n.is_auth());
    }
}
