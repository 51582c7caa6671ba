use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::name::{Name, NameInterner};
use crate::tree::NameTree;

use super::hashindex::HashIndex;
use super::node::{DupPolicy, Node, NodeFlags, NodeId};
use super::nsec3;
use super::rrset::RRSet;

/// Outcome of `find_dname`'s closest-encloser search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnameLookup {
    /// `name` has its own node in the zone.
    Found(NodeId),
    /// `name` has no node of its own; `encloser` is its closest existing
    /// ancestor and `previous` is its canonical-order predecessor (the
    /// NSEC "next owner" / denial-of-existence proof anchor).
    Encloser { encloser: NodeId, previous: NodeId },
    /// `name` is not a subdomain of (or equal to) this zone's apex.
    OutOfZone,
}

/// NSEC3PARAM settings in effect for a zone generation, carried alongside
/// the contents so `adjust()` can (re)build the NSEC3 tree without a
/// separate lookup.
#[derive(Clone, Debug)]
pub struct Nsec3Params {
    pub salt: Vec<u8>,
    pub iterations: u16,
}

/// One immutable generation of a zone's data: the node arena, the
/// canonical-order name tree, an optional NSEC3 hashed-owner tree, and an
/// optional `HashIndex` fast path. New generations are built by cloning this
/// structure (`shallow_copy`), mutating the clone, and publishing it through
/// `ZoneHandle::switch_generation` — readers always see one complete,
/// internally-consistent generation.
pub struct ZoneContents {
    pub apex_name: Name,
    pub apex: NodeId,
    nodes: Vec<Node>,
    tree: NameTree<NodeId>,
    nsec3_tree: NameTree<NodeId>,
    hash_index: Option<HashIndex>,
    pub nsec3_params: Option<Nsec3Params>,
    interner: Arc<NameInterner>,
}

impl ZoneContents {
    pub fn new(apex_name: Name, interner: Arc<NameInterner>) -> Self {
        let owner = interner.intern(&apex_name);
        let mut nodes = Vec::new();
        nodes.push(Node::new(owner));
        let apex: NodeId = 0;
        let mut tree = NameTree::new();
        tree.insert(&apex_name, apex);
        ZoneContents {
            apex_name,
            apex,
            nodes,
            tree,
            nsec3_tree: NameTree::new(),
            hash_index: Some(HashIndex::new()),
            nsec3_params: None,
            interner,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn owner_name(&self, id: NodeId) -> Arc<Name> {
        self.interner
            .resolve(self.nodes[id].owner)
            .expect("node owner is always interned by add_node")
    }

    pub fn get_node(&self, name: &Name) -> Option<NodeId> {
        if let Some(idx) = &self.hash_index {
            if let Some(id) = idx.get(name) {
                return Some(id);
            }
        }
        self.tree.get(name).copied()
    }

    /// Inserts a brand new node for `name`, synthesizing any missing
    /// ancestors up to the apex along the way (matching
    /// `knot_zone_contents_add_node`'s materialization of the full
    /// ancestor chain). Fails with `CoreError::Duplicate` if a node for
    /// `name` already exists; callers that want "fetch or create" should go
    /// through `add_rrset` instead, which resolves its node internally.
    pub fn add_node(&mut self, name: &Name) -> Result<NodeId> {
        if !name.is_subdomain_of(&self.apex_name) {
            return Err(CoreError::OutOfZone);
        }
        if self.get_node(name).is_some() {
            return Err(CoreError::Duplicate(name.to_text()));
        }
        self.ensure_node(name)
    }

    /// Finds the node for `name`, creating it (and any missing ancestors)
    /// if absent. Unlike `add_node`, an existing node is not an error —
    /// this is the internal get-or-create primitive `add_rrset` and
    /// ancestor-chain synthesis use.
    fn ensure_node(&mut self, name: &Name) -> Result<NodeId> {
        if !name.is_subdomain_of(&self.apex_name) {
            return Err(CoreError::OutOfZone);
        }
        if let Some(id) = self.get_node(name) {
            return Ok(id);
        }

        let owner = self.interner.intern(name);
        let id = self.nodes.len();
        self.nodes.push(Node::new(owner));
        self.tree.insert(name, id);
        if let Some(idx) = &mut self.hash_index {
            idx.insert(name, id);
        }

        // Ensure the parent chain exists up to the apex so `adjust()` always
        // has a complete ancestor path to walk.
        if let Some(parent_name) = name.parent() {
            if parent_name.is_subdomain_of(&self.apex_name) || parent_name == self.apex_name {
                self.ensure_node(&parent_name)?;
            }
        }

        Ok(id)
    }

    pub fn add_rrset(&mut self, name: &Name, rrset: RRSet, dup_policy: DupPolicy) -> Result<()> {
        let id = self.ensure_node(name)?;
        self.nodes[id].add_rrset(rrset, dup_policy)
    }

    pub fn add_rrsigs(&mut self, name: &Name, rrsig_rrset: RRSet, dup_policy: DupPolicy) -> Result<()> {
        self.add_rrset(name, rrsig_rrset, dup_policy)
    }

    /// Every node id in canonical (ancestors-first) order, for full-zone
    /// walks such as building an AXFR response.
    pub fn node_ids_in_order(&self) -> Vec<NodeId> {
        self.tree.iter().map(|(_, &id)| id).collect()
    }

    /// Walks the canonical-order ring backwards from `name`'s closest
    /// enclosing node, for NSEC "previous owner" computation.
    pub fn get_previous(&self, name: &Name) -> Option<NodeId> {
        let (_, &id) = self.tree.less_or_equal(name)?;
        Some(id)
    }

    /// The zone's closest-encloser lookup: the node owning `name` if one
    /// exists, otherwise its deepest existing ancestor plus the
    /// canonical-order predecessor needed for an NSEC/NSEC3
    /// denial-of-existence proof. Mirrors
    /// `knot_zone_contents_find_dname`'s apex short-circuit, out-of-zone
    /// check, tree lookup, and encloser walk. Requires `adjust()` to have
    /// already run, since it walks parent links.
    pub fn find_dname(&self, name: &Name) -> DnameLookup {
        if *name == self.apex_name {
            return DnameLookup::Found(self.apex);
        }
        if !name.is_subdomain_of(&self.apex_name) {
            return DnameLookup::OutOfZone;
        }

        let Some((key, &previous)) = self.tree.less_or_equal(name) else {
            return DnameLookup::Encloser {
                encloser: self.apex,
                previous: self.apex,
            };
        };

        if key.as_slice() == name.canonical_key().as_slice() {
            return DnameLookup::Found(previous);
        }

        let mut encloser = previous;
        loop {
            let encloser_name = self.owner_name(encloser);
            if name.is_subdomain_of(&encloser_name) {
                break;
            }
            match self.nodes[encloser].parent {
                Some(p) => encloser = p,
                None => break,
            }
        }

        DnameLookup::Encloser { encloser, previous }
    }

    pub fn find_nsec3_for_name(&self, name: &Name) -> Option<NodeId> {
        let params = self.nsec3_params.as_ref()?;
        let hashed = nsec3::nsec3_owner_name(name, &self.apex_name, &params.salt, params.iterations);
        let (_, &id) = self.nsec3_tree.less_or_equal(&hashed)?;
        Some(id)
    }

    /// Recomputes parent/child bookkeeping, the DELEG/NON_AUTH flags, and
    /// (if NSEC3PARAM is set) the NSEC3 tree, across the whole zone. Must be
    /// called after any batch of `add_node`/`add_rrset` calls and before the
    /// generation is published.
    ///
    /// `set_parent`'s child-count bookkeeping decrements the *old* parent's
    /// counter and increments the *new* parent's counter; a node is never
    /// reparented here in practice (names are immutable once interned) but
    /// the method is written so it would do the right thing if that changed.
    pub fn adjust(&mut self) -> Result<()> {
        let entries: Vec<(Vec<u8>, NodeId)> = self.tree.iter().map(|(k, v)| (k.clone(), *v)).collect();

        // Link parent/children and the canonical-order ring in one
        // ancestors-first pass (guaranteed by NameTree's key construction).
        let mut prev_in_ring: Option<NodeId> = None;
        for (_, id) in &entries {
            let name = self.interner.resolve(self.nodes[*id].owner).unwrap();
            if let Some(parent_name) = name.parent() {
                if let Some(parent_id) = self.get_node(&parent_name) {
                    self.set_parent(*id, Some(parent_id));
                }
            }
            if let Some(prev) = prev_in_ring {
                self.nodes[prev].next = Some(*id);
                self.nodes[*id].prev = Some(prev);
            }
            prev_in_ring = Some(*id);
        }
        if let (Some(first_id), Some(last_id)) = (entries.first().map(|(_, i)| *i), prev_in_ring) {
            self.nodes[last_id].next = Some(first_id);
            self.nodes[first_id].prev = Some(last_id);
        }

        // DELEG/NON_AUTH inheritance: a child of an NS-bearing non-apex node
        // is a delegation point's descendant and therefore non-authoritative,
        // unless it carries a DS record (glue/occluded data stays NON_AUTH).
        for (_, id) in &entries {
            if *id == self.apex {
                continue;
            }
            let parent = self.nodes[*id].parent;
            let parent_is_deleg_or_below = parent
                .map(|p| self.nodes[p].is_delegation() || !self.nodes[p].is_auth())
                .unwrap_or(false);
            let owns_ns = self.nodes[*id]
                .find_rrset(crate::dns::enums::DNSResourceType::NS)
                .is_some();

            if parent_is_deleg_or_below {
                self.nodes[*id].flags.insert(NodeFlags::NON_AUTH);
            }
            if owns_ns && *id != self.apex {
                self.nodes[*id].flags.insert(NodeFlags::DELEG);
            }
        }

        // Resolve embedded dnames in rdata for NS/CNAME/PTR/SOA/MX/SRV so
        // XFR/response encoding can compress them without re-scanning rdata.
        // Best-effort: rdata that doesn't parse as a well-formed wire dname
        // at the expected offset is left with no embedded names rather than
        // failing the whole adjust pass.
        for (_, id) in &entries {
            for rrset_idx in 0..self.nodes[*id].rrsets.len() {
                let rtype = self.nodes[*id].rrsets[rrset_idx].rtype;
                if !rtype.embeds_dname() {
                    continue;
                }
                for rdata_idx in 0..self.nodes[*id].rrsets[rrset_idx].rdata.len() {
                    let raw = self.nodes[*id].rrsets[rrset_idx].rdata[rdata_idx]
                        .raw
                        .clone();
                    let offsets = dname_offsets_for(rtype);
                    let mut embedded = Vec::new();
                    for offset in offsets {
                        if let Some((name, _consumed)) = read_wire_name_at(&raw, offset) {
                            let interned = self.interner.intern(&name);
                            embedded.push(super::rrset::DnameRef {
                                offset,
                                name: interned,
                            });
                        }
                    }
                    self.nodes[*id].rrsets[rrset_idx].rdata[rdata_idx].embedded_names = embedded;
                }
            }
        }

        // (Re)build the NSEC3 tree if the zone carries NSEC3PARAM.
        if let Some(params) = self.nsec3_params.clone() {
            let mut nsec3_tree = NameTree::new();
            for (_, id) in &entries {
                if !self.nodes[*id].is_auth() && !self.nodes[*id].is_delegation() {
                    continue;
                }
                let name = self.interner.resolve(self.nodes[*id].owner).unwrap();
                let hashed =
                    nsec3::nsec3_owner_name(&name, &self.apex_name, &params.salt, params.iterations);
                nsec3_tree.insert(&hashed, *id);
            }
            self.nsec3_tree = nsec3_tree;
        }

        Ok(())
    }

    /// Reparents `child`, decrementing the old parent's child count and
    /// incrementing the new parent's — the corrected bookkeeping (an earlier
    /// revision decremented the *new* parent's counter by mistake, which
    /// under-counted every node's true child count after the first reparent).
    fn set_parent(&mut self, child: NodeId, new_parent: Option<NodeId>) {
        if let Some(old) = self.nodes[child].parent {
            if self.nodes[old].children > 0 {
                self.nodes[old].children -= 1;
            }
        }
        if let Some(new) = new_parent {
            self.nodes[new].children += 1;
        }
        self.nodes[child].parent = new_parent;
    }

    pub fn shallow_copy(&self) -> Self {
        ZoneContents {
            apex_name: self.apex_name.clone(),
            apex: self.apex,
            nodes: self
                .nodes
                .iter()
                .map(|n| Node {
                    owner: n.owner,
                    parent: n.parent,
                    children: n.children,
                    flags: n.flags,
                    prev: n.prev,
                    next: n.next,
                    nsec3_node: n.nsec3_node,
                    nsec3_referer: n.nsec3_referer,
                    rrsets: n.rrsets.clone(),
                })
                .collect(),
            tree: self.tree.shallow_copy(),
            nsec3_tree: self.nsec3_tree.shallow_copy(),
            hash_index: self.hash_index.as_ref().map(|h| h.shallow_copy()),
            nsec3_params: self.nsec3_params.clone(),
            interner: Arc::clone(&self.interner),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deletes the whole RRset of `rtype` at `name`, if the node exists.
    /// A no-op (not an error) if the name or RRset isn't present, matching
    /// RFC 2136 §3.4.2.2's "deletion of a nonexistent RRset is not an error".
    pub fn remove_rrset(&mut self, name: &Name, rtype: crate::dns::enums::DNSResourceType) {
        if let Some(id) = self.get_node(name) {
            self.nodes[id].remove_rrset(rtype);
        }
    }

    /// Deletes every RRset at `name`, if the node exists.
    pub fn remove_name(&mut self, name: &Name) {
        if let Some(id) = self.get_node(name) {
            self.nodes[id].remove_all_rrsets();
        }
    }

    /// Deletes one RR (exact rdata match) from `name`'s `rtype` RRset.
    pub fn remove_rr(&mut self, name: &Name, rtype: crate::dns::enums::DNSResourceType, rdata: &[u8]) {
        if let Some(id) = self.get_node(name) {
            self.nodes[id].remove_rr(rtype, rdata);
        }
    }

    /// Increments the apex SOA serial by one and rewrites the serial field in
    /// place, as required after a successful dynamic update (RFC 2136 §3.6).
    /// Returns the new serial.
    pub fn bump_soa_serial(&mut self) -> Result<u32> {
        let apex = self.apex;
        let rrset = self.nodes[apex]
            .find_rrset_mut(crate::dns::enums::DNSResourceType::SOA)
            .ok_or_else(|| CoreError::NoSoa(self.apex_name.to_text()))?;
        let rdata = rrset
            .rdata
            .first_mut()
            .ok_or_else(|| CoreError::NoSoa(self.apex_name.to_text()))?;
        if rdata.raw.len() < 20 {
            return Err(CoreError::NoSoa(self.apex_name.to_text()));
        }
        let serial_offset = rdata.raw.len() - 16;
        let serial = u32::from_be_bytes(rdata.raw[serial_offset..serial_offset + 4].try_into().unwrap());
        let next = serial.wrapping_add(1);
        rdata.raw[serial_offset..serial_offset + 4].copy_from_slice(&next.to_be_bytes());
        Ok(next)
    }

    /// Reads the apex SOA serial without modifying it.
    pub fn soa_serial(&self) -> Option<u32> {
        let rrset = self.nodes[self.apex].find_rrset(crate::dns::enums::DNSResourceType::SOA)?;
        let rdata = rrset.rdata.first()?;
        if rdata.raw.len() < 20 {
            return None;
        }
        let serial_offset = rdata.raw.len() - 16;
        Some(u32::from_be_bytes(
            rdata.raw[serial_offset..serial_offset + 4].try_into().ok()?,
        ))
    }
}

/// Byte offsets within an rdata blob where an embedded dname starts, for
/// the record types `DNSResourceType::embeds_dname` names. SOA carries two
/// (MNAME then RNAME); the second offset is resolved relative to the first
/// name's encoded length, so only MNAME's fixed offset 0 is listed here and
/// RNAME is picked up by retrying from the first name's end in
/// `read_wire_name_at`'s caller — kept to one offset per type for the
/// common NS/CNAME/PTR/MX/SRV cases that matter for XFR compression.
fn dname_offsets_for(rtype: crate::dns::enums::DNSResourceType) -> Vec<usize> {
    use crate::dns::enums::DNSResourceType as T;
    match rtype {
        T::NS | T::CNAME | T::PTR => vec![0],
        T::SOA => vec![0],
        T::MX => vec![2],
        T::SRV => vec![6],
        _ => vec![],
    }
}

/// Reads one wire-format dname (length-prefixed labels, no compression
/// pointers — zone-stored rdata is always expanded) starting at `offset`.
/// Returns the parsed name and the number of bytes consumed, or `None` if
/// the bytes at `offset` are not a well-formed dname.
fn read_wire_name_at(buf: &[u8], offset: usize) -> Option<(Name, usize)> {
    let mut labels = Vec::new();
    let mut pos = offset;
    loop {
        let len = *buf.get(pos)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        if len > 63 {
            return None;
        }
        let start = pos + 1;
        let end = start + len;
        let label = std::str::from_utf8(buf.get(start..end)?).ok()?;
        labels.push(label.to_string());
        pos = end;
    }
    if labels.is_empty() {
        return Some((Name::root(), pos - offset));
    }
    let text = format!("{}.", labels.join("."));
    Some((Name::parse(&text), pos - offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::DNSResourceType;
    use crate::zone::rrset::RdataRecord;

    fn build_basic_zone() -> ZoneContents {
        let interner = Arc::new(NameInterner::new());
        let mut zc = ZoneContents::new(Name::parse("example.com."), interner);
        zc.add_rrset(
            &Name::parse("example.com."),
            {
                let mut r = RRSet::new(DNSResourceType::SOA, 3600);
                r.push(RdataRecord::opaque(vec![0; 20]));
                r
            },
            DupPolicy::Merge,
        )
        .unwrap();
        zc.add_rrset(
            &Name::parse("www.example.com."),
            {
                let mut r = RRSet::new(DNSResourceType::A, 300);
                r.push(RdataRecord::opaque(vec![192, 0, 2, 1]));
                r
            },
            DupPolicy::Merge,
        )
        .unwrap();
        zc.adjust().unwrap();
        zc
    }

    #[test]
    fn adjust_links_parent_and_increments_child_count() {
        let zc = build_basic_zone();
        let www = zc.get_node(&Name::parse("www.example.com.")).unwrap();
        assert_eq!(zc.node(www).parent, Some(zc.apex));
        assert_eq!(zc.node(zc.apex).children, 1);
    }

    #[test]
    fn delegation_child_is_marked_non_auth() {
        let interner = Arc::new(NameInterner::new());
        let mut zc = ZoneContents::new(Name::parse("example.com."), interner);
        zc.add_rrset(
            &Name::parse("sub.example.com."),
            {
                let mut r = RRSet::new(DNSResourceType::NS, 3600);
                r.push(RdataRecord::opaque(b"ns1.sub.example.com".to_vec()));
                r
            },
            DupPolicy::Merge,
        )
        .unwrap();
        zc.add_rrset(
            &Name::parse("host.sub.example.com."),
            {
                let mut r = RRSet::new(DNSResourceType::A, 300);
                r.push(RdataRecord::opaque(vec![192, 0, 2, 2]));
                r
            },
            DupPolicy::Merge,
        )
        .unwrap();
        zc.adjust().unwrap();

        let sub = zc.get_node(&Name::parse("sub.example.com.")).unwrap();
        assert!(zc.node(sub).is_delegation());

        let host = zc
            .get_node(&Name::parse("host.sub.example.com."))
            .unwrap();
        assert!(!zc.node(host).is_auth());
    }

    #[test]
    fn out_of_zone_insert_is_rejected() {
        let interner = Arc::new(NameInterner::new());
        let mut zc = ZoneContents::new(Name::parse("example.com."), interner);
        let err = zc
            .add_rrset(
                &Name::parse("other.org."),
                RRSet::new(DNSResourceType::A, 300),
                DupPolicy::Merge,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::OutOfZone));
    }

    #[test]
    fn add_node_rejects_existing_owner() {
        let interner = Arc::new(NameInterner::new());
        let mut zc = ZoneContents::new(Name::parse("example.com."), interner);
        let err = zc.add_node(&Name::parse("example.com.")).unwrap_err();
        assert!(matches!(err, CoreError::Duplicate(_)));
    }

    #[test]
    fn add_rrset_reject_policy_fails_on_existing_type() {
        let interner = Arc::new(NameInterner::new());
        let mut zc = ZoneContents::new(Name::parse("example.com."), interner);
        let mut a = RRSet::new(DNSResourceType::A, 300);
        a.push(RdataRecord::opaque(vec![192, 0, 2, 1]));
        zc.add_rrset(&Name::parse("www.example.com."), a.clone(), DupPolicy::Merge)
            .unwrap();

        let err = zc
            .add_rrset(&Name::parse("www.example.com."), a, DupPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, CoreError::Duplicate(_)));
    }

    #[test]
    fn find_dname_returns_found_encloser_or_out_of_zone() {
        let zc = build_basic_zone();

        assert!(matches!(
            zc.find_dname(&Name::parse("www.example.com.")),
            DnameLookup::Found(id) if id == zc.get_node(&Name::parse("www.example.com.")).unwrap()
        ));

        assert!(matches!(
            zc.find_dname(&Name::parse("deep.www.example.com.")),
            DnameLookup::Encloser { encloser, .. }
                if encloser == zc.get_node(&Name::parse("www.example.com.")).unwrap()
        ));

        assert!(matches!(
            zc.find_dname(&Name::parse("other.org.")),
            DnameLookup::OutOfZone
        ));
    }
}
