use crate::dns::enums::DNSResourceType;
use crate::name::InternedName;

/// A reference to a dname embedded inside an rdata blob, at byte `offset`
/// within `RdataRecord::raw`, resolved to an already-interned name. Computed
/// once during `ZoneContents::adjust()` (see spec note on
/// `_dnames_from_rdata_to_table`) so that XFR/response encoding never has to
/// re-walk rdata bytes to find compressible names.
#[derive(Clone, Debug)]
pub struct DnameRef {
    pub offset: usize,
    pub name: InternedName,
}

/// One resource record's data. Only the record types listed in
/// `DNSResourceType::embeds_dname` get their embedded names parsed out into
/// `embedded_names`; everything else is carried as opaque `raw` bytes. This
/// is a deliberate scope reduction from wire-accurate parsing of every RR
/// type: the zone core only needs embedded names for compression and for
/// following delegations/aliases, not for interpreting every RDATA field.
#[derive(Clone, Debug)]
pub struct RdataRecord {
    pub raw: Vec<u8>,
    pub embedded_names: Vec<DnameRef>,
}

impl RdataRecord {
    pub fn opaque(raw: Vec<u8>) -> Self {
        RdataRecord {
            raw,
            embedded_names: Vec::new(),
        }
    }
}

/// One RRSet: same owner (implicit, held by the enclosing `Node`), same
/// type and class, one or more rdata instances sharing one TTL per RFC 2181
/// §5.2.
#[derive(Clone, Debug)]
pub struct RRSet {
    pub rtype: DNSResourceType,
    pub ttl: u32,
    pub rdata: Vec<RdataRecord>,
}

impl RRSet {
    pub fn new(rtype: DNSResourceType, ttl: u32) -> Self {
        RRSet {
            rtype,
            ttl,
            rdata: Vec::new(),
        }
    }

    pub fn push(&mut self, rdata: RdataRecord) {
        self.rdata.push(rdata);
    }

    pub fn rr_count(&self) -> usize {
        self.rdata.len()
    }
}
