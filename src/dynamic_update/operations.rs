//! Dynamic update operations and prerequisite checks (RFC 2136 §3.2, §3.4).

use super::UpdateError;
use crate::dns::enums::DNSResourceType;
use crate::name::Name;
use crate::zone::{DupPolicy, RRSet, RdataRecord, ZoneContents};
use tracing::{debug, info};

/// Prerequisite conditions for updates
#[derive(Debug, Clone, PartialEq)]
pub enum PrerequisiteCheck {
    /// RRset exists (value independent) - ANY class, type != ANY
    RRsetExists { name: String, rtype: DNSResourceType },
    /// RRset exists (value dependent) - IN class
    RRsetExistsValue {
        name: String,
        rtype: DNSResourceType,
        rdata: Vec<u8>,
    },
    /// Name is in use - ANY class, type = ANY
    NameExists(String),
    /// RRset does not exist - NONE class, type != ANY
    RRsetNotExists { name: String, rtype: DNSResourceType },
    /// Name is not in use - NONE class, type = ANY
    NameNotExists(String),
}

/// Update operations
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperation {
    /// Add to an RRset - IN class
    Add {
        name: String,
        ttl: u32,
        rtype: DNSResourceType,
        rdata: Vec<u8>,
    },
    /// Delete an RRset - ANY class, type != ANY
    DeleteRRset { name: String, rtype: DNSResourceType },
    /// Delete all RRsets at a name - ANY class, type = ANY
    DeleteName(String),
    /// Delete specific RR - NONE class
    DeleteRR {
        name: String,
        rtype: DNSResourceType,
        rdata: Vec<u8>,
    },
}

fn parse_name(text: &str) -> Name {
    Name::parse(&format!("{}.", text.trim_end_matches('.')))
}

/// Check if a prerequisite is satisfied against the zone about to be updated.
pub fn check_prerequisite(
    contents: &ZoneContents,
    prereq: &PrerequisiteCheck,
) -> Result<bool, UpdateError> {
    match prereq {
        PrerequisiteCheck::RRsetExists { name, rtype } => {
            debug!("Checking if RRset exists: {} {:?}", name, rtype);
            let exists = contents
                .get_node(&parse_name(name))
                .map(|id| contents.node(id).find_rrset(*rtype).is_some())
                .unwrap_or(false);
            Ok(exists)
        }

        PrerequisiteCheck::RRsetExistsValue { name, rtype, rdata } => {
            debug!("Checking if RRset exists with value: {} {:?}", name, rtype);
            let exists = contents
                .get_node(&parse_name(name))
                .and_then(|id| contents.node(id).find_rrset(*rtype))
                .map(|rrset| rrset.rdata.iter().any(|r| r.raw == *rdata))
                .unwrap_or(false);
            Ok(exists)
        }

        PrerequisiteCheck::NameExists(name) => {
            debug!("Checking if name exists: {}", name);
            Ok(contents.get_node(&parse_name(name)).is_some())
        }

        PrerequisiteCheck::RRsetNotExists { name, rtype } => {
            debug!("Checking if RRset does not exist: {} {:?}", name, rtype);
            let exists = contents
                .get_node(&parse_name(name))
                .map(|id| contents.node(id).find_rrset(*rtype).is_some())
                .unwrap_or(false);
            Ok(!exists)
        }

        PrerequisiteCheck::NameNotExists(name) => {
            debug!("Checking if name does not exist: {}", name);
            Ok(contents.get_node(&parse_name(name)).is_none())
        }
    }
}

/// Apply an update operation to the zone's working contents.
pub fn apply_update(contents: &mut ZoneContents, update: &UpdateOperation) -> Result<(), UpdateError> {
    match update {
        UpdateOperation::Add {
            name,
            ttl,
            rtype,
            rdata,
        } => {
            info!("Adding record: {} {} {:?}", name, ttl, rtype);
            let owner = parse_name(name);

            let mut rrset = RRSet::new(*rtype, *ttl);
            rrset.push(RdataRecord::opaque(rdata.clone()));

            contents
                .add_rrset(&owner, rrset, DupPolicy::Merge)
                .map_err(|e| UpdateError::UpdateFailed(format!("failed to add record: {e}")))?;

            Ok(())
        }

        UpdateOperation::DeleteRRset { name, rtype } => {
            info!("Deleting RRset: {} {:?}", name, rtype);
            contents.remove_rrset(&parse_name(name), *rtype);
            Ok(())
        }

        UpdateOperation::DeleteName(name) => {
            info!("Deleting all records at name: {}", name);
            contents.remove_name(&parse_name(name));
            Ok(())
        }

        UpdateOperation::DeleteRR { name, rtype, rdata } => {
            info!("Deleting specific record: {} {:?}", name, rtype);
            contents.remove_rr(&parse_name(name), *rtype, rdata);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::NameInterner;
    use std::sync::Arc;

    fn test_zone() -> ZoneContents {
        let interner = Arc::new(NameInterner::new());
        let mut zc = ZoneContents::new(Name::parse("example.com."), interner);
        let mut soa = RRSet::new(DNSResourceType::SOA, 3600);
        soa.push(RdataRecord::opaque(vec![0u8; 30]));
        zc.add_rrset(&Name::parse("example.com."), soa, DupPolicy::Merge).unwrap();
        zc
    }

    #[test]
    fn prerequisite_rrset_exists_matches_only_configured_type() {
        let mut zone = test_zone();
        let mut a = RRSet::new(DNSResourceType::A, 300);
        a.push(RdataRecord::opaque(vec![192, 0, 2, 1]));
        zone.add_rrset(&Name::parse("www.example.com."), a, DupPolicy::Merge).unwrap();

        let exists = PrerequisiteCheck::RRsetExists {
            name: "www.example.com".to_string(),
            rtype: DNSResourceType::A,
        };
        assert!(check_prerequisite(&zone, &exists).unwrap());

        let missing = PrerequisiteCheck::RRsetExists {
            name: "www.example.com".to_string(),
            rtype: DNSResourceType::AAAA,
        };
        assert!(!check_prerequisite(&zone, &missing).unwrap());
    }

    #[test]
    fn update_add_creates_new_rrset() {
        let mut zone = test_zone();
        let update = UpdateOperation::Add {
            name: "test.example.com".to_string(),
            ttl: 300,
            rtype: DNSResourceType::A,
            rdata: vec![192, 0, 2, 1],
        };
        apply_update(&mut zone, &update).unwrap();

        let id = zone.get_node(&Name::parse("test.example.com.")).unwrap();
        let rrset = zone.node(id).find_rrset(DNSResourceType::A).unwrap();
        assert_eq!(rrset.rdata.len(), 1);
        assert_eq!(rrset.rdata[0].raw, vec![192, 0, 2, 1]);
    }

    #[test]
    fn update_delete_rrset_removes_all_values() {
        let mut zone = test_zone();
        let mut a = RRSet::new(DNSResourceType::A, 300);
        a.push(RdataRecord::opaque(vec![192, 0, 2, 1]));
        a.push(RdataRecord::opaque(vec![192, 0, 2, 2]));
        zone.add_rrset(&Name::parse("www.example.com."), a, DupPolicy::Merge).unwrap();

        let update = UpdateOperation::DeleteRRset {
            name: "www.example.com".to_string(),
            rtype: DNSResourceType::A,
        };
        apply_update(&mut zone, &update).unwrap();

        let id = zone.get_node(&Name::parse("www.example.com.")).unwrap();
        assert!(zone.node(id).find_rrset(DNSResourceType::A).is_none());
    }
}
