//! RFC 2136 Dynamic DNS Update implementation
//!
//! This module provides secure dynamic DNS update functionality with:
//! - TSIG authentication for secure updates
//! - Prerequisite checking for conditional updates
//! - Add, delete, and replace operations
//! - Policy-based access control

use crate::dns::DNSResource;
use crate::dns::{DNSPacket, enums::*};
use crate::name::Name;
use crate::xfr::notify::notify_secondaries;
use crate::xfr::{NotifyHandler, TsigContext, TsigKey, TsigRecord, tsig_variables, unix_now};
use crate::zone::ZoneStore;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod operations;
pub mod policy;

pub use operations::{PrerequisiteCheck, UpdateOperation};
pub use policy::{UpdatePermission, UpdatePolicy};

/// Errors that can occur during dynamic updates
#[derive(Debug, Clone)]
pub enum UpdateError {
    /// The zone is not found or not authoritative
    NotAuth(String),
    /// The update was refused due to policy
    Refused(String),
    /// TSIG authentication failed
    NotVerified(String),
    /// A prerequisite was not satisfied
    PrereqFailed(String),
    /// The update operation failed
    UpdateFailed(String),
    /// Internal server error
    ServerError(String),
}

impl std::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateError::NotAuth(msg) => write!(f, "Not authoritative: {}", msg),
            UpdateError::Refused(msg) => write!(f, "Update refused: {}", msg),
            UpdateError::NotVerified(msg) => write!(f, "TSIG verification failed: {}", msg),
            UpdateError::PrereqFailed(msg) => write!(f, "Prerequisite failed: {}", msg),
            UpdateError::UpdateFailed(msg) => write!(f, "Update failed: {}", msg),
            UpdateError::ServerError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for UpdateError {}

/// Dynamic DNS update processor. Validates an UPDATE message against TSIG
/// and policy, then applies it to a fresh generation of the target zone's
/// contents and publishes it through the `ZoneStore`.
pub struct DynamicUpdateProcessor {
    zone_store: Arc<ZoneStore>,
    tsig_keys: HashMap<String, TsigKey>,
    update_policy: UpdatePolicy,
    notify_handler: Arc<NotifyHandler>,
    /// Secondaries to NOTIFY after a successful UPDATE, keyed by lowercased
    /// zone apex text.
    notify_targets: HashMap<String, Vec<SocketAddr>>,
}

impl DynamicUpdateProcessor {
    pub fn new(
        zone_store: Arc<ZoneStore>,
        tsig_keys: HashMap<String, TsigKey>,
        update_policy: UpdatePolicy,
        notify_handler: Arc<NotifyHandler>,
        notify_targets: HashMap<String, Vec<SocketAddr>>,
    ) -> Self {
        Self {
            zone_store,
            tsig_keys,
            update_policy,
            notify_handler,
            notify_targets,
        }
    }

    /// Process a DNS UPDATE message
    pub async fn process_update(&self, packet: &DNSPacket) -> Result<DNSPacket, UpdateError> {
        if packet.header.opcode != 5 {
            return Err(UpdateError::ServerError(
                "Not an UPDATE message".to_string(),
            ));
        }

        info!("Processing DNS UPDATE for id={}", packet.header.id);

        let zone_name = if packet.questions.is_empty() {
            return Err(UpdateError::ServerError(
                "No zone specified in UPDATE".to_string(),
            ));
        } else {
            packet.questions[0].labels.join(".")
        };

        let apex = Name::parse(&format!("{}.", zone_name));
        let handle = self.zone_store.get(&apex).ok_or_else(|| {
            warn!("UPDATE for non-authoritative zone: {}", zone_name);
            UpdateError::NotAuth(format!("Not authoritative for zone {}", zone_name))
        })?;

        let authenticated_key = match self.extract_tsig(packet) {
            Some(tsig_rr) => {
                let key_name = tsig_rr.labels.join(".");
                let record = TsigRecord::parse(&key_name, &tsig_rr.rdata)
                    .map_err(|e| UpdateError::NotVerified(e.to_string()))?;
                let key = self
                    .tsig_keys
                    .get(&record.key_name)
                    .ok_or_else(|| UpdateError::NotVerified("unknown TSIG key".to_string()))?;

                let mut stripped = packet.clone();
                stripped.additionals.retain(|rr| rr.rtype != DNSResourceType::TSIG);
                let message_minus_tsig = stripped
                    .to_bytes()
                    .map_err(|e| UpdateError::ServerError(format!("{e:?}")))?;
                let variables = tsig_variables(&record);

                let mut ctx = TsigContext::new(key.clone());
                ctx.verify(&message_minus_tsig, &variables, &record, unix_now())
                    .map_err(|e| UpdateError::NotVerified(e.to_string()))?;

                info!("TSIG verification successful for key: {}", record.key_name);
                Some(record.key_name)
            }
            None => {
                debug!("No TSIG present in UPDATE message");
                None
            }
        };

        if !self
            .update_policy
            .is_allowed(&zone_name, &authenticated_key, packet)
        {
            warn!("UPDATE denied by policy for zone: {}", zone_name);
            return Err(UpdateError::Refused(
                "Update not allowed by policy".to_string(),
            ));
        }

        let prerequisites = self.parse_prerequisites(&packet.answers)?;
        let updates = self.parse_updates(&packet.authorities)?;

        let current = handle.current();
        for prereq in &prerequisites {
            if !operations::check_prerequisite(&current, prereq)
                .map_err(|e| UpdateError::ServerError(e.to_string()))?
            {
                info!("Prerequisite check failed: {:?}", prereq);
                return Err(UpdateError::PrereqFailed(
                    "Prerequisite not satisfied".to_string(),
                ));
            }
        }

        let mut next = current.shallow_copy();
        for update in &updates {
            operations::apply_update(&mut next, update)?;
        }
        next.adjust()
            .map_err(|e| UpdateError::UpdateFailed(e.to_string()))?;
        let new_serial = next
            .bump_soa_serial()
            .map_err(|e| UpdateError::UpdateFailed(e.to_string()))?;

        self.zone_store
            .publish(&apex, next)
            .map_err(|e| UpdateError::ServerError(e.to_string()))?;

        info!(
            "UPDATE successful for zone: {} (new serial: {})",
            zone_name, new_serial
        );

        if let Some(targets) = self.notify_targets.get(&zone_name.to_lowercase())
            && !targets.is_empty()
        {
            let handler = self.notify_handler.clone();
            let apex = apex.clone();
            let targets = targets.clone();
            tokio::spawn(async move {
                notify_secondaries(&handler, &apex, &targets).await;
            });
        }

        Ok(self.create_update_response(packet, ResponseCode::NoError))
    }

    /// Extract TSIG record from additional section
    fn extract_tsig(&self, packet: &DNSPacket) -> Option<DNSResource> {
        packet
            .additionals
            .iter()
            .find(|rr| rr.rtype == DNSResourceType::TSIG)
            .cloned()
    }

    /// Parse prerequisite records from answer section
    fn parse_prerequisites(
        &self,
        answers: &[DNSResource],
    ) -> Result<Vec<PrerequisiteCheck>, UpdateError> {
        let mut prerequisites = Vec::new();

        for rr in answers {
            let prereq = match (rr.rclass, rr.ttl, rr.rtype) {
                (DNSResourceClass::ANY, 0, rtype) if rtype != DNSResourceType::ANY => {
                    PrerequisiteCheck::RRsetExists {
                        name: rr.labels.join("."),
                        rtype,
                    }
                }
                (DNSResourceClass::IN, 0, rtype) => PrerequisiteCheck::RRsetExistsValue {
                    name: rr.labels.join("."),
                    rtype,
                    rdata: rr.rdata.clone(),
                },
                (DNSResourceClass::ANY, 0, DNSResourceType::ANY) => {
                    PrerequisiteCheck::NameExists(rr.labels.join("."))
                }
                (DNSResourceClass::NONE, 0, rtype) if rtype != DNSResourceType::ANY => {
                    PrerequisiteCheck::RRsetNotExists {
                        name: rr.labels.join("."),
                        rtype,
                    }
                }
                (DNSResourceClass::NONE, 0, DNSResourceType::ANY) => {
                    PrerequisiteCheck::NameNotExists(rr.labels.join("."))
                }
                _ => {
                    return Err(UpdateError::ServerError(
                        "Invalid prerequisite format".to_string(),
                    ));
                }
            };
            prerequisites.push(prereq);
        }

        Ok(prerequisites)
    }

    /// Parse update operations from authority section
    fn parse_updates(
        &self,
        authorities: &[DNSResource],
    ) -> Result<Vec<UpdateOperation>, UpdateError> {
        let mut updates = Vec::new();

        for rr in authorities {
            let update = match (rr.rclass, rr.rtype) {
                (DNSResourceClass::IN, rtype) => UpdateOperation::Add {
                    name: rr.labels.join("."),
                    ttl: rr.ttl,
                    rtype,
                    rdata: rr.rdata.clone(),
                },
                (DNSResourceClass::ANY, rtype) if rtype != DNSResourceType::ANY => {
                    UpdateOperation::DeleteRRset {
                        name: rr.labels.join("."),
                        rtype,
                    }
                }
                (DNSResourceClass::ANY, DNSResourceType::ANY) => {
                    UpdateOperation::DeleteName(rr.labels.join("."))
                }
                (DNSResourceClass::NONE, rtype) => UpdateOperation::DeleteRR {
                    name: rr.labels.join("."),
                    rtype,
                    rdata: rr.rdata.clone(),
                },
                _ => {
                    return Err(UpdateError::ServerError(
                        "Invalid update format".to_string(),
                    ));
                }
            };
            updates.push(update);
        }

        Ok(updates)
    }

    /// Create UPDATE response packet
    fn create_update_response(&self, request: &DNSPacket, rcode: ResponseCode) -> DNSPacket {
        let mut response = DNSPacket {
            header: crate::dns::DNSHeader::default(),
            ..Default::default()
        };

        response.header.id = request.header.id;
        response.header.qr = true;
        response.header.opcode = 5;
        response.header.aa = true;
        response.header.tc = false;
        response.header.rd = request.header.rd;
        response.header.ra = false;
        response.header.z = 0;
        response.header.rcode = rcode as u8;

        if !request.questions.is_empty() {
            response.questions = vec![request.questions[0].clone()];
            response.header.qdcount = 1;
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_error_display() {
        let err = UpdateError::NotAuth("example.com".to_string());
        assert_eq!(err.to_string(), "Not authoritative: example.com");

        let err = UpdateError::Refused("Policy denied".to_string());
        assert_eq!(err.to_string(), "Update refused: Policy denied");
    }
}
