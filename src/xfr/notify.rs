use std::net::SocketAddr;
use std::sync::Arc;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::dns::enums::{DNSResourceClass, DNSResourceType, Opcode, ResponseCode};
use crate::dns::{DNSHeader, DNSPacket, DNSQuestion};
use crate::error::{CoreError, Result};
use crate::name::Name;
use crate::zone::ZoneStore;

/// RFC 1996 NOTIFY handling, both receiving (as a secondary) and sending
/// (as a primary announcing a new serial). Adapted from the teacher's flat
/// `Zone`-based handler onto `ZoneStore`/`ZoneHandle`.
pub struct NotifyHandler {
    zone_store: Arc<ZoneStore>,
    allowed_notifiers: Vec<String>,
}

impl NotifyHandler {
    pub fn new(zone_store: Arc<ZoneStore>, allowed_notifiers: Vec<String>) -> Self {
        NotifyHandler {
            zone_store,
            allowed_notifiers,
        }
    }

    pub fn is_notify_allowed(&self, client_addr: &SocketAddr) -> bool {
        if self.allowed_notifiers.is_empty() {
            return true;
        }
        let ip = client_addr.ip().to_string();
        self.allowed_notifiers
            .iter()
            .any(|allowed| allowed == &ip || allowed == "*")
    }

    /// Handles an inbound NOTIFY, returning the response packet to send
    /// back. Does not itself trigger the resulting SOA/IXFR pull — the
    /// caller enqueues an `XfrTask` for that once this returns an ack.
    pub fn handle_notify(&self, packet: &DNSPacket, client_addr: &SocketAddr) -> DNSPacket {
        if !self.is_notify_allowed(client_addr) {
            warn!(peer = %client_addr, "NOTIFY denied");
            return self.response(packet, ResponseCode::Refused);
        }
        if packet.header.opcode != Opcode::Notify.to_u8() {
            return self.response(packet, ResponseCode::FormErr);
        }
        let Some(question) = packet.questions.first() else {
            return self.response(packet, ResponseCode::FormErr);
        };
        let zone_name = Name::parse(&format!("{}.", question.labels.join(".")));

        match self.zone_store.get(&zone_name) {
            Some(handle) => {
                info!(zone = %zone_name, peer = %client_addr, "received NOTIFY");
                let _ = handle.current();
                self.response(packet, ResponseCode::NoError)
            }
            None => {
                debug!(zone = %zone_name, "NOTIFY for unknown zone");
                self.response(packet, ResponseCode::NotAuth)
            }
        }
    }

    fn response(&self, request: &DNSPacket, rcode: ResponseCode) -> DNSPacket {
        let mut header = request.header.clone();
        header.qr = true;
        header.aa = rcode == ResponseCode::NoError;
        header.rcode = rcode.to_u8();
        header.ancount = 0;
        header.nscount = 0;
        header.arcount = 0;
        DNSPacket {
            header,
            questions: request.questions.clone(),
            ..Default::default()
        }
    }

    /// Sends a NOTIFY to one secondary and waits for its ack, per RFC 1996
    /// §3.7/§3.8. Returns `Ok(())` only on a NOERROR/authoritative ack.
    pub async fn send_notify(
        &self,
        zone: &Name,
        secondary: SocketAddr,
        id: u16,
    ) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let packet = DNSPacket {
            header: DNSHeader {
                id,
                opcode: Opcode::Notify.to_u8(),
                aa: true,
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels: zone.labels(),
                qtype: DNSResourceType::SOA,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        };
        let bytes = packet.to_bytes()?;
        socket.send_to(&bytes, secondary).await?;

        let mut buf = [0u8; 512];
        let (n, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .map_err(|_| CoreError::ConnectionRefused(secondary.to_string()))??;
        let reply = DNSPacket::parse(&buf[..n])?;
        if reply.header.rcode != ResponseCode::NoError.to_u8() {
            return Err(CoreError::XfrRefused);
        }
        Ok(())
    }
}

/// Best-effort outbound NOTIFY fan-out to every configured secondary for a
/// zone that just published a new generation (RFC 1996 §3.3-3.8). Each
/// target gets up to 3 attempts with the same jittered backoff the XFR
/// worker uses between bootstrap retries; a secondary that never acks is
/// logged and otherwise left alone — the secondary's own SOA polling is the
/// fallback path, NOTIFY is only ever a latency optimization on top of it.
pub async fn notify_secondaries(handler: &NotifyHandler, zone: &Name, targets: &[SocketAddr]) {
    for &target in targets {
        let mut attempt = 0u32;
        loop {
            let id = rand::rng().random::<u16>();
            match handler.send_notify(zone, target, id).await {
                Ok(()) => {
                    info!(zone = %zone, peer = %target, "secondary acked NOTIFY");
                    break;
                }
                Err(e) if attempt < 2 => {
                    attempt += 1;
                    warn!(zone = %zone, peer = %target, error = %e, attempt, "NOTIFY not acked, retrying");
                    tokio::time::sleep(super::worker::notify_retry_delay(attempt)).await;
                }
                Err(e) => {
                    warn!(zone = %zone, peer = %target, error = %e, "NOTIFY exhausted retries");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_zone_gets_notauth_response() {
        let store = Arc::new(ZoneStore::new());
        let handler = NotifyHandler::new(store, vec![]);
        let request = DNSPacket {
            header: DNSHeader {
                opcode: Opcode::Notify.to_u8(),
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels: vec!["example".into(), "com".into()],
                qtype: DNSResourceType::SOA,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        };
        let resp = handler.handle_notify(&request, &"127.0.0.1:53".parse().unwrap());
        assert_eq!(resp.header.rcode, ResponseCode::NotAuth.to_u8());
    }

    #[test]
    fn disallowed_peer_gets_refused() {
        let store = Arc::new(ZoneStore::new());
        let handler = NotifyHandler::new(store, vec!["10.0.0.1".to_string()]);
        let request = DNSPacket {
            header: DNSHeader {
                opcode: Opcode::Notify.to_u8(),
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels: vec!["example".into(), "com".into()],
                qtype: DNSResourceType::SOA,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        };
        let resp = handler.handle_notify(&request, &"192.168.1.5:53".parse().unwrap());
        assert_eq!(resp.header.rcode, ResponseCode::Refused.to_u8());
    }
}
