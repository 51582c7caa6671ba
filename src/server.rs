//! UDP/TCP front end. Decodes wire packets, routes NOTIFY/UPDATE/AXFR/IXFR
//! to the core components that own those protocols, and answers ordinary
//! queries with a minimal exact-match zone lookup — no recursion, no
//! wildcard/CNAME chasing, no DNSSEC signing. Resolver behavior belongs to a
//! different component; this one's job ends at "decode, route, encode".

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{Semaphore, broadcast};
use tracing::{debug, error, info, warn};

use crate::dns::enums::{DNSResourceClass, DNSResourceType, Opcode, ResponseCode};
use crate::dns::{DNSPacket, DNSResource};
use crate::dynamic_update::{DynamicUpdateProcessor, UpdateError};
use crate::metrics::DnsMetrics;
use crate::name::Name;
use crate::pool::BufferPool;
use crate::xfr::{NotifyHandler, transfer};
use crate::zone::{RRSet, ZoneStorage, ZoneStore};

/// Everything a connection/datagram handler needs, bundled so the accept
/// loops only have to clone one `Arc` per connection.
pub struct ServerContext {
    pub zone_store: Arc<ZoneStore>,
    pub storage: Arc<dyn ZoneStorage>,
    pub notify_handler: Arc<NotifyHandler>,
    pub update_processor: Arc<DynamicUpdateProcessor>,
    pub metrics: Arc<DnsMetrics>,
    /// Per-zone (lowercased apex text) transfer ACL, same shape as
    /// `NotifyHandler`'s allow-list: empty or missing means allow any peer.
    pub transfer_acl: HashMap<String, Vec<String>>,
}

impl ServerContext {
    pub fn new(
        zone_store: Arc<ZoneStore>,
        storage: Arc<dyn ZoneStorage>,
        notify_handler: Arc<NotifyHandler>,
        update_processor: Arc<DynamicUpdateProcessor>,
        metrics: Arc<DnsMetrics>,
        transfer_acl: HashMap<String, Vec<String>>,
    ) -> Self {
        ServerContext {
            zone_store,
            storage,
            notify_handler,
            update_processor,
            metrics,
            transfer_acl,
        }
    }

    fn transfer_allowed(&self, zone_key: &str, peer: &SocketAddr) -> bool {
        match self.transfer_acl.get(zone_key) {
            None => true,
            Some(allowed) if allowed.is_empty() => true,
            Some(allowed) => {
                let ip = peer.ip().to_string();
                allowed.iter().any(|a| a == &ip || a == "*")
            }
        }
    }
}

/// Runs the UDP listener until `shutdown_rx` fires. Each datagram is handled
/// on its own spawned task, bounded by `query_semaphore`.
pub async fn run_udp_server(
    bind_addr: SocketAddr,
    ctx: Arc<ServerContext>,
    query_semaphore: Arc<Semaphore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sock = Arc::new(UdpSocket::bind(bind_addr).await?);
    info!(addr = %bind_addr, "UDP DNS server listening");

    let buffer_pool = Arc::new(BufferPool::new(crate::constants::EDNS_UDP_SIZE as usize, 128));

    loop {
        let mut buf = buffer_pool.get();
        buf.resize(crate::constants::EDNS_UDP_SIZE as usize, 0);

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("UDP server shutting down");
                break;
            }
            result = sock.recv_from(&mut buf) => {
                let (n, peer) = result?;

                let permit = match query_semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(%peer, "max concurrent queries reached, dropping UDP query");
                        continue;
                    }
                };

                let ctx = ctx.clone();
                let sock = sock.clone();
                let query = buf[..n].to_vec();
                tokio::spawn(async move {
                    let _permit = permit;
                    let responses = handle_message(&ctx, &query, peer, "udp").await;
                    if let Some(response) = responses.first() {
                        match response.to_bytes() {
                            Ok(bytes) => {
                                if let Err(e) = sock.send_to(&bytes, peer).await {
                                    error!(%peer, error = %e, "failed to send UDP response");
                                }
                            }
                            Err(e) => error!(%peer, error = %e, "failed to encode UDP response"),
                        }
                    }
                });
            }
        }
    }

    Ok(())
}

/// Runs the TCP listener until `shutdown_rx` fires. Each accepted connection
/// is handled on its own spawned task, bounded by `query_semaphore`.
pub async fn run_tcp_server(
    bind_addr: SocketAddr,
    ctx: Arc<ServerContext>,
    query_semaphore: Arc<Semaphore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "TCP DNS server listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("TCP server shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = result?;
                let ctx = ctx.clone();
                let permit = match query_semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(%peer, "max concurrent queries reached, dropping TCP connection");
                        continue;
                    }
                };

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_tcp_connection(stream, peer, ctx).await {
                        warn!(%peer, error = %e, "TCP connection error");
                    }
                });
            }
        }
    }

    Ok(())
}

async fn handle_tcp_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut length_buf = [0u8; 2];

    loop {
        match stream.read_exact(&mut length_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(%peer, "TCP connection closed by peer");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let message_len = u16::from_be_bytes(length_buf) as usize;
        let mut message = vec![0u8; message_len];
        stream.read_exact(&mut message).await?;

        let responses = handle_message(&ctx, &message, peer, "tcp").await;
        for response in &responses {
            let bytes = response.to_bytes()?;
            stream.write_all(&(bytes.len() as u16).to_be_bytes()).await?;
            stream.write_all(&bytes).await?;
        }
        stream.flush().await?;
    }

    Ok(())
}

/// Decodes one message and routes it to its protocol handler. Always
/// returns at least one packet for a well-formed request; a malformed
/// packet yields no response at all (matches the teacher's drop-on-parse-
/// failure behavior rather than guessing at a header to answer with).
async fn handle_message(
    ctx: &ServerContext,
    buf: &[u8],
    peer: SocketAddr,
    protocol: &str,
) -> Vec<DNSPacket> {
    let packet = match DNSPacket::parse(buf) {
        Ok(p) => p,
        Err(e) => {
            debug!(%peer, protocol, error = %e, "dropping malformed packet");
            ctx.metrics.record_malformed_packet(protocol);
            return Vec::new();
        }
    };

    if packet.header.qr {
        debug!(%peer, "dropping packet that is itself a response");
        return Vec::new();
    }

    let opcode_label = opcode_label(packet.header.opcode);
    let responses = dispatch(ctx, packet, peer, protocol).await;
    let rcode_label = responses
        .first()
        .map(|r| rcode_name(r.header.rcode))
        .unwrap_or("none");
    ctx.metrics.record_query(protocol, opcode_label, rcode_label);
    responses
}

async fn dispatch(
    ctx: &ServerContext,
    packet: DNSPacket,
    peer: SocketAddr,
    protocol: &str,
) -> Vec<DNSPacket> {
    if packet.header.opcode == Opcode::Notify.to_u8() {
        let response = ctx.notify_handler.handle_notify(&packet, &peer);
        let result = if response.header.rcode == ResponseCode::NoError.to_u8() {
            "accepted"
        } else {
            "rejected"
        };
        ctx.metrics.record_notify("inbound", result);
        return vec![response];
    }

    if packet.header.opcode == Opcode::Update.to_u8() {
        return match ctx.update_processor.process_update(&packet).await {
            Ok(response) => {
                ctx.metrics.record_update("success");
                vec![response]
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "UPDATE rejected");
                ctx.metrics.record_update("failure");
                vec![update_error_response(&packet, &e)]
            }
        };
    }

    handle_query(ctx, &packet, peer, protocol).await
}

fn update_error_response(request: &DNSPacket, err: &UpdateError) -> DNSPacket {
    let rcode = match err {
        UpdateError::NotAuth(_) => ResponseCode::NotAuth,
        UpdateError::Refused(_) | UpdateError::NotVerified(_) => ResponseCode::Refused,
        UpdateError::PrereqFailed(_) => ResponseCode::NxDomain,
        UpdateError::UpdateFailed(_) | UpdateError::ServerError(_) => ResponseCode::ServFail,
    };
    let mut header = request.header.clone();
    header.qr = true;
    header.opcode = Opcode::Update.to_u8();
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

async fn handle_query(
    ctx: &ServerContext,
    packet: &DNSPacket,
    peer: SocketAddr,
    protocol: &str,
) -> Vec<DNSPacket> {
    let Some(question) = packet.questions.first() else {
        return vec![transfer::formerr_response(packet)];
    };
    let qname = Name::parse(&format!("{}.", question.labels.join(".")));

    match question.qtype {
        DNSResourceType::AXFR => handle_axfr(ctx, packet, &qname, peer, protocol).await,
        DNSResourceType::IXFR => handle_ixfr(ctx, packet, &qname, peer, protocol).await,
        qtype => vec![handle_ordinary_query(ctx, packet, &qname, qtype)],
    }
}

async fn handle_axfr(
    ctx: &ServerContext,
    packet: &DNSPacket,
    qname: &Name,
    peer: SocketAddr,
    protocol: &str,
) -> Vec<DNSPacket> {
    if protocol != "tcp" {
        debug!(zone = %qname, %peer, "refusing AXFR over UDP, client must retry over TCP");
        return vec![transfer::refused_response(packet)];
    }

    let Some(handle) = ctx.zone_store.get(qname) else {
        return vec![transfer::notauth_response(packet)];
    };

    let zone_key = qname.to_text().to_ascii_lowercase();
    if !ctx.transfer_allowed(&zone_key, &peer) {
        warn!(zone = %qname, %peer, "AXFR refused by transfer ACL");
        ctx.metrics.record_xfr_outcome("axfr_out", "refused");
        return vec![transfer::refused_response(packet)];
    }

    let contents = handle.current();
    info!(zone = %qname, %peer, "serving AXFR");
    ctx.metrics.record_xfr_outcome("axfr_out", "success");
    transfer::build_axfr_response(packet.header.id, &contents)
}

async fn handle_ixfr(
    ctx: &ServerContext,
    packet: &DNSPacket,
    qname: &Name,
    peer: SocketAddr,
    protocol: &str,
) -> Vec<DNSPacket> {
    if protocol != "tcp" {
        debug!(zone = %qname, %peer, "refusing IXFR over UDP, client must retry over TCP");
        return vec![transfer::refused_response(packet)];
    }

    let Some(handle) = ctx.zone_store.get(qname) else {
        return vec![transfer::notauth_response(packet)];
    };

    let zone_key = qname.to_text().to_ascii_lowercase();
    if !ctx.transfer_allowed(&zone_key, &peer) {
        warn!(zone = %qname, %peer, "IXFR refused by transfer ACL");
        ctx.metrics.record_xfr_outcome("ixfr_out", "refused");
        return vec![transfer::refused_response(packet)];
    }

    let Some(client_serial) = transfer::client_serial_from_request(packet) else {
        return vec![transfer::formerr_response(packet)];
    };

    let contents = handle.current();
    match ctx.storage.load_changesets(qname, client_serial).await {
        Ok(changesets) if !changesets.is_empty() => {
            match transfer::build_ixfr_response(packet.header.id, &contents, &changesets) {
                Ok(messages) => {
                    info!(zone = %qname, %peer, from = client_serial, "serving IXFR");
                    ctx.metrics.record_xfr_outcome("ixfr_out", "success");
                    messages
                }
                Err(e) => {
                    error!(zone = %qname, error = %e, "failed to build IXFR response");
                    ctx.metrics.record_xfr_outcome("ixfr_out", "error");
                    vec![transfer::servfail_response(packet)]
                }
            }
        }
        Ok(_) => {
            debug!(zone = %qname, from = client_serial, "no journal history for serial, falling back to AXFR");
            ctx.metrics.record_xfr_outcome("ixfr_out", "axfr_fallback");
            transfer::build_axfr_response(packet.header.id, &contents)
        }
        Err(e) => {
            error!(zone = %qname, error = %e, "failed to load changesets");
            ctx.metrics.record_xfr_outcome("ixfr_out", "error");
            vec![transfer::servfail_response(packet)]
        }
    }
}

/// Minimal exact-match answer: no wildcard synthesis, no CNAME chasing, no
/// recursion. A name this core doesn't hold authority over is REFUSED, same
/// as a resolver-less authoritative server would answer it.
fn handle_ordinary_query(
    ctx: &ServerContext,
    packet: &DNSPacket,
    qname: &Name,
    qtype: DNSResourceType,
) -> DNSPacket {
    let Some(handle) = ctx.zone_store.find_authoritative(qname) else {
        return transfer::refused_response(packet);
    };
    let contents = handle.current();

    let mut header = packet.header.clone();
    header.qr = true;
    header.aa = true;
    header.opcode = Opcode::Query.to_u8();
    header.nscount = 0;
    header.arcount = 0;

    let Some(node_id) = contents.get_node(qname) else {
        header.rcode = ResponseCode::NxDomain.to_u8();
        header.ancount = 0;
        return DNSPacket {
            header,
            questions: packet.questions.clone(),
            ..Default::default()
        };
    };

    let node = contents.node(node_id);
    let answers: Vec<DNSResource> = if qtype == DNSResourceType::ANY {
        node.rrsets.iter().flat_map(|rrset| rrset_to_resources(qname, rrset)).collect()
    } else {
        node.find_rrset(qtype)
            .map(|rrset| rrset_to_resources(qname, rrset))
            .unwrap_or_default()
    };

    header.rcode = ResponseCode::NoError.to_u8();
    header.ancount = answers.len() as u16;
    DNSPacket {
        header,
        questions: packet.questions.clone(),
        answers,
        ..Default::default()
    }
}

fn rrset_to_resources(owner: &Name, rrset: &RRSet) -> Vec<DNSResource> {
    rrset
        .rdata
        .iter()
        .map(|r| DNSResource {
            labels: owner.labels(),
            rtype: rrset.rtype,
            rclass: DNSResourceClass::IN,
            ttl: rrset.ttl,
            rdata: r.raw.clone(),
        })
        .collect()
}

fn opcode_label(opcode: u8) -> &'static str {
    if opcode == Opcode::Query.to_u8() {
        "query"
    } else if opcode == Opcode::Notify.to_u8() {
        "notify"
    } else if opcode == Opcode::Update.to_u8() {
        "update"
    } else {
        "other"
    }
}

fn rcode_name(rcode: u8) -> &'static str {
    match ResponseCode::from_u8(rcode) {
        ResponseCode::NoError => "noerror",
        ResponseCode::FormErr => "formerr",
        ResponseCode::ServFail => "servfail",
        ResponseCode::NxDomain => "nxdomain",
        ResponseCode::NotImp => "notimp",
        ResponseCode::Refused => "refused",
        ResponseCode::NotAuth => "notauth",
        ResponseCode::NotZone => "notzone",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DNSHeader, DNSQuestion};
    use crate::dynamic_update::UpdatePolicy;
    use crate::zone::MemoryZoneStorage;

    fn test_context() -> (Arc<ServerContext>, Name) {
        let apex = Name::parse("example.com.");
        let zone_store = Arc::new(ZoneStore::new());
        let handle = zone_store.create_zone(&apex);
        let mut contents = handle.current().shallow_copy();
        contents
            .add_rrset(
                &apex,
                RRSet {
                    rtype: DNSResourceType::SOA,
                    ttl: 3600,
                    rdata: vec![crate::zone::RdataRecord::opaque(vec![0u8; 22])],
                },
                crate::zone::DupPolicy::Merge,
            )
            .unwrap();
        contents.adjust().unwrap();
        zone_store.publish(&apex, contents).unwrap();

        let notify_handler = Arc::new(NotifyHandler::new(zone_store.clone(), vec![]));
        let update_processor = Arc::new(DynamicUpdateProcessor::new(
            zone_store.clone(),
            HashMap::new(),
            UpdatePolicy::default(),
        ));
        let storage: Arc<dyn ZoneStorage> = Arc::new(MemoryZoneStorage::new());
        let metrics = Arc::new(DnsMetrics::new().unwrap());
        let ctx = Arc::new(ServerContext::new(
            zone_store,
            storage,
            notify_handler,
            update_processor,
            metrics,
            HashMap::new(),
        ));
        (ctx, apex)
    }

    #[tokio::test]
    async fn axfr_over_udp_is_refused() {
        let (ctx, apex) = test_context();
        let request = DNSPacket {
            header: DNSHeader::default(),
            questions: vec![DNSQuestion {
                labels: apex.labels(),
                qtype: DNSResourceType::AXFR,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        };
        let responses = handle_query(&ctx, &request, "127.0.0.1:9999".parse().unwrap(), "udp").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].header.rcode, ResponseCode::Refused.to_u8());
    }

    #[tokio::test]
    async fn axfr_over_tcp_serves_soa() {
        let (ctx, apex) = test_context();
        let request = DNSPacket {
            header: DNSHeader::default(),
            questions: vec![DNSQuestion {
                labels: apex.labels(),
                qtype: DNSResourceType::AXFR,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        };
        let responses = handle_query(&ctx, &request, "127.0.0.1:9999".parse().unwrap(), "tcp").await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0].answers.len() >= 2);
    }

    #[tokio::test]
    async fn unknown_zone_query_is_refused() {
        let (ctx, _apex) = test_context();
        let request = DNSPacket {
            header: DNSHeader {
                rd: true,
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels: vec!["other".into(), "org".into()],
                qtype: DNSResourceType::A,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        };
        let responses = handle_query(&ctx, &request, "127.0.0.1:9999".parse().unwrap(), "udp").await;
        assert_eq!(responses[0].header.rcode, ResponseCode::Refused.to_u8());
    }

    #[tokio::test]
    async fn known_zone_missing_name_is_nxdomain() {
        let (ctx, _apex) = test_context();
        let request = DNSPacket {
            header: DNSHeader {
                rd: true,
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels: vec!["nope".into(), "example".into(), "com".into()],
                qtype: DNSResourceType::A,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        };
        let responses = handle_query(&ctx, &request, "127.0.0.1:9999".parse().unwrap(), "udp").await;
        assert_eq!(responses[0].header.rcode, ResponseCode::NxDomain.to_u8());
    }
}
