//! End-to-end coverage for the two transfer scenarios that cross the
//! zone-core / XFR-task boundary: a completed AXFR_IN publishing a new zone
//! generation without disturbing a reader that is still on the old one, and
//! an IXFR_IN that falls back to AXFR_IN after the peer refuses.

use std::net::SocketAddr;
use std::time::Duration;

use knotcore::dns::enums::DNSResourceType;
use knotcore::name::Name;
use knotcore::xfr::{XfrKind, XfrOutcome, XfrState, XfrTask};
use knotcore::zone::{Changeset, DupPolicy, MemoryZoneStorage, RRSet, RdataRecord, ZoneStorage, ZoneStore};

fn peer() -> SocketAddr {
    "127.0.0.1:53".parse().unwrap()
}

fn soa_rrset(serial: u32) -> RRSet {
    let mut rdata = vec![0u8; 22];
    rdata[2..6].copy_from_slice(&serial.to_be_bytes());
    let mut r = RRSet::new(DNSResourceType::SOA, 3600);
    r.push(RdataRecord::opaque(rdata));
    r
}

/// S3: an AXFR_IN worker builds a whole new `ZoneContents` off to the side
/// (SOA, then records, then the closing SOA) and publishes it through
/// `ZoneStore::publish`. A reader that grabbed `current()` before the
/// publish keeps seeing the pre-transfer serial; a reader that asks after
/// the publish sees the new one.
#[test]
fn axfr_in_publish_does_not_disturb_a_reader_holding_the_old_generation() {
    let apex = Name::parse("example.com.");
    let store = ZoneStore::new();
    let handle = store.create_zone(&apex);

    let mut initial = handle.current().shallow_copy();
    initial.add_rrset(&apex, soa_rrset(1), DupPolicy::Merge).unwrap();
    initial.adjust().unwrap();
    store.publish(&apex, initial).unwrap();

    // Reader starts before the incoming transfer is applied.
    let stale_reader = handle.current();
    assert_eq!(stale_reader.soa_serial(), Some(1));

    // Worker-side: simulate the AXFR_IN stream (SOA, one A record, SOA)
    // landing and being folded into a fresh generation.
    let mut incoming = handle.current().shallow_copy();
    incoming.add_rrset(&apex, soa_rrset(2), DupPolicy::Merge).unwrap();
    incoming
        .add_rrset(
            &Name::parse("www.example.com."),
            {
                let mut r = RRSet::new(DNSResourceType::A, 300);
                r.push(RdataRecord::opaque(vec![192, 0, 2, 10]));
                r
            },
            DupPolicy::Merge,
        )
        .unwrap();
    incoming.adjust().unwrap();
    let new_generation = store.publish(&apex, incoming).unwrap();

    assert_eq!(new_generation, 2);
    // The reader that started before the swap is unaffected.
    assert_eq!(stale_reader.soa_serial(), Some(1));
    assert_eq!(stale_reader.node_count(), 1);

    // A fresh read sees the transferred zone.
    let fresh_reader = handle.current();
    assert_eq!(fresh_reader.soa_serial(), Some(2));
    assert!(
        fresh_reader
            .get_node(&Name::parse("www.example.com."))
            .is_some()
    );
}

/// S4: an IXFR_IN task whose peer answers with a transfer refusal falls
/// back to AXFR_IN on the next attempt instead of failing outright, and the
/// retry carries the same zone/peer/id lineage.
#[test]
fn ixfr_in_falls_back_to_axfr_in_after_transfer_refused() {
    let zone = Name::parse("example.com.");
    let mut task = XfrTask::new(7, XfrKind::IxfrIn, zone.clone(), peer(), Duration::from_secs(60));

    task.advance(XfrState::Connecting);
    task.advance(XfrState::Running);
    task.request_axfr_fallback(XfrOutcome::TransferRefused);

    assert!(task.is_terminal());
    assert_eq!(task.state, XfrState::Failed);
    assert!(task.fallback_to_axfr);

    let retry = task.next_attempt(zone.clone(), peer(), Duration::from_secs(60));
    assert_eq!(retry.kind, XfrKind::AxfrIn);
    assert_eq!(retry.id, 7);
    assert_eq!(retry.attempt, 1);
    assert_eq!(retry.zone.to_text(), zone.to_text());
    assert_eq!(retry.state, XfrState::Pending);
}

/// Companion coverage for the serving side of S3/S4: once a changeset
/// history exists in storage, a secondary's IXFR request for a known serial
/// gets served incrementally rather than falling back to a full AXFR.
#[tokio::test]
async fn changesets_since_known_serial_are_available_for_ixfr_serving() {
    let apex = Name::parse("example.com.");
    let storage = MemoryZoneStorage::new();

    storage
        .store_changeset(
            &apex,
            Changeset {
                from_serial: 1,
                to_serial: 2,
                removed: vec![],
                added: vec![vec![192, 0, 2, 10]],
            },
        )
        .await
        .unwrap();

    let changesets = storage.load_changesets(&apex, 1).await.unwrap();
    assert_eq!(changesets.len(), 1);
    assert_eq!(changesets[0].to_serial, 2);
    assert_eq!(storage.latest_serial(&apex).await.unwrap(), Some(2));

    // A serial the storage double has no history for yields nothing,
    // which is the server's signal to fall back to a full AXFR.
    let none = storage.load_changesets(&apex, 99).await.unwrap();
    assert!(none.is_empty());
}
