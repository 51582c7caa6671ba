use async_trait::async_trait;

use crate::error::Result;
use crate::name::Name;

/// One change between two SOA serials, as replayed by IXFR: the set of RRs
/// removed and the set of RRs added to go from `from_serial` to `to_serial`.
/// Rdata is carried pre-encoded (owner + type + class + ttl + rdata, wire
/// form) since the storage collaborator does not need to interpret it.
#[derive(Clone, Debug)]
pub struct Changeset {
    pub from_serial: u32,
    pub to_serial: u32,
    pub removed: Vec<Vec<u8>>,
    pub added: Vec<Vec<u8>>,
}

/// Seam between the zone core and durable storage (on-disk zone files, a
/// journal of changesets, etc). Persistent storage *format* is explicitly
/// out of scope (spec Non-goal); this trait only fixes the shape a real
/// backend would have to implement, with an in-memory double for tests —
/// same trait-at-the-seam-plus-fake pattern as the teacher's cache backend.
#[async_trait]
pub trait ZoneStorage: Send + Sync {
    async fn load_changesets(&self, apex: &Name, since_serial: u32) -> Result<Vec<Changeset>>;
    async fn store_changeset(&self, apex: &Name, changeset: Changeset) -> Result<()>;
    async fn latest_serial(&self, apex: &Name) -> Result<Option<u32>>;
}

/// Test double: changesets live only in process memory, discarded on drop.
#[derive(Default)]
pub struct MemoryZoneStorage {
    changesets: parking_lot::Mutex<std::collections::HashMap<String, Vec<Changeset>>>,
}

impl MemoryZoneStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ZoneStorage for MemoryZoneStorage {
    async fn load_changesets(&self, apex: &Name, since_serial: u32) -> Result<Vec<Changeset>> {
        let key = apex.to_text();
        let guard = self.changesets.lock();
        Ok(guard
            .get(&key)
            .map(|list| {
                list.iter()
                    .filter(|c| c.from_serial >= since_serial)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn store_changeset(&self, apex: &Name, changeset: Changeset) -> Result<()> {
        let key = apex.to_text();
        let mut guard = self.changesets.lock();
        guard.entry(key).or_default().push(changeset);
        Ok(())
    }

    async fn latest_serial(&self, apex: &Name) -> Result<Option<u32>> {
        let key = apex.to_text();
        let guard = self.changesets.lock();
        Ok(guard
            .get(&key)
            .and_then(|list| list.iter().map(|c| c.to_serial).max()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stored_changesets_are_returned_since_serial() {
        let storage = MemoryZoneStorage::new();
        let apex = Name::parse("example.com.");
        storage
            .store_changeset(
                &apex,
                Changeset {
                    from_serial: 1,
                    to_serial: 2,
                    removed: vec![],
                    added: vec![],
                },
            )
            .await
            .unwrap();
        storage
            .store_changeset(
                &apex,
                Changeset {
                    from_serial: 2,
                    to_serial: 3,
                    removed: vec![],
                    added: vec![],
                },
            )
            .await
            .unwrap();

        let sets = storage.load_changesets(&apex, 2).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].to_serial, 3);
        assert_eq!(storage.latest_serial(&apex).await.unwrap(), Some(3));
    }
}
