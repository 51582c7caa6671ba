use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::name::Name;
use crate::zone::{Changeset, ZoneStorage};

/// Replays a run of changesets on top of a zone generation to bring it from
/// `current_serial` up to the master's advertised serial, the way
/// `IXFRLoader` in the original consumes a journal. If the storage
/// collaborator can't produce a contiguous changeset chain (a gap between
/// what's stored and what's needed), the caller must fall back to AXFR —
/// this loader never patches over a gap by guessing.
pub struct IxfrLoader {
    storage: Arc<dyn ZoneStorage>,
}

impl IxfrLoader {
    pub fn new(storage: Arc<dyn ZoneStorage>) -> Self {
        IxfrLoader { storage }
    }

    /// Returns the ordered changesets needed to go from `from_serial` to the
    /// latest known serial, or `CoreError::NoIxfr` if the chain has a gap
    /// (caller should then request AXFR instead).
    pub async fn load_chain(&self, zone: &Name, from_serial: u32) -> Result<Vec<Changeset>> {
        let latest = self.storage.latest_serial(zone).await?;
        let Some(latest) = latest else {
            return Err(CoreError::NoIxfr);
        };
        if latest == from_serial {
            return Err(CoreError::UpToDate);
        }

        let changesets = self.storage.load_changesets(zone, from_serial).await?;
        if changesets.is_empty() {
            return Err(CoreError::NoIxfr);
        }

        // Verify the chain is contiguous: each changeset's `from_serial`
        // must equal the previous one's `to_serial`, starting from the
        // client's serial and ending at (or past) `latest`.
        let mut expected = from_serial;
        for cs in &changesets {
            if cs.from_serial != expected {
                return Err(CoreError::NoIxfr);
            }
            expected = cs.to_serial;
        }
        if expected < latest {
            return Err(CoreError::NoIxfr);
        }

        Ok(changesets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::MemoryZoneStorage;

    #[tokio::test]
    async fn contiguous_chain_loads_successfully() {
        let storage = Arc::new(MemoryZoneStorage::new());
        let zone = Name::parse("example.com.");
        storage
            .store_changeset(
                &zone,
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
                &zone,
                Changeset {
                    from_serial: 2,
                    to_serial: 3,
                    removed: vec![],
                    added: vec![],
                },
            )
            .await
            .unwrap();

        let loader = IxfrLoader::new(storage);
        let chain = loader.load_chain(&zone, 1).await.unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[tokio::test]
    async fn gap_in_chain_falls_back_to_axfr() {
        let storage = Arc::new(MemoryZoneStorage::new());
        let zone = Name::parse("example.com.");
        storage
            .store_changeset(
                &zone,
                Changeset {
                    from_serial: 5,
                    to_serial: 6,
                    removed: vec![],
                    added: vec![],
                },
            )
            .await
            .unwrap();

        let loader = IxfrLoader::new(storage);
        let err = loader.load_chain(&zone, 1).await.unwrap_err();
        assert!(matches!(err, CoreError::NoIxfr));
    }

    #[tokio::test]
    async fn already_current_serial_reports_up_to_date() {
        let storage = Arc::new(MemoryZoneStorage::new());
        let zone = Name::parse("example.com.");
        storage
            .store_changeset(
                &zone,
                Changeset {
                    from_serial: 1,
                    to_serial: 2,
                    removed: vec![],
                    added: vec![],
                },
            )
            .await
            .unwrap();

        let loader = IxfrLoader::new(storage);
        let err = loader.load_chain(&zone, 2).await.unwrap_err();
        assert!(matches!(err, CoreError::UpToDate));
    }
}
