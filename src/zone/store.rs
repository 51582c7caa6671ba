use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::name::{Name, NameInterner};

use super::contents::ZoneContents;
use super::handle::ZoneHandle;

/// Registry of zone handles keyed by lowercased apex name. Each zone gets
/// its own `NameInterner` and its own `ZoneHandle`, so a generation switch
/// in one zone never touches another — mirrors the teacher's
/// `Arc<RwLock<HashMap<String, Zone>>>` shape, generalized to hold one
/// copy-on-write `ZoneHandle` per zone instead of a single mutable `Zone`.
pub struct ZoneStore {
    zones: DashMap<String, Arc<ZoneHandle>>,
}

impl Default for ZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneStore {
    pub fn new() -> Self {
        ZoneStore {
            zones: DashMap::new(),
        }
    }

    pub fn create_zone(&self, apex: &Name) -> Arc<ZoneHandle> {
        let key = apex.to_text().to_ascii_lowercase();
        info!(zone = %key, "creating zone");
        let interner = Arc::new(NameInterner::new());
        let contents = ZoneContents::new(apex.clone(), interner);
        let handle = Arc::new(ZoneHandle::new(contents));
        self.zones.insert(key, Arc::clone(&handle));
        handle
    }

    pub fn remove_zone(&self, apex: &Name) -> Result<Arc<ZoneHandle>> {
        let key = apex.to_text().to_ascii_lowercase();
        info!(zone = %key, "removing zone");
        self.zones
            .remove(&key)
            .map(|(_, v)| v)
            .ok_or_else(|| CoreError::NoZone(key))
    }

    pub fn get(&self, apex: &Name) -> Option<Arc<ZoneHandle>> {
        let key = apex.to_text().to_ascii_lowercase();
        self.zones.get(&key).map(|r| Arc::clone(r.value()))
    }

    /// Finds the zone whose apex is the longest suffix match for `name` —
    /// the usual "most specific zone wins" authority lookup.
    pub fn find_authoritative(&self, name: &Name) -> Option<Arc<ZoneHandle>> {
        let mut best: Option<(usize, Arc<ZoneHandle>)> = None;
        for entry in self.zones.iter() {
            let handle = entry.value();
            let apex = &handle.current().apex_name;
            if name.is_subdomain_of(apex) {
                let len = apex.label_count();
                if best.as_ref().map(|(l, _)| len > *l).unwrap_or(true) {
                    best = Some((len, Arc::clone(handle)));
                }
            }
        }
        best.map(|(_, h)| h)
    }

    pub fn publish(&self, apex: &Name, next: ZoneContents) -> Result<u64> {
        let handle = self
            .get(apex)
            .ok_or_else(|| CoreError::NoZone(apex.to_text()))?;
        let gen = handle.switch_generation(next);
        debug!(zone = %apex, generation = gen, "published new zone generation");
        Ok(gen)
    }

    pub fn zone_names(&self) -> Vec<String> {
        self.zones.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Snapshot of per-zone statistics, used by the status/control surface.
#[derive(Debug, Clone)]
pub struct ZoneStats {
    pub apex: String,
    pub generation: u64,
    pub node_count: usize,
}

impl ZoneStore {
    pub fn stats(&self) -> HashMap<String, ZoneStats> {
        let mut out = HashMap::new();
        for entry in self.zones.iter() {
            let handle = entry.value();
            let contents = handle.current();
            out.insert(
                entry.key().clone(),
                ZoneStats {
                    apex: contents.apex_name.to_text(),
                    generation: handle.generation(),
                    node_count: contents.node_count(),
                },
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_authoritative_prefers_most_specific_zone() {
        let store = ZoneStore::new();
        store.create_zone(&Name::parse("example.com."));
        store.create_zone(&Name::parse("sub.example.com."));

        let handle = store
            .find_authoritative(&Name::parse("host.sub.example.com."))
            .unwrap();
        assert_eq!(handle.current().apex_name.to_text(), "sub.example.com.");
    }

    #[test]
    fn remove_zone_then_get_returns_none() {
        let store = ZoneStore::new();
        store.create_zone(&Name::parse("example.com."));
        store.remove_zone(&Name::parse("example.com.")).unwrap();
        assert!(store.get(&Name::parse("example.com.")).is_none());
    }
}
