//! Fleet store seam.
//!
//! The engine reads vessels and ports from an external store that it does
//! not own. [`FleetStore`] is the boundary; [`MemoryStore`] is the stand-in
//! used by the binary (optionally seeded from a JSON file) and by tests.
//!
//! Readers get an immutable [`FleetSnapshot`] behind an `Arc`, so one
//! proximity pass always sees vessels and ports taken at the same instant.
//! Writers build a new snapshot and swap it in.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use portwatch_core::region::assign_regions;
use portwatch_core::{Port, PortId, Vessel, VesselId};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Read-consistent view of the fleet
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    pub vessels: Vec<Vessel>,
    pub ports: Vec<Port>,
}

impl FleetSnapshot {
    pub fn vessel(&self, id: VesselId) -> Option<&Vessel> {
        self.vessels.iter().find(|v| v.id == id)
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }
}

#[async_trait]
pub trait FleetStore: Send + Sync {
    /// Current vessels and ports, taken together
    async fn snapshot(&self) -> Arc<FleetSnapshot>;

    /// Replace the stored copies of `vessels`, matched by id.
    ///
    /// Regions are rederived from positions before storing. Fails without
    /// writing anything if any id is unknown.
    async fn save_vessels(&self, vessels: Vec<Vessel>) -> Result<(), StoreError>;
}

#[derive(Deserialize)]
struct FleetFile {
    #[serde(default)]
    vessels: Vec<Vessel>,
    #[serde(default)]
    ports: Vec<Port>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    current: RwLock<Arc<FleetSnapshot>>,
}

impl MemoryStore {
    pub fn new(mut vessels: Vec<Vessel>, ports: Vec<Port>) -> Self {
        assign_regions(&mut vessels);
        MemoryStore {
            current: RwLock::new(Arc::new(FleetSnapshot { vessels, ports })),
        }
    }

    /// Load `{ "vessels": [...], "ports": [...] }` from `path`
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Io(path.to_owned(), e))?;
        let file: FleetFile =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode(path.to_owned(), e))?;

        log::info!(
            "Loaded {} vessels and {} ports from {}",
            file.vessels.len(),
            file.ports.len(),
            path.display()
        );
        Ok(MemoryStore::new(file.vessels, file.ports))
    }
}

#[async_trait]
impl FleetStore for MemoryStore {
    async fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.current.read().await.clone()
    }

    async fn save_vessels(&self, mut vessels: Vec<Vessel>) -> Result<(), StoreError> {
        assign_regions(&mut vessels);

        let mut current = self.current.write().await;
        let index: HashMap<VesselId, usize> = current
            .vessels
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id, i))
            .collect();

        let mut next = FleetSnapshot::clone(&current);
        for vessel in vessels {
            let Some(&i) = index.get(&vessel.id) else {
                return Err(StoreError::UnknownVessel(vessel.id));
            };
            next.vessels[i] = vessel;
        }
        *current = Arc::new(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use portwatch_core::{Coordinate, Region};

    use super::*;

    const FLEET: &str = r#"{
        "vessels": [
            { "id": 1, "name": "Gulf Pioneer", "type": "VLCC",
              "position": { "lat": 25.10, "lng": 56.00 }, "speed": 12.5, "course": 90,
              "status": "Underway", "region": "Oceania" },
            { "id": 2, "name": "Baltic Star", "position": null, "liveTracked": true }
        ],
        "ports": [
            { "id": 9, "name": "Fujairah", "position": { "lat": 25.1164, "lng": 56.3269 },
              "country": "UAE", "type": "oil" }
        ]
    }"#;

    #[tokio::test]
    async fn test_load_fleet_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FLEET.as_bytes()).unwrap();

        let store = MemoryStore::load(file.path()).await.unwrap();
        let snapshot = store.snapshot().await;

        assert_eq!(snapshot.vessels.len(), 2);
        assert_eq!(snapshot.ports.len(), 1);
        assert_eq!(snapshot.port(9).unwrap().port_type, "oil");

        // Region in the file is not trusted
        assert_eq!(snapshot.vessel(1).unwrap().region, Some(Region::MiddleEast));
        let baltic = snapshot.vessel(2).unwrap();
        assert!(baltic.live_tracked);
        assert_eq!(baltic.region, None);
    }

    #[tokio::test]
    async fn test_load_rejects_bad_coordinates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "ports": [ { "id": 1, "name": "Nowhere", "position": { "lat": 95, "lng": 0 } } ] }"#)
            .unwrap();

        let err = MemoryStore::load(file.path()).await.unwrap_err();
        assert!(matches!(err, StoreError::Decode(..)));

        let err = MemoryStore::load(Path::new("/nonexistent/fleet.json")).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(..)));
    }

    #[tokio::test]
    async fn test_save_swaps_snapshot() {
        let store = MemoryStore::new(vec![Vessel::new(1, "Gulf Pioneer")], vec![]);
        let before = store.snapshot().await;

        let moved = Vessel::new(1, "Gulf Pioneer").at(Coordinate::new(1.26, 103.84).unwrap());
        store.save_vessels(vec![moved]).await.unwrap();

        // Earlier readers keep their view
        assert!(before.vessel(1).unwrap().position.is_none());
        let after = store.snapshot().await;
        assert_eq!(after.vessel(1).unwrap().region, Some(Region::SoutheastAsia));
    }

    #[tokio::test]
    async fn test_save_unknown_vessel_writes_nothing() {
        let store = MemoryStore::new(vec![Vessel::new(1, "Gulf Pioneer")], vec![]);
        let mut renamed = Vessel::new(1, "Renamed");
        renamed.speed = 3.0;

        let err = store
            .save_vessels(vec![renamed, Vessel::new(42, "Ghost")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownVessel(42)));
        assert_eq!(store.snapshot().await.vessel(1).unwrap().name, "Gulf Pioneer");
    }
}
