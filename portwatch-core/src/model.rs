//! Vessel and Port Records
//!
//! These records are owned by an external store. The core only reads them,
//! derives `region`, and in synthesis mode overwrites a vessel's position,
//! speed, course and status.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::region::Region;

pub type VesselId = i64;
pub type PortId = i64;

/// Navigational status of a vessel
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
pub enum VesselStatus {
    #[serde(rename = "At Anchor")]
    #[strum(to_string = "At Anchor")]
    AtAnchor,
    #[serde(rename = "Moored")]
    #[strum(to_string = "Moored")]
    Moored,
    #[serde(rename = "Loading")]
    #[strum(to_string = "Loading")]
    Loading,
    #[serde(rename = "Discharging")]
    #[strum(to_string = "Discharging")]
    Discharging,
    #[serde(rename = "At Berth")]
    #[strum(to_string = "At Berth")]
    AtBerth,
    #[serde(rename = "Underway")]
    #[strum(to_string = "Underway")]
    Underway,
    #[serde(rename = "En Route")]
    #[strum(to_string = "En Route")]
    EnRoute,
    #[serde(rename = "At Sea")]
    #[strum(to_string = "At Sea")]
    AtSea,
    /// Anything the external store reports that is not in the vocabulary
    #[default]
    #[serde(rename = "Unknown", other)]
    #[strum(to_string = "Unknown")]
    Unknown,
}

impl VesselStatus {
    /// Statuses of a vessel lying at an anchorage or in port
    pub const IN_PORT: [VesselStatus; 5] = [
        VesselStatus::AtAnchor,
        VesselStatus::Moored,
        VesselStatus::Loading,
        VesselStatus::Discharging,
        VesselStatus::AtBerth,
    ];

    /// Statuses of a vessel moving along a shipping lane
    pub const UNDERWAY: [VesselStatus; 3] = [
        VesselStatus::Underway,
        VesselStatus::EnRoute,
        VesselStatus::AtSea,
    ];

    pub fn is_in_port(&self) -> bool {
        Self::IN_PORT.contains(self)
    }

    pub fn is_underway(&self) -> bool {
        Self::UNDERWAY.contains(self)
    }
}

/// A vessel as read from the external store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vessel {
    pub id: VesselId,
    pub name: String,

    #[serde(rename = "type", default)]
    pub vessel_type: String,

    /// Last known position, `None` when never reported
    #[serde(default)]
    pub position: Option<Coordinate>,

    /// Speed over ground in knots
    #[serde(default)]
    pub speed: f64,

    /// Course over ground in degrees, `[0, 360)`
    #[serde(default)]
    pub course: f64,

    #[serde(default)]
    pub status: VesselStatus,

    /// Derived from `position`, never read from input as authoritative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_id: Option<PortId>,

    /// Position comes from a live tracking feed and must not be synthesized
    #[serde(default)]
    pub live_tracked: bool,
}

impl Vessel {
    /// A vessel with no position and default motion values
    pub fn new(id: VesselId, name: &str) -> Self {
        Vessel {
            id,
            name: name.to_string(),
            vessel_type: String::new(),
            position: None,
            speed: 0.0,
            course: 0.0,
            status: VesselStatus::Unknown,
            region: None,
            destination_port_id: None,
            live_tracked: false,
        }
    }

    pub fn at(mut self, position: Coordinate) -> Self {
        self.position = Some(position);
        self
    }
}

/// A port as read from the external store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub position: Coordinate,
    #[serde(default)]
    pub country: String,
    #[serde(rename = "type", default)]
    pub port_type: String,
}

impl Port {
    pub fn new(id: PortId, name: &str, position: Coordinate) -> Self {
        Port {
            id,
            name: name.to_string(),
            position,
            country: String::new(),
            port_type: String::new(),
        }
    }
}
