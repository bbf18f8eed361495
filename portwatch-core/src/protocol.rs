//! Stream Protocol
//!
//! Textual JSON frames exchanged over the proximity stream. Every frame is an
//! object with a `type` tag.
//!
//! Client to server:
//!
//! ```json
//! { "type": "track_port_proximity", "enabled": true, "radius": 20 }
//! { "type": "request_vessels", "allVessels": true }
//! ```
//!
//! Server to client:
//!
//! ```json
//! { "type": "connection", "message": "...", "timestamp": 1700000000000 }
//! { "type": "vessel_update", "vessels": [...], "portConnections": [...], "timestamp": 1700000000000 }
//! { "type": "error", "message": "...", "timestamp": 1700000000000 }
//! ```
//!
//! Timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::model::Vessel;
use crate::proximity::ProximityConnection;

/// Frames sent by a subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Configure (or disable) proximity tracking for this connection.
    ///
    /// `radius` is in kilometers and validated by the server.
    TrackPortProximity {
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        radius: Option<f64>,
    },
    /// Ask for an immediate snapshot
    #[serde(rename_all = "camelCase")]
    RequestVessels {
        #[serde(default)]
        all_vessels: bool,
    },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<ClientMessage, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent once when the connection opens
    Connection { message: String, timestamp: u64 },
    /// Current state for this subscription
    VesselUpdate(VesselUpdate),
    /// A client frame was rejected; the previous subscription is unchanged
    Error { message: String, timestamp: u64 },
}

/// Payload of a `vessel_update` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselUpdate {
    pub vessels: Vec<Vessel>,
    pub port_connections: Vec<ProximityConnection>,
    pub timestamp: u64,
}

impl ServerMessage {
    pub fn connection(message: &str, timestamp: u64) -> Self {
        ServerMessage::Connection {
            message: message.to_string(),
            timestamp,
        }
    }

    pub fn error(message: &str, timestamp: u64) -> Self {
        ServerMessage::Error {
            message: message.to_string(),
            timestamp,
        }
    }

    pub fn vessel_update(
        vessels: Vec<Vessel>,
        port_connections: Vec<ProximityConnection>,
        timestamp: u64,
    ) -> Self {
        ServerMessage::VesselUpdate(VesselUpdate {
            vessels,
            port_connections,
            timestamp,
        })
    }

    pub fn from_json(text: &str) -> Result<ServerMessage, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
