//! Proximity Stream Client
//!
//! Subscriber-side connection state machine. Like the rest of this crate it
//! performs no I/O: the driver owns the socket and the clock, tells the
//! machine what happened, and does what [`ProximityClient::poll`] asks.
//!
//! ```text
//! Disconnected --poll--> Connecting --on_connected--> Connected
//!      ^                     |                            |
//!      |                on_error                  on_closed / on_error
//!      |                     v                            |
//!      +------poll------- Error <-------------------------+
//!      +------------------ (on_closed) -------------------+
//! ```
//!
//! Every way out of `Connecting` or `Connected` schedules a reconnect after
//! a fixed delay.
//!
//! ```rust,ignore
//! let mut client = ProximityClient::new(radius, 5_000);
//! loop {
//!     match client.poll(now_ms()) {
//!         ClientAction::Connect => { /* open socket, then client.on_connected() */ }
//!         ClientAction::Wait(ms) => sleep(ms),
//!     }
//! }
//! ```

use crate::error::ProtocolError;
use crate::protocol::{ClientMessage, ServerMessage, VesselUpdate};
use crate::proximity::SearchRadius;

/// Default delay before reconnecting
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// What the driver should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAction {
    /// Open the transport, then report back with `on_connected` or `on_error`
    Connect,
    /// Nothing to do for this many milliseconds
    Wait(u64),
}

/// Subscriber-side state machine for the proximity stream
#[derive(Debug)]
pub struct ProximityClient {
    state: ClientState,
    radius: SearchRadius,
    reconnect_delay_ms: u64,
    /// Earliest time the next connect may start
    reconnect_at: Option<u64>,
    latest: Option<VesselUpdate>,
    updates_received: u64,
    connect_count: u64,
}

impl ProximityClient {
    pub fn new(radius: SearchRadius, reconnect_delay_ms: u64) -> Self {
        ProximityClient {
            state: ClientState::Disconnected,
            radius,
            reconnect_delay_ms,
            reconnect_at: None,
            latest: None,
            updates_received: 0,
            connect_count: 0,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    pub fn radius(&self) -> SearchRadius {
        self.radius
    }

    /// Most recent `vessel_update` received on any connection
    pub fn latest(&self) -> Option<&VesselUpdate> {
        self.latest.as_ref()
    }

    pub fn updates_received(&self) -> u64 {
        self.updates_received
    }

    /// Number of connections that reached `Connected`
    pub fn connect_count(&self) -> u64 {
        self.connect_count
    }

    /// Advance timers and return the next action
    pub fn poll(&mut self, now_ms: u64) -> ClientAction {
        match self.state {
            ClientState::Disconnected | ClientState::Error => {
                self.state = ClientState::Disconnected;
                match self.reconnect_at {
                    Some(at) if at > now_ms => ClientAction::Wait(at - now_ms),
                    _ => {
                        self.reconnect_at = None;
                        self.state = ClientState::Connecting;
                        ClientAction::Connect
                    }
                }
            }
            // The driver is busy with the transport
            ClientState::Connecting | ClientState::Connected => {
                ClientAction::Wait(self.reconnect_delay_ms)
            }
        }
    }

    /// The transport is open. Returns the configure and snapshot frames to send.
    pub fn on_connected(&mut self) -> Vec<ClientMessage> {
        self.state = ClientState::Connected;
        self.connect_count += 1;
        vec![self.configure_message(), ClientMessage::RequestVessels { all_vessels: true }]
    }

    /// Handle one text frame from the server
    pub fn on_message(&mut self, text: &str) -> Result<ServerMessage, ProtocolError> {
        let message = ServerMessage::from_json(text)?;
        if let ServerMessage::VesselUpdate(update) = &message {
            self.updates_received += 1;
            self.latest = Some(update.clone());
        }
        Ok(message)
    }

    /// The transport closed, by either side
    pub fn on_closed(&mut self, now_ms: u64) {
        self.state = ClientState::Disconnected;
        self.schedule_reconnect(now_ms);
    }

    /// Connecting failed, or the transport broke
    pub fn on_error(&mut self, now_ms: u64) {
        self.state = ClientState::Error;
        self.schedule_reconnect(now_ms);
    }

    /// Change the radius. Returns a configure frame when connected.
    pub fn set_radius(&mut self, radius: SearchRadius) -> Option<ClientMessage> {
        self.radius = radius;
        self.is_connected().then(|| self.configure_message())
    }

    /// Frame that stops updates without closing the connection
    pub fn disable_message(&self) -> ClientMessage {
        ClientMessage::TrackPortProximity {
            enabled: false,
            radius: None,
        }
    }

    fn configure_message(&self) -> ClientMessage {
        ClientMessage::TrackPortProximity {
            enabled: true,
            radius: Some(self.radius.km()),
        }
    }

    fn schedule_reconnect(&mut self, now_ms: u64) {
        self.reconnect_at = Some(now_ms.saturating_add(self.reconnect_delay_ms));
    }
}
