//! Portwatch Server
//!
//! Serves the proximity engine from `portwatch-core` over HTTP:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /api/v1/proximity/summary` | Paginated vessel counts per port |
//! | `GET /api/v1/ports/{id}/vessels` | One port and the vessels near it |
//! | `POST /api/v1/vessels/{id}/connect` | Set a vessel's destination, optionally berth it |
//! | `POST /api/v1/vessels/synthesize` | Synthesize positions for untracked vessels |
//! | `GET /api/v1/stream` | WebSocket proximity stream |
//!
//! The `watch` side ([`connector`]) subscribes to such a stream.

pub mod broadcast;
pub mod config;
pub mod connector;
pub mod error;
pub mod registry;
pub mod store;
pub mod web;
pub mod ws;

/// Wall-clock milliseconds since the Unix epoch, for frame timestamps
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
