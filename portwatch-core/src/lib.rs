//! Portwatch Core
//!
//! Platform-independent geospatial proximity and live position engine for
//! vessel/port dashboards. This crate contains no I/O, no async runtime and
//! no logging; the server crate wires it to a store, a clock and sockets.
//!
//! # Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`geo`] | Validated coordinates and great-circle distance |
//! | [`region`] | Ordered bounding-box rules mapping a coordinate to a region |
//! | [`proximity`] | Vessel/port pairs within a radius |
//! | [`summary`] | Paginated per-port vessel counts |
//! | [`routes`] | Static catalog of shipping lanes and anchorages |
//! | [`synth`] | Synthetic positions when no tracking data is available |
//! | [`protocol`] | JSON frames exchanged over the stream |
//! | [`client`] | Subscriber-side connection state machine |
//!
//! # Example
//!
//! ```
//! use portwatch_core::geo::Coordinate;
//! use portwatch_core::region::{classify, Region};
//!
//! let riyadh = Coordinate::new(24.7136, 46.6753).unwrap();
//! assert_eq!(classify(riyadh), Region::MiddleEast);
//! ```

pub mod client;
pub mod error;
pub mod geo;
pub mod model;
pub mod protocol;
pub mod proximity;
pub mod region;
pub mod routes;
pub mod summary;
pub mod synth;

pub use error::{ProtocolError, ValidationError};
pub use geo::{haversine_km, Coordinate, EARTH_RADIUS_KM};
pub use model::{Port, PortId, Vessel, VesselId, VesselStatus};
pub use proximity::{
    find_connections, vessels_near, NearbyVessel, ProximityConnection, SearchRadius, DEFAULT_RADIUS,
};
pub use region::{classify, Region};
