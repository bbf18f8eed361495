//! Coordinates and Great-Circle Distance
//!
//! All distances in this crate are haversine distances on a sphere of radius
//! [`EARTH_RADIUS_KM`]. There is deliberately no planar shortcut: the fleet
//! spans the whole globe and a degree of longitude shrinks towards the poles.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius used for every distance computation
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude on the [`EARTH_RADIUS_KM`] sphere
pub const KM_PER_DEGREE_LATITUDE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// A validated WGS84 position.
///
/// Latitude is in `[-90, 90]`, longitude in `[-180, 180]`, both inclusive.
/// Out-of-range input is rejected by [`Coordinate::new`] and by
/// deserialization; it is never clamped silently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = ValidationError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lng)
    }
}

impl Coordinate {
    /// Create a coordinate, rejecting NaN and out-of-range values
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError::InvalidCoordinate { lat, lng });
        }
        Ok(Coordinate { lat, lng })
    }

    /// Build a coordinate from a computed (not user supplied) position.
    ///
    /// Latitude is limited to the poles and longitude wrapped across the
    /// antimeridian. Only for positions this crate generates itself, such as
    /// jittered waypoints.
    pub(crate) fn wrapped(lat: f64, lng: f64) -> Self {
        let lat = lat.clamp(-90.0, 90.0);
        let mut lng = lng;
        if lng > 180.0 {
            lng -= 360.0;
        } else if lng < -180.0 {
            lng += 360.0;
        }
        Coordinate { lat, lng }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Great-circle distance to another coordinate in kilometers
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(self, other)
    }
}

/// Haversine distance between two coordinates in kilometers.
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}
