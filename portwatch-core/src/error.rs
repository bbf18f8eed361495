//! Error types shared by the core modules.

use thiserror::Error;

/// Input rejected before any computation takes place.
///
/// Inputs are never clamped or coerced; every validating constructor in this
/// crate returns one of these instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid coordinate ({lat}, {lng}): latitude must be in [-90, 90] and longitude in [-180, 180]")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("Invalid radius {0}: must be a finite number of kilometers greater than 0")]
    InvalidRadius(f64),

    #[error("Invalid distance '{0}': must be a number of kilometers")]
    InvalidDistance(String),

    #[error("Invalid page '{0}': must be an integer of at least 1")]
    InvalidPage(String),

    #[error("Invalid limit '{value}': must be an integer between 1 and {max}")]
    InvalidLimit { value: String, max: u32 },

    #[error("Invalid sortBy '{0}': expected 'name' or 'vesselCount'")]
    InvalidSortKey(String),

    #[error("Invalid sortOrder '{0}': expected 'asc' or 'desc'")]
    InvalidSortOrder(String),

    #[error("Unknown region '{0}'")]
    UnknownRegion(String),

    #[error("Invalid route '{0}': a shipping route needs at least two waypoints")]
    InvalidRoute(String),
}

/// A stream frame that could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
