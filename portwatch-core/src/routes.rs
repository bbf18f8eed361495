//! Shipping Lanes and Anchorages
//!
//! Static catalog used by the position synthesizer. Routes are polylines of
//! `(lat, lng)` waypoints; anchorages are disk centers around major oil ports.
//! Nothing here changes at runtime.

use crate::error::ValidationError;
use crate::geo::Coordinate;

/// Radius of an anchorage disk in degrees (about 20 km)
pub const ANCHORAGE_RADIUS_DEG: f64 = 0.18;

/// A named polyline of waypoints
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingRoute {
    pub name: String,
    waypoints: Vec<Coordinate>,
}

impl ShippingRoute {
    /// A route needs at least two waypoints to have a segment
    pub fn new(name: &str, waypoints: Vec<Coordinate>) -> Result<Self, ValidationError> {
        if waypoints.len() < 2 {
            return Err(ValidationError::InvalidRoute(name.to_string()));
        }
        Ok(ShippingRoute {
            name: name.to_string(),
            waypoints,
        })
    }

    pub fn waypoints(&self) -> &[Coordinate] {
        &self.waypoints
    }

    /// Number of consecutive waypoint pairs, always at least one
    pub fn segment_count(&self) -> usize {
        self.waypoints.len() - 1
    }

    /// Endpoints of segment `index`
    pub fn segment(&self, index: usize) -> (Coordinate, Coordinate) {
        (self.waypoints[index], self.waypoints[index + 1])
    }
}

/// A named anchorage disk
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorageArea {
    pub name: String,
    pub center: Coordinate,
}

/// Catalog of routes and anchorages. Always holds at least one of each.
#[derive(Debug, Clone)]
pub struct RouteLibrary {
    routes: Vec<ShippingRoute>,
    anchorages: Vec<AnchorageArea>,
}

type Waypoints = &'static [(f64, f64)];

const STANDARD_ROUTES: &[(&str, Waypoints)] = &[
    (
        "Persian Gulf - Singapore",
        &[
            (26.70, 50.20),
            (26.50, 56.50),
            (22.00, 62.00),
            (5.80, 80.50),
            (5.50, 95.00),
            (1.20, 103.80),
        ],
    ),
    (
        "Persian Gulf - Rotterdam via Suez",
        &[
            (26.50, 56.50),
            (22.50, 60.50),
            (12.50, 45.00),
            (12.60, 43.30),
            (20.00, 38.50),
            (27.50, 34.00),
            (29.90, 32.60),
            (31.30, 32.30),
            (34.00, 24.00),
            (37.00, 11.50),
            (36.00, -5.60),
            (43.00, -9.80),
            (48.50, -5.50),
            (51.00, 1.50),
            (51.95, 4.00),
        ],
    ),
    (
        "West Africa - US Gulf",
        &[
            (4.40, 7.10),
            (5.00, -10.00),
            (15.00, -40.00),
            (26.00, -76.50),
            (24.20, -82.00),
            (27.50, -91.00),
            (29.30, -94.70),
        ],
    ),
    (
        "West Africa - China via Cape",
        &[
            (4.40, 7.10),
            (-10.00, 3.00),
            (-35.50, 18.50),
            (-30.00, 50.00),
            (-8.00, 80.00),
            (5.50, 95.00),
            (1.20, 103.80),
            (10.00, 110.00),
            (22.00, 118.50),
            (29.90, 122.20),
        ],
    ),
    (
        "Singapore - Tokyo",
        &[
            (1.20, 103.80),
            (10.00, 110.00),
            (22.00, 118.50),
            (30.00, 125.00),
            (31.00, 131.50),
            (33.50, 136.00),
            (35.00, 139.80),
        ],
    ),
    (
        "North Sea - Baltic",
        &[
            (51.95, 4.00),
            (57.80, 8.50),
            (55.50, 12.80),
            (57.00, 19.00),
            (59.60, 23.50),
            (60.30, 28.60),
        ],
    ),
    (
        "US Gulf - US West Coast via Panama",
        &[
            (29.30, -94.70),
            (23.50, -86.00),
            (9.40, -79.90),
            (8.90, -79.50),
            (15.00, -100.00),
            (32.00, -119.00),
            (33.70, -118.30),
        ],
    ),
];

const STANDARD_ANCHORAGES: &[(&str, f64, f64)] = &[
    ("Ras Tanura", 26.64, 50.16),
    ("Fujairah", 25.17, 56.36),
    ("Jebel Ali", 25.01, 55.06),
    ("Kharg Island", 29.24, 50.31),
    ("Basrah Oil Terminal", 29.68, 48.82),
    ("Yanbu", 24.00, 38.10),
    ("Sikka", 22.43, 69.83),
    ("Singapore", 1.26, 103.84),
    ("Ningbo-Zhoushan", 29.94, 122.05),
    ("Rotterdam", 51.95, 4.05),
    ("Primorsk", 60.35, 28.65),
    ("Novorossiysk", 44.72, 37.79),
    ("Ceyhan", 36.88, 35.93),
    ("Bonny", 4.42, 7.15),
    ("Houston", 29.73, -95.02),
];

impl RouteLibrary {
    /// A library needs at least one route and one anchorage
    pub fn new(
        routes: Vec<ShippingRoute>,
        anchorages: Vec<AnchorageArea>,
    ) -> Result<Self, ValidationError> {
        if routes.is_empty() {
            return Err(ValidationError::InvalidRoute("<no routes>".to_string()));
        }
        if anchorages.is_empty() {
            return Err(ValidationError::InvalidRoute("<no anchorages>".to_string()));
        }
        Ok(RouteLibrary { routes, anchorages })
    }

    /// The built-in catalog of tanker lanes and oil-port anchorages
    pub fn standard() -> Self {
        let routes = STANDARD_ROUTES
            .iter()
            .map(|(name, points)| ShippingRoute {
                name: name.to_string(),
                waypoints: points
                    .iter()
                    .map(|&(lat, lng)| Coordinate::wrapped(lat, lng))
                    .collect(),
            })
            .collect();
        let anchorages = STANDARD_ANCHORAGES
            .iter()
            .map(|&(name, lat, lng)| AnchorageArea {
                name: name.to_string(),
                center: Coordinate::wrapped(lat, lng),
            })
            .collect();
        RouteLibrary { routes, anchorages }
    }

    pub fn routes(&self) -> &[ShippingRoute] {
        &self.routes
    }

    pub fn anchorages(&self) -> &[AnchorageArea] {
        &self.anchorages
    }
}

impl Default for RouteLibrary {
    fn default() -> Self {
        RouteLibrary::standard()
    }
}
