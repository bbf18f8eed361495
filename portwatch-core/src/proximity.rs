//! Vessel/Port Proximity
//!
//! Finds every (vessel, port) pair whose great-circle distance is within a
//! radius. The scan is a plain O(V x P) loop: fleets and port lists are in
//! the low thousands and the scan runs on a timer, not per request.
//!
//! A spatial index (a lat/lng grid or an R-tree over port positions) would
//! replace the inner port loop of [`find_connections`] and [`vessels_near`]
//! for larger fleets. The signatures and the output ordering stay the same.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geo::{haversine_km, Coordinate};
use crate::model::{Port, PortId, Vessel, VesselId};

/// Radius used when a caller does not name one
pub const DEFAULT_RADIUS: SearchRadius = SearchRadius(20.0);

/// A validated search radius in kilometers
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SearchRadius(f64);

impl SearchRadius {
    /// Radius must be finite and strictly positive
    pub fn new(km: f64) -> Result<Self, ValidationError> {
        if km.is_finite() && km > 0.0 {
            Ok(SearchRadius(km))
        } else {
            Err(ValidationError::InvalidRadius(km))
        }
    }

    /// Parse a radius from a query parameter or command-line value
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let km = s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::InvalidDistance(s.to_string()))?;
        SearchRadius::new(km)
    }

    pub fn km(&self) -> f64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for SearchRadius {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let km = f64::deserialize(deserializer)?;
        SearchRadius::new(km).map_err(serde::de::Error::custom)
    }
}

/// One vessel within radius of one port, valid for a single computation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityConnection {
    pub vessel_id: VesselId,
    pub port_id: PortId,
    pub distance_km: f64,
    pub vessel_position: Coordinate,
    pub port_position: Coordinate,
}

/// Find all vessel/port pairs within `radius`.
///
/// Vessels without a position are skipped. The result is grouped by vessel
/// id; within one vessel, connections are sorted by ascending distance with
/// ties broken by ascending port id.
pub fn find_connections(
    vessels: &[Vessel],
    ports: &[Port],
    radius: SearchRadius,
) -> Vec<ProximityConnection> {
    let mut connections = Vec::new();

    for vessel in vessels {
        let Some(vessel_position) = vessel.position else {
            continue;
        };
        for port in ports {
            let distance_km = haversine_km(&vessel_position, &port.position);
            if distance_km <= radius.km() {
                connections.push(ProximityConnection {
                    vessel_id: vessel.id,
                    port_id: port.id,
                    distance_km,
                    vessel_position,
                    port_position: port.position,
                });
            }
        }
    }

    connections.sort_by(|a, b| {
        a.vessel_id
            .cmp(&b.vessel_id)
            .then_with(|| cmp_distance(a.distance_km, b.distance_km))
            .then_with(|| a.port_id.cmp(&b.port_id))
    });
    connections
}

/// A vessel near one port
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyVessel {
    #[serde(flatten)]
    pub vessel: Vessel,
    pub distance_km: f64,
}

/// All positioned vessels within `radius` of `port`, nearest first.
///
/// Ties are broken by ascending vessel id.
pub fn vessels_near(port: &Port, vessels: &[Vessel], radius: SearchRadius) -> Vec<NearbyVessel> {
    let mut nearby: Vec<NearbyVessel> = vessels
        .iter()
        .filter_map(|vessel| {
            let distance_km = haversine_km(&vessel.position?, &port.position);
            (distance_km <= radius.km()).then(|| NearbyVessel {
                vessel: vessel.clone(),
                distance_km,
            })
        })
        .collect();

    nearby.sort_by(|a, b| {
        cmp_distance(a.distance_km, b.distance_km).then_with(|| a.vessel.id.cmp(&b.vessel.id))
    });
    nearby
}

// Distances come from valid coordinates and are never NaN
fn cmp_distance(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    fn radius(km: f64) -> SearchRadius {
        SearchRadius::new(km).unwrap()
    }

    #[test]
    fn test_radius_validation() {
        assert!(SearchRadius::new(0.0).is_err());
        assert!(SearchRadius::new(-5.0).is_err());
        assert!(SearchRadius::new(f64::NAN).is_err());
        assert!(SearchRadius::new(f64::INFINITY).is_err());
        assert_eq!(SearchRadius::new(15.0).unwrap().km(), 15.0);
        assert!(serde_json::from_str::<SearchRadius>("-1").is_err());
    }

    #[test]
    fn test_radius_parse() {
        assert_eq!(SearchRadius::parse(" 40 ").unwrap().km(), 40.0);
        assert_eq!(
            SearchRadius::parse("far"),
            Err(ValidationError::InvalidDistance("far".to_string()))
        );
        assert_eq!(SearchRadius::parse("0"), Err(ValidationError::InvalidRadius(0.0)));
    }

    #[test]
    fn test_threshold_at_fujairah() {
        let vessels = vec![Vessel::new(1, "Gulf Pioneer").at(c(25.10, 56.00))];
        let ports = vec![Port::new(9, "Fujairah", c(25.1164, 56.3269))];

        assert!(find_connections(&vessels, &ports, radius(20.0)).is_empty());

        let found = find_connections(&vessels, &ports, radius(40.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].vessel_id, 1);
        assert_eq!(found[0].port_id, 9);
        assert!(found[0].distance_km > 20.0 && found[0].distance_km < 40.0);
        assert_eq!(found[0].port_position, ports[0].position);
    }

    #[test]
    fn test_equal_distance_tie_breaks_on_port_id() {
        // Mirror images across the meridian are exactly equidistant
        let vessels = vec![Vessel::new(1, "Tie").at(c(0.0, 0.0))];
        let ports = vec![
            Port::new(7, "East", c(0.0, 0.045)),
            Port::new(3, "West", c(0.0, -0.045)),
        ];

        let found = find_connections(&vessels, &ports, radius(10.0));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].distance_km, found[1].distance_km);
        assert_eq!(found[0].port_id, 3);
        assert_eq!(found[1].port_id, 7);
    }

    #[test]
    fn test_sorted_by_distance_per_vessel() {
        let vessels = vec![
            Vessel::new(2, "B").at(c(51.90, 4.00)),
            Vessel::new(1, "A").at(c(51.95, 4.05)),
        ];
        let ports = vec![
            Port::new(1, "Far", c(52.30, 4.60)),
            Port::new(2, "Near", c(51.95, 4.10)),
            Port::new(3, "Mid", c(52.05, 4.30)),
        ];

        let found = find_connections(&vessels, &ports, radius(100.0));
        let ids: Vec<VesselId> = found.iter().map(|c| c.vessel_id).collect();
        assert_eq!(ids, vec![1, 1, 1, 2, 2, 2]);
        for pair in found.windows(2) {
            if pair[0].vessel_id == pair[1].vessel_id {
                assert!(pair[0].distance_km <= pair[1].distance_km);
            }
        }
    }

    #[test]
    fn test_pair_included_iff_within_radius_and_monotonic() {
        let vessels: Vec<Vessel> = (0..12)
            .map(|i| Vessel::new(i, "v").at(c(25.0 + i as f64 * 0.05, 55.5 + i as f64 * 0.07)))
            .collect();
        let ports: Vec<Port> = (0..6)
            .map(|i| Port::new(i, "p", c(25.2 + i as f64 * 0.1, 56.0 - i as f64 * 0.05)))
            .collect();

        let mut previous: Vec<(VesselId, PortId)> = Vec::new();
        for r in [5.0, 10.0, 25.0, 50.0, 100.0] {
            let found = find_connections(&vessels, &ports, radius(r));
            let pairs: Vec<(VesselId, PortId)> =
                found.iter().map(|c| (c.vessel_id, c.port_id)).collect();

            for v in &vessels {
                for p in &ports {
                    let d = haversine_km(&v.position.unwrap(), &p.position);
                    assert_eq!(pairs.contains(&(v.id, p.id)), d <= r);
                }
            }
            for pair in &previous {
                assert!(pairs.contains(pair), "{:?} lost when radius grew to {}", pair, r);
            }
            previous = pairs;
        }
    }

    #[test]
    fn test_vessel_without_position_is_skipped() {
        let vessels = vec![Vessel::new(1, "Unplaced")];
        let ports = vec![Port::new(1, "Anywhere", c(0.0, 0.0))];
        assert!(find_connections(&vessels, &ports, radius(20_000.0)).is_empty());
        assert!(vessels_near(&ports[0], &vessels, radius(20_000.0)).is_empty());
    }

    #[test]
    fn test_vessels_near() {
        let port = Port::new(9, "Fujairah", c(25.1164, 56.3269));
        let vessels = vec![
            Vessel::new(5, "Near").at(c(25.12, 56.33)),
            Vessel::new(2, "Nearer").at(c(25.1164, 56.3270)),
            Vessel::new(8, "Away").at(c(25.10, 56.00)),
        ];

        let nearby = vessels_near(&port, &vessels, radius(20.0));
        let ids: Vec<VesselId> = nearby.iter().map(|n| n.vessel.id).collect();
        assert_eq!(ids, vec![2, 5]);

        let value = serde_json::to_value(&nearby[0]).unwrap();
        assert_eq!(value["id"], 2);
        assert!(value["distanceKm"].as_f64().unwrap() < 0.1);
    }
}
