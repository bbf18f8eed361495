//! Position Synthesis
//!
//! Gives vessels a plausible position, status, speed and course when no
//! tracking data is available. Each vessel is placed either somewhere along a
//! shipping lane (underway) or inside an anchorage disk (in port).
//!
//! Status and speed always follow the placement mode:
//!
//! | Mode | Status | Speed |
//! |------|--------|-------|
//! | Route (70%) | Underway, En Route, At Sea | 8-16 kn, never 0 |
//! | Anchorage (30%) | At Anchor, Moored, Loading, Discharging, At Berth | 0 |
//!
//! The random source is injected, so a seeded [`StdRng`] gives reproducible
//! output.

use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo::{Coordinate, KM_PER_DEGREE_LATITUDE};
use crate::model::{Vessel, VesselStatus};
use crate::region::classify;
use crate::routes::{RouteLibrary, ANCHORAGE_RADIUS_DEG};

/// Probability of placing a vessel on a route rather than at an anchorage
pub const ROUTE_PROBABILITY: f64 = 0.7;

/// Maximum jitter applied to each axis of a route position, in degrees
pub const ROUTE_JITTER_DEG: f64 = 0.25;

/// Maximum distance from the port when a vessel is moved to its berth
pub const BERTH_RADIUS_KM: f64 = 1.5;

/// Where a synthesized vessel was placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    Route,
    Anchorage,
}

/// Result of one synthesis draw
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedPosition {
    pub mode: PlacementMode,
    pub position: Coordinate,
    pub status: VesselStatus,
    /// Knots
    pub speed: f64,
    /// Whole degrees in `[0, 360)`
    pub course: f64,
}

impl SynthesizedPosition {
    /// Overwrite the motion fields of `vessel` and rederive its region
    pub fn apply_to(&self, vessel: &mut Vessel) {
        vessel.position = Some(self.position);
        vessel.status = self.status;
        vessel.speed = self.speed;
        vessel.course = self.course;
        vessel.region = Some(classify(self.position));
    }
}

/// Speed band in knots for an underway status
fn speed_band(status: VesselStatus) -> (f64, f64) {
    match status {
        VesselStatus::Underway => (10.0, 16.0),
        VesselStatus::EnRoute => (9.0, 15.0),
        _ => (8.0, 14.0),
    }
}

pub struct PositionSynthesizer<R> {
    library: RouteLibrary,
    rng: R,
}

impl PositionSynthesizer<StdRng> {
    /// Reproducible synthesizer
    pub fn from_seed(library: RouteLibrary, seed: u64) -> Self {
        PositionSynthesizer::new(library, StdRng::seed_from_u64(seed))
    }

    /// Synthesizer seeded from the operating system
    pub fn from_os_rng(library: RouteLibrary) -> Self {
        PositionSynthesizer::new(library, StdRng::from_os_rng())
    }
}

impl<R: Rng> PositionSynthesizer<R> {
    pub fn new(library: RouteLibrary, rng: R) -> Self {
        PositionSynthesizer { library, rng }
    }

    pub fn library(&self) -> &RouteLibrary {
        &self.library
    }

    /// Draw one synthetic position with matching status, speed and course
    pub fn synthesize(&mut self) -> SynthesizedPosition {
        let mode = if self.rng.random_bool(ROUTE_PROBABILITY) {
            PlacementMode::Route
        } else {
            PlacementMode::Anchorage
        };

        let (position, status, speed) = match mode {
            PlacementMode::Route => {
                let position = self.point_on_route();
                let status = self.pick(&VesselStatus::UNDERWAY);
                let (low, high) = speed_band(status);
                let speed = round_tenth(self.rng.random_range(low..=high));
                (position, status, speed)
            }
            PlacementMode::Anchorage => {
                let position = self.point_at_anchorage();
                let status = self.pick(&VesselStatus::IN_PORT);
                (position, status, 0.0)
            }
        };

        let course = self.rng.random_range(0..360u16) as f64;

        SynthesizedPosition {
            mode,
            position,
            status,
            speed,
            course,
        }
    }

    /// Give `vessel` a fresh synthetic position, status, speed and course
    pub fn synthesize_vessel(&mut self, vessel: &mut Vessel) -> SynthesizedPosition {
        let synthesized = self.synthesize();
        synthesized.apply_to(vessel);
        synthesized
    }

    /// Synthesize every vessel in `vessels` in place.
    ///
    /// Callers must leave out vessels that have a trusted live position.
    pub fn synthesize_fleet(&mut self, vessels: &mut [Vessel]) {
        for vessel in vessels.iter_mut() {
            self.synthesize_vessel(vessel);
        }
    }

    /// A point within `BERTH_RADIUS_KM` of `port`, using the anchorage disk
    /// sampling with a smaller radius
    pub fn berth_near(&mut self, port: Coordinate) -> Coordinate {
        self.point_in_disk(port, BERTH_RADIUS_KM / KM_PER_DEGREE_LATITUDE)
    }

    fn point_on_route(&mut self) -> Coordinate {
        let routes = self.library.routes();
        let route = &routes[self.rng.random_range(0..routes.len())];
        let (from, to) = route.segment(self.rng.random_range(0..route.segment_count()));
        let t: f64 = self.rng.random_range(0.0..=1.0);

        let lat = from.lat() + t * (to.lat() - from.lat());
        let lng = from.lng() + t * (to.lng() - from.lng());
        let jitter_lat = self.rng.random_range(-ROUTE_JITTER_DEG..=ROUTE_JITTER_DEG);
        let jitter_lng = self.rng.random_range(-ROUTE_JITTER_DEG..=ROUTE_JITTER_DEG);

        Coordinate::wrapped(lat + jitter_lat, lng + jitter_lng)
    }

    fn point_at_anchorage(&mut self) -> Coordinate {
        let anchorages = self.library.anchorages();
        let center = anchorages[self.rng.random_range(0..anchorages.len())].center;
        self.point_in_disk(center, ANCHORAGE_RADIUS_DEG)
    }

    // Polar sampling: uniform angle, uniform radius
    fn point_in_disk(&mut self, center: Coordinate, radius_deg: f64) -> Coordinate {
        let angle = self.rng.random_range(0.0..TAU);
        let r = self.rng.random_range(0.0..=radius_deg);
        Coordinate::wrapped(center.lat() + r * angle.cos(), center.lng() + r * angle.sin())
    }

    fn pick(&mut self, choices: &[VesselStatus]) -> VesselStatus {
        choices[self.rng.random_range(0..choices.len())]
    }
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_km;

    fn synthesizer(seed: u64) -> PositionSynthesizer<StdRng> {
        PositionSynthesizer::from_seed(RouteLibrary::standard(), seed)
    }

    #[test]
    fn test_mode_split_and_speed_invariant() {
        let mut synth = synthesizer(7);
        let mut route = 0;
        let mut anchorage = 0;

        for _ in 0..1000 {
            let p = synth.synthesize();
            match p.mode {
                PlacementMode::Route => {
                    route += 1;
                    assert!(p.speed > 0.0);
                    assert!(p.status.is_underway());
                }
                PlacementMode::Anchorage => {
                    anchorage += 1;
                    assert_eq!(p.speed, 0.0);
                    assert!(p.status.is_in_port());
                }
            }
            // speed == 0 exactly when the status is an in-port status
            assert_eq!(p.speed == 0.0, p.status.is_in_port());
        }

        assert_eq!(route + anchorage, 1000);
        assert!((630..=770).contains(&route), "route count {}", route);
    }

    #[test]
    fn test_speed_bands_and_course() {
        let mut synth = synthesizer(11);
        for _ in 0..500 {
            let p = synth.synthesize();
            assert!((0.0..360.0).contains(&p.course));
            assert_eq!(p.course.fract(), 0.0);
            if p.mode == PlacementMode::Route {
                let (low, high) = speed_band(p.status);
                assert!(p.speed >= low && p.speed <= high, "{} at {}", p.status, p.speed);
                assert!(p.speed >= 8.0 && p.speed <= 16.0);
            }
        }
    }

    #[test]
    fn test_anchorage_positions_stay_in_disk() {
        let library = RouteLibrary::standard();
        let limit_km = ANCHORAGE_RADIUS_DEG * KM_PER_DEGREE_LATITUDE * 1.001;
        let mut synth = synthesizer(3);

        for _ in 0..300 {
            let p = synth.synthesize();
            if p.mode != PlacementMode::Anchorage {
                continue;
            }
            let nearest = library
                .anchorages()
                .iter()
                .map(|a| haversine_km(&a.center, &p.position))
                .fold(f64::INFINITY, f64::min);
            assert!(nearest <= limit_km, "{} km from any anchorage", nearest);
        }
    }

    #[test]
    fn test_route_positions_stay_near_lanes() {
        let library = RouteLibrary::standard();
        let mut synth = synthesizer(5);

        for _ in 0..300 {
            let p = synth.synthesize();
            if p.mode != PlacementMode::Route {
                continue;
            }
            // Inside the jittered bounding box of at least one segment
            let near_some_segment = library.routes().iter().any(|route| {
                (0..route.segment_count()).any(|i| {
                    let (a, b) = route.segment(i);
                    let lat_ok = p.position.lat() >= a.lat().min(b.lat()) - ROUTE_JITTER_DEG
                        && p.position.lat() <= a.lat().max(b.lat()) + ROUTE_JITTER_DEG;
                    let lng_ok = p.position.lng() >= a.lng().min(b.lng()) - ROUTE_JITTER_DEG
                        && p.position.lng() <= a.lng().max(b.lng()) + ROUTE_JITTER_DEG;
                    lat_ok && lng_ok
                })
            });
            assert!(near_some_segment, "{:?} is off every lane", p.position);
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let a: Vec<SynthesizedPosition> = {
            let mut s = synthesizer(42);
            (0..20).map(|_| s.synthesize()).collect()
        };
        let b: Vec<SynthesizedPosition> = {
            let mut s = synthesizer(42);
            (0..20).map(|_| s.synthesize()).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_synthesize_fleet_derives_region() {
        let mut fleet: Vec<Vessel> = (1..=50).map(|i| Vessel::new(i, "tanker")).collect();
        synthesizer(9).synthesize_fleet(&mut fleet);

        for vessel in &fleet {
            let position = vessel.position.expect("synthesized vessels have a position");
            assert_eq!(vessel.region, Some(classify(position)));
            assert_eq!(vessel.speed == 0.0, vessel.status.is_in_port());
        }
    }

    #[test]
    fn test_synthesize_vessel_overwrites_motion() {
        let mut vessel = Vessel::new(7, "Hormuz Trader");
        let synthesized = synthesizer(3).synthesize_vessel(&mut vessel);

        assert_eq!(vessel.id, 7);
        assert_eq!(vessel.position, Some(synthesized.position));
        assert_eq!(vessel.status, synthesized.status);
        assert_eq!(vessel.speed, synthesized.speed);
        assert_eq!(vessel.course, synthesized.course);
        assert_eq!(vessel.region, Some(classify(synthesized.position)));
    }

    #[test]
    fn test_berth_near_port() {
        let port = Coordinate::new(25.1164, 56.3269).unwrap();
        let mut synth = synthesizer(1);
        for _ in 0..500 {
            let berth = synth.berth_near(port);
            assert!(haversine_km(&port, &berth) <= BERTH_RADIUS_KM + 1e-6);
        }

        let north = Coordinate::new(60.35, 28.65).unwrap();
        for _ in 0..100 {
            assert!(haversine_km(&north, &synth.berth_near(north)) <= BERTH_RADIUS_KM + 1e-6);
        }
    }
}
