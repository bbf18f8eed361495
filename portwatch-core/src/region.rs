//! Region Classification
//!
//! Maps a coordinate to a coarse operating region using an ordered list of
//! bounding-box rules. The first matching rule wins.
//!
//! The boxes overlap on purpose, so the order of [`RULES`] is part of the
//! contract:
//!
//! 1. Small-footprint overrides for countries that straddle two continental
//!    boxes (Egypt, Turkey).
//! 2. The transcontinental Russia boxes, ahead of the general boxes so that
//!    Siberia is not bucketed as East Asia.
//! 3. General continental boxes, narrowest span first.
//! 4. A hemisphere fallback (see [`classify`]) which makes the function total.
//!
//! All bounds are inclusive.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::IntoEnumIterator;

use crate::error::ValidationError;
use crate::geo::Coordinate;
use crate::model::Vessel;

/// Coarse named geographic bucket used for filtering and aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumIter)]
pub enum Region {
    #[strum(to_string = "Middle East")]
    MiddleEast,
    #[strum(to_string = "North Africa")]
    NorthAfrica,
    #[strum(to_string = "West Africa")]
    WestAfrica,
    #[strum(to_string = "East Africa")]
    EastAfrica,
    #[strum(to_string = "Southern Africa")]
    SouthernAfrica,
    #[strum(to_string = "Western Europe")]
    WesternEurope,
    #[strum(to_string = "Eastern Europe")]
    EasternEurope,
    #[strum(to_string = "Russia")]
    Russia,
    #[strum(to_string = "South Asia")]
    SouthAsia,
    #[strum(to_string = "Southeast Asia")]
    SoutheastAsia,
    #[strum(to_string = "East Asia")]
    EastAsia,
    #[strum(to_string = "Oceania")]
    Oceania,
    #[strum(to_string = "North America")]
    NorthAmerica,
    #[strum(to_string = "Caribbean")]
    Caribbean,
    #[strum(to_string = "South America")]
    SouthAmerica,
    #[strum(to_string = "Northern Waters")]
    NorthernWaters,
    #[strum(to_string = "Southern Waters")]
    SouthernWaters,
}

impl Region {
    /// Parse a region from its display name or a slug.
    ///
    /// Case, spaces, hyphens and underscores are ignored, so
    /// `"Middle East"`, `"middle-east"` and `"MIDDLE_EAST"` all match.
    pub fn parse(s: &str) -> Result<Region, ValidationError> {
        let wanted = normalize(s);
        Region::iter()
            .find(|r| normalize(&r.to_string()) == wanted)
            .ok_or_else(|| ValidationError::UnknownRegion(s.to_string()))
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl Serialize for Region {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Region::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Inclusive latitude/longitude box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl BoundingBox {
    pub const fn new(lat_min: f64, lat_max: f64, lng_min: f64, lng_max: f64) -> Self {
        BoundingBox {
            lat_min,
            lat_max,
            lng_min,
            lng_max,
        }
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        coord.lat() >= self.lat_min
            && coord.lat() <= self.lat_max
            && coord.lng() >= self.lng_min
            && coord.lng() <= self.lng_max
    }

    /// Span in square degrees, used to order the general boxes
    pub fn span(&self) -> f64 {
        (self.lat_max - self.lat_min) * (self.lng_max - self.lng_min)
    }
}

/// Precedence tier of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuleTier {
    Override,
    Transcontinental,
    Continental,
}

/// One (predicate, result) pair of the classification table
#[derive(Debug, Clone, Copy)]
pub struct RegionRule {
    pub name: &'static str,
    pub tier: RuleTier,
    pub bounds: BoundingBox,
    pub region: Region,
}

const fn rule(
    name: &'static str,
    tier: RuleTier,
    bounds: BoundingBox,
    region: Region,
) -> RegionRule {
    RegionRule {
        name,
        tier,
        bounds,
        region,
    }
}

/// Classification table, evaluated top to bottom
pub const RULES: &[RegionRule] = &[
    // Overrides. Sinai and the Gulf of Suez fall in the Middle East box.
    rule("Egypt", RuleTier::Override, BoundingBox::new(22.0, 31.7, 24.7, 36.9), Region::NorthAfrica),
    // Eastern Turkey falls in the Middle East box.
    rule("Turkey", RuleTier::Override, BoundingBox::new(35.8, 42.1, 26.0, 44.8), Region::EasternEurope),
    // Russia, both sides of the antimeridian
    rule("Russia", RuleTier::Transcontinental, BoundingBox::new(50.0, 82.0, 27.0, 180.0), Region::Russia),
    rule("Chukotka", RuleTier::Transcontinental, BoundingBox::new(60.0, 72.0, -180.0, -168.9), Region::Russia),
    // Continental boxes, narrowest first
    rule("Caribbean", RuleTier::Continental, BoundingBox::new(10.0, 27.0, -90.0, -59.0), Region::Caribbean),
    rule("East Africa", RuleTier::Continental, BoundingBox::new(-15.0, 12.0, 30.0, 52.0), Region::EastAfrica),
    rule("Southern Africa", RuleTier::Continental, BoundingBox::new(-36.0, -15.0, 10.0, 42.0), Region::SouthernAfrica),
    rule("Middle East", RuleTier::Continental, BoundingBox::new(12.0, 42.0, 34.0, 63.0), Region::MiddleEast),
    rule("Eastern Europe", RuleTier::Continental, BoundingBox::new(35.0, 72.0, 15.0, 45.0), Region::EasternEurope),
    rule("South Asia", RuleTier::Continental, BoundingBox::new(0.0, 37.0, 60.0, 92.0), Region::SouthAsia),
    rule("North Africa", RuleTier::Continental, BoundingBox::new(15.0, 38.0, -18.0, 34.0), Region::NorthAfrica),
    rule("Western Europe", RuleTier::Continental, BoundingBox::new(35.0, 72.0, -25.0, 15.0), Region::WesternEurope),
    rule("West Africa", RuleTier::Continental, BoundingBox::new(-18.0, 15.0, -20.0, 30.0), Region::WestAfrica),
    rule("Southeast Asia", RuleTier::Continental, BoundingBox::new(-11.0, 24.0, 92.0, 141.0), Region::SoutheastAsia),
    rule("East Asia", RuleTier::Continental, BoundingBox::new(18.0, 55.0, 100.0, 150.0), Region::EastAsia),
    rule("Oceania", RuleTier::Continental, BoundingBox::new(-50.0, 0.0, 110.0, 180.0), Region::Oceania),
    rule("South America", RuleTier::Continental, BoundingBox::new(-56.0, 13.0, -92.0, -30.0), Region::SouthAmerica),
    rule("North America", RuleTier::Continental, BoundingBox::new(15.0, 72.0, -170.0, -50.0), Region::NorthAmerica),
];

/// Classify a coordinate into a region.
///
/// Deterministic and total: a coordinate that matches no rule falls back to
/// [`Region::NorthernWaters`] (latitude >= 0) or [`Region::SouthernWaters`].
pub fn classify(coord: Coordinate) -> Region {
    classify_with(RULES, coord)
}

/// Classify against a caller supplied rule table, same fallback as [`classify`]
pub fn classify_with(rules: &[RegionRule], coord: Coordinate) -> Region {
    rules
        .iter()
        .find(|r| r.bounds.contains(coord))
        .map(|r| r.region)
        .unwrap_or(if coord.lat() >= 0.0 {
            Region::NorthernWaters
        } else {
            Region::SouthernWaters
        })
}

/// Derive `region` for every vessel from its position.
///
/// A vessel without a position has no region.
pub fn assign_regions(vessels: &mut [Vessel]) {
    for vessel in vessels.iter_mut() {
        vessel.region = vessel.position.map(classify);
    }
}
