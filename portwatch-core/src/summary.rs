//! Port Summary
//!
//! Groups proximity connections by port and pages through the result.
//! Query parameters arrive as raw strings and are validated here; invalid
//! values are rejected, never clamped.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::error::ValidationError;
use crate::geo::Coordinate;
use crate::model::{Port, PortId};
use crate::proximity::ProximityConnection;
use crate::region::{classify, Region};

/// Largest page size accepted unless configured otherwise
pub const DEFAULT_MAX_LIMIT: u32 = 100;
pub const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    Name,
    #[default]
    VesselCount,
}

impl SortKey {
    pub fn parse(s: &str) -> Result<SortKey, ValidationError> {
        match s {
            "name" => Ok(SortKey::Name),
            "vesselCount" => Ok(SortKey::VesselCount),
            _ => Err(ValidationError::InvalidSortKey(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Result<SortOrder, ValidationError> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ValidationError::InvalidSortOrder(s.to_string())),
        }
    }
}

/// Unvalidated query parameters, as received
#[derive(Debug, Clone, Default)]
pub struct RawSummaryQuery<'a> {
    pub region: Option<&'a str>,
    pub page: Option<&'a str>,
    pub limit: Option<&'a str>,
    pub sort_by: Option<&'a str>,
    pub sort_order: Option<&'a str>,
    pub port_type: Option<&'a str>,
}

/// Validated summary query
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryQuery {
    pub region: Option<Region>,
    /// 1-indexed
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub port_type: Option<String>,
}

impl Default for SummaryQuery {
    fn default() -> Self {
        SummaryQuery {
            region: None,
            page: 1,
            limit: DEFAULT_LIMIT,
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
            port_type: None,
        }
    }
}

impl SummaryQuery {
    /// Validate raw parameters against a maximum page size
    pub fn parse(raw: &RawSummaryQuery<'_>, max_limit: u32) -> Result<SummaryQuery, ValidationError> {
        let page = match raw.page {
            None => 1,
            Some(s) => match s.trim().parse::<u32>() {
                Ok(p) if p >= 1 => p,
                _ => return Err(ValidationError::InvalidPage(s.to_string())),
            },
        };

        let limit = match raw.limit {
            None => DEFAULT_LIMIT.min(max_limit),
            Some(s) => match s.trim().parse::<u32>() {
                Ok(l) if (1..=max_limit).contains(&l) => l,
                _ => {
                    return Err(ValidationError::InvalidLimit {
                        value: s.to_string(),
                        max: max_limit,
                    })
                }
            },
        };

        Ok(SummaryQuery {
            region: raw.region.map(Region::parse).transpose()?,
            page,
            limit,
            sort_by: raw.sort_by.map(SortKey::parse).transpose()?.unwrap_or_default(),
            sort_order: raw.sort_order.map(SortOrder::parse).transpose()?.unwrap_or_default(),
            port_type: raw
                .port_type
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

/// One port with the number of vessels within radius of it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSummary {
    pub id: PortId,
    pub name: String,
    pub country: String,
    #[serde(rename = "type")]
    pub port_type: String,
    pub position: Coordinate,
    pub region: Region,
    pub vessel_count: usize,
}

/// A page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: u32,
}

/// Count vessels per port and return the requested page.
///
/// Every port passing the region and type filters is listed, including
/// ports with no vessel nearby. Ties in the sort key are broken by port id.
pub fn port_summary(
    ports: &[Port],
    connections: &[ProximityConnection],
    query: &SummaryQuery,
) -> Page<PortSummary> {
    let mut counts: HashMap<PortId, usize> = HashMap::new();
    for conn in connections {
        *counts.entry(conn.port_id).or_default() += 1;
    }

    let mut rows: Vec<PortSummary> = ports
        .iter()
        .filter(|p| {
            query
                .port_type
                .as_deref()
                .map_or(true, |t| p.port_type.eq_ignore_ascii_case(t))
        })
        .map(|p| PortSummary {
            id: p.id,
            name: p.name.clone(),
            country: p.country.clone(),
            port_type: p.port_type.clone(),
            position: p.position,
            region: classify(p.position),
            vessel_count: counts.get(&p.id).copied().unwrap_or(0),
        })
        .filter(|row| query.region.map_or(true, |r| row.region == r))
        .collect();

    rows.sort_by(|a, b| {
        let primary = match query.sort_by {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::VesselCount => a.vessel_count.cmp(&b.vessel_count),
        };
        let primary = match query.sort_order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        match primary {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        }
    });

    let total = rows.len();
    let limit = query.limit as usize;
    let total_pages = total.div_ceil(limit) as u32;
    let start = (query.page as usize - 1).saturating_mul(limit);
    let items = rows.into_iter().skip(start).take(limit).collect();

    Page {
        items,
        page: query.page,
        limit: query.limit,
        total,
        total_pages,
    }
}
