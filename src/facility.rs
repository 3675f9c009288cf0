//! Facility geometry: fence perimeter, rest zone, green zones and the derived red zones.
//!
//! Vertices are configured as `[lat, lon]` pairs. Internally everything is a
//! `geo` polygon in (x = lon, y = lat) order.

use geo::{BooleanOps, Centroid, Coord, Intersects, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{HerdError, HerdResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub vertices: Vec<[f64; 2]>,
}

/// Facility geometry as written in a deployment file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityConfig {
    pub fences: Vec<Vec<[f64; 2]>>,
    pub rest_zone: Option<ZoneConfig>,
    pub green_zones: Vec<ZoneConfig>,
    pub center: Option<[f64; 2]>,
}

impl FacilityConfig {
    pub fn from_json_file(path: &Path) -> HerdResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Resolved facility geometry. Red zones are computed once at construction.
#[derive(Clone, Debug)]
pub struct Facility {
    fences: MultiPolygon<f64>,
    rest_zone: Option<(String, Polygon<f64>)>,
    green_zones: Vec<(String, Polygon<f64>)>,
    red_zones: MultiPolygon<f64>,
    center: Option<(f64, f64)>,
}

impl Default for Facility {
    /// Unbounded facility: every fix is inside the fence and no zones apply.
    fn default() -> Self {
        Self {
            fences: MultiPolygon::new(Vec::new()),
            rest_zone: None,
            green_zones: Vec::new(),
            red_zones: MultiPolygon::new(Vec::new()),
            center: None,
        }
    }
}

impl Facility {
    pub fn new(config: &FacilityConfig) -> HerdResult<Self> {
        let fences = config
            .fences
            .iter()
            .map(|ring| polygon_from_latlon(ring))
            .collect::<HerdResult<Vec<_>>>()?;
        let fences = MultiPolygon::new(fences);

        let rest_zone = match &config.rest_zone {
            Some(zone) => Some((zone.name.clone(), polygon_from_latlon(&zone.vertices)?)),
            None => None,
        };

        let green_zones = config
            .green_zones
            .iter()
            .map(|zone| Ok((zone.name.clone(), polygon_from_latlon(&zone.vertices)?)))
            .collect::<HerdResult<Vec<_>>>()?;

        let red_zones = compute_red_zones(&fences, &green_zones);

        let center = config
            .center
            .map(|[lat, lon]| (lat, lon))
            .or_else(|| fences.centroid().map(|p| (p.y(), p.x())));

        log::debug!(
            "Facility: {} fence polygon(s), {} green zone(s), {} red polygon(s), rest zone {}",
            fences.0.len(),
            green_zones.len(),
            red_zones.0.len(),
            rest_zone.as_ref().map(|(n, _)| n.as_str()).unwrap_or("none")
        );

        Ok(Self {
            fences,
            rest_zone,
            green_zones,
            red_zones,
            center,
        })
    }

    pub fn has_fences(&self) -> bool {
        !self.fences.0.is_empty()
    }

    /// True when the fix lies inside (or on) any fence polygon, or no fence is configured.
    pub fn in_fence(&self, lat: f64, lon: f64) -> bool {
        if !self.has_fences() {
            return true;
        }
        let point = Point::new(lon, lat);
        self.fences.0.iter().any(|poly| poly.intersects(&point))
    }

    /// `None` when the facility has no rest zone.
    pub fn in_rest_zone(&self, lat: f64, lon: f64) -> Option<bool> {
        self.rest_zone
            .as_ref()
            .map(|(_, poly)| poly.intersects(&Point::new(lon, lat)))
    }

    pub fn rest_zone_name(&self) -> Option<&str> {
        self.rest_zone.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn in_red_zone(&self, lat: f64, lon: f64) -> bool {
        let point = Point::new(lon, lat);
        self.red_zones.0.iter().any(|poly| poly.intersects(&point))
    }

    pub fn red_zones(&self) -> &MultiPolygon<f64> {
        &self.red_zones
    }

    pub fn green_zone_names(&self) -> impl Iterator<Item = &str> {
        self.green_zones.iter().map(|(name, _)| name.as_str())
    }

    /// Facility center as (lat, lon)
    pub fn center(&self) -> Option<(f64, f64)> {
        self.center
    }
}

/// Fence area not covered by any green zone.
pub fn compute_red_zones(
    fences: &MultiPolygon<f64>,
    green_zones: &[(String, Polygon<f64>)],
) -> MultiPolygon<f64> {
    if fences.0.is_empty() {
        return MultiPolygon::new(Vec::new());
    }
    let fence_area = fences
        .0
        .iter()
        .skip(1)
        .fold(MultiPolygon::new(vec![fences.0[0].clone()]), |acc, poly| {
            acc.union(&MultiPolygon::new(vec![poly.clone()]))
        });
    green_zones
        .iter()
        .fold(fence_area, |acc, (_, green)| acc.difference(&MultiPolygon::new(vec![green.clone()])))
}

fn polygon_from_latlon(vertices: &[[f64; 2]]) -> HerdResult<Polygon<f64>> {
    if vertices.len() < 3 {
        return Err(HerdError::InvalidConfig(format!(
            "polygon needs at least 3 vertices, got {}",
            vertices.len()
        )));
    }
    let coords: Vec<Coord<f64>> = vertices
        .iter()
        .map(|[lat, lon]| Coord { x: *lon, y: *lat })
        .collect();
    Ok(Polygon::new(LineString::from(coords), Vec::new()))
}
