//! Planar projection and bounding-box index over tile footprints.
//!
//! Footprints are projected to spherical Web Mercator (EPSG:3857) before any
//! area or intersection is computed, so overlap ratios are comparable across
//! latitudes. Candidate pairs are pruned with an R-tree over the projected
//! bounding boxes; exact overlap is resolved by polygon intersection.

use std::f64::consts::PI;

use geo::{Area, BooleanOps, BoundingRect, Coord, Intersects, LineString, Polygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

use crate::domain::{Coordinate, Footprint};

/// Half the earth's circumference in Web Mercator meters.
const HALF_EARTH: f64 = 20_037_508.342_789_244;

/// Tolerance on overlap ratios. Clipping identical tiles rarely yields exactly 1.
pub const RATIO_EPSILON: f64 = 1e-9;

/// Mercator is undefined at the poles; latitudes are clamped to the EPSG:3857 extent.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

pub fn project(coordinate: Coordinate) -> Coord<f64> {
    let lat = coordinate.lat().clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = coordinate.lon() * HALF_EARTH / 180.0;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * HALF_EARTH / PI;
    Coord { x, y }
}

pub fn projected_polygon(footprint: &Footprint) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = footprint.ring().iter().map(|c| project(*c)).collect();
    // LineString closes the ring when wrapped in a Polygon.
    Polygon::new(LineString::from(ring), Vec::new())
}

pub struct GeometryIndex {
    polygons: Vec<Polygon<f64>>,
    areas: Vec<f64>,
    tree: RTree<IndexedBox>,
}

impl GeometryIndex {
    pub fn build(footprints: &[Footprint]) -> Self {
        let polygons: Vec<Polygon<f64>> = footprints.iter().map(projected_polygon).collect();
        let areas = polygons.iter().map(|poly| poly.unsigned_area()).collect();
        let boxes = polygons
            .iter()
            .enumerate()
            .filter_map(|(i, poly)| {
                let rect = poly.bounding_rect()?;
                let min = rect.min();
                let max = rect.max();
                Some(GeomWithData::new(
                    Rectangle::from_corners([min.x, min.y], [max.x, max.y]),
                    i,
                ))
            })
            .collect();

        Self {
            polygons,
            areas,
            tree: RTree::bulk_load(boxes),
        }
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Projected area in square meters.
    pub fn area(&self, index: usize) -> f64 {
        self.areas[index]
    }

    pub fn polygon(&self, index: usize) -> &Polygon<f64> {
        &self.polygons[index]
    }

    /// Indices whose bounding box intersects the box of `index`, ascending, without `index`.
    pub fn query_candidates(&self, index: usize) -> Vec<usize> {
        let Some(rect) = self.polygons[index].bounding_rect() else {
            return Vec::new();
        };
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|item| item.data)
            .filter(|&other| other != index)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// `area(i ∩ j) / min(area(i), area(j))`, or `None` when either footprint is
    /// degenerate or the polygons do not touch.
    pub fn overlap_ratio(&self, i: usize, j: usize) -> Option<f64> {
        let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
        let min_area = self.areas[lo].min(self.areas[hi]);
        if min_area.is_nan() || min_area <= 0.0 {
            return None;
        }
        let a = &self.polygons[lo];
        let b = &self.polygons[hi];
        if !a.intersects(b) {
            return None;
        }
        let ratio = shared_ratio(a.intersection(b).unsigned_area(), min_area);
        Some(ratio)
    }
}

fn shared_ratio(shared: f64, min_area: f64) -> f64 {
    let ratio = shared / min_area;
    if ratio >= 1.0 - RATIO_EPSILON {
        1.0
    } else {
        ratio
    }
}
