use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{BoundingBox, BoundsType, Coordinate};
use crate::error::StitchError;

pub const DEFAULT_SHAPE_FILE: &str = "Shape.json";
pub const DEFAULT_RADIUS_MILES: f64 = 10.0;

const MILES_PER_DEGREE: f64 = 69.0;

/// Region definition written by `create-bounds` and consumed by `gather-ortho`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeFile {
    pub bounds_type: BoundsType,
    pub center: Coordinate,
}

impl ShapeFile {
    pub fn new(bounds_type: BoundsType, center: Coordinate) -> Self {
        Self {
            bounds_type,
            center,
        }
    }

    pub fn read(path: &Path) -> Result<Self, StitchError> {
        let content = fs::read_to_string(path).map_err(|err| StitchError::InvalidShape {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|err| StitchError::InvalidShape {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), StitchError> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| StitchError::Filesystem(err.to_string()))?;
        fs::write(path, content).map_err(|err| StitchError::Filesystem(err.to_string()))
    }

    pub fn total_region(&self, radius_miles: f64) -> Result<BoundingBox, StitchError> {
        match self.bounds_type {
            BoundsType::Point => region_around_point(self.center, radius_miles),
        }
    }
}

/// Square-ish box of `radius_miles` around `center`, clipped to valid coordinates.
pub fn region_around_point(
    center: Coordinate,
    radius_miles: f64,
) -> Result<BoundingBox, StitchError> {
    let lat = center.lat();
    let lon = center.lon();
    let lat_offset = radius_miles / MILES_PER_DEGREE;
    let cos_lat = lat.to_radians().cos().max(1e-6);
    let lon_offset = radius_miles / (MILES_PER_DEGREE * cos_lat);

    let lower_left = Coordinate::new(
        (lat - lat_offset).max(-90.0),
        (lon - lon_offset).max(-180.0),
    )?;
    let upper_right = Coordinate::new(
        (lat + lat_offset).min(90.0),
        (lon + lon_offset).min(180.0),
    )?;
    Ok(BoundingBox::new(lower_left, upper_right))
}
