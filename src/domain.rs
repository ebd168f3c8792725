use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::StitchError;

pub fn parse_latitude(value: &str) -> Result<f64, StitchError> {
    let lat: f64 = value
        .trim()
        .parse()
        .map_err(|_| StitchError::InvalidLatitude(value.to_string()))?;
    validate_latitude(lat)
}

pub fn parse_longitude(value: &str) -> Result<f64, StitchError> {
    let lon: f64 = value
        .trim()
        .parse()
        .map_err(|_| StitchError::InvalidLongitude(value.to_string()))?;
    validate_longitude(lon)
}

fn validate_latitude(lat: f64) -> Result<f64, StitchError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(StitchError::InvalidLatitude(lat.to_string()));
    }
    Ok(lat)
}

fn validate_longitude(lon: f64) -> Result<f64, StitchError> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(StitchError::InvalidLongitude(lon.to_string()));
    }
    Ok(lon)
}

/// A validated WGS84 position. Out-of-range values are rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = StitchError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lon)
    }
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, StitchError> {
        Ok(Self {
            lat: validate_latitude(lat)?,
            lon: validate_longitude(lon)?,
        })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Geographic coverage of one tile: four corners plus the center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Footprint {
    center: Coordinate,
    north_east: Coordinate,
    south_east: Coordinate,
    south_west: Coordinate,
    north_west: Coordinate,
}

impl Footprint {
    pub fn new(
        north_east: Coordinate,
        south_east: Coordinate,
        south_west: Coordinate,
        north_west: Coordinate,
        center: Coordinate,
    ) -> Self {
        Self {
            center,
            north_east,
            south_east,
            south_west,
            north_west,
        }
    }

    /// Axis-aligned footprint spanning the given corners, centered between them.
    pub fn from_bounds(lower_left: Coordinate, upper_right: Coordinate) -> Result<Self, StitchError> {
        let south = lower_left.lat();
        let west = lower_left.lon();
        let north = upper_right.lat();
        let east = upper_right.lon();
        Ok(Self::new(
            Coordinate::new(north, east)?,
            Coordinate::new(south, east)?,
            Coordinate::new(south, west)?,
            Coordinate::new(north, west)?,
            Coordinate::new((north + south) / 2.0, (east + west) / 2.0)?,
        ))
    }

    pub fn north_east(&self) -> Coordinate {
        self.north_east
    }

    pub fn south_east(&self) -> Coordinate {
        self.south_east
    }

    pub fn south_west(&self) -> Coordinate {
        self.south_west
    }

    pub fn north_west(&self) -> Coordinate {
        self.north_west
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    /// Corners in ring order: NW, NE, SE, SW.
    pub fn ring(&self) -> [Coordinate; 4] {
        [
            self.north_west,
            self.north_east,
            self.south_east,
            self.south_west,
        ]
    }
}

/// One scene returned by the catalog search.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record_id: String,
    pub dataset_name: String,
    pub footprint: Footprint,
}

impl Candidate {
    pub fn new(
        record_id: impl Into<String>,
        dataset_name: impl Into<String>,
        footprint: Footprint,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            dataset_name: dataset_name.into(),
            footprint,
        }
    }
}

/// Minimum bounding rectangle used for catalog spatial filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub lower_left: Coordinate,
    pub upper_right: Coordinate,
}

impl BoundingBox {
    pub fn new(lower_left: Coordinate, upper_right: Coordinate) -> Self {
        Self {
            lower_left,
            upper_right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum SelectionPolicy {
    #[default]
    #[serde(rename = "min_index")]
    #[value(name = "min_index")]
    MinIndex,
    #[serde(rename = "max_area")]
    #[value(name = "max_area")]
    MaxArea,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::MinIndex => write!(f, "min_index"),
            SelectionPolicy::MaxArea => write!(f, "max_area"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = StitchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "min_index" => Ok(SelectionPolicy::MinIndex),
            "max_area" => Ok(SelectionPolicy::MaxArea),
            _ => Err(StitchError::InvalidSelection(value.to_string())),
        }
    }
}

/// How the region around a shape's center is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum BoundsType {
    #[serde(rename = "POINT")]
    #[value(name = "POINT", alias = "point")]
    Point,
}

impl fmt::Display for BoundsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundsType::Point => write!(f, "POINT"),
        }
    }
}

impl FromStr for BoundsType {
    type Err = StitchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "POINT" => Ok(BoundsType::Point),
            _ => Err(StitchError::InvalidBoundsType(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_latitude_valid() {
        assert_eq!(parse_latitude(" 39.25 ").unwrap(), 39.25);
    }

    #[test]
    fn parse_latitude_out_of_range() {
        let err = parse_latitude("91").unwrap_err();
        assert_matches!(err, StitchError::InvalidLatitude(_));
    }

    #[test]
    fn parse_longitude_not_a_number() {
        let err = parse_longitude("west").unwrap_err();
        assert_matches!(err, StitchError::InvalidLongitude(_));
    }

    #[test]
    fn coordinate_rejects_instead_of_clamping() {
        assert_matches!(
            Coordinate::new(0.0, 180.5),
            Err(StitchError::InvalidLongitude(_))
        );
        assert_matches!(
            Coordinate::new(f64::NAN, 0.0),
            Err(StitchError::InvalidLatitude(_))
        );
    }

    #[test]
    fn coordinate_deserialize_validates() {
        let err = serde_json::from_str::<Coordinate>(r#"{"lat": 120.0, "lon": 0.0}"#);
        assert!(err.is_err());
        let ok: Coordinate = serde_json::from_str(r#"{"lat": 12.5, "lon": -82.0}"#).unwrap();
        assert_eq!(ok.lon(), -82.0);
    }

    #[test]
    fn footprint_json_uses_named_corners() {
        let footprint = Footprint::from_bounds(
            Coordinate::new(39.0, -83.0).unwrap(),
            Coordinate::new(40.0, -82.0).unwrap(),
        )
        .unwrap();
        let json = serde_json::to_value(footprint).unwrap();
        assert_eq!(json["northEast"]["lat"], 40.0);
        assert_eq!(json["southWest"]["lon"], -83.0);
        assert_eq!(json["center"]["lat"], 39.5);
    }

    #[test]
    fn selection_policy_parse() {
        assert_eq!(
            "max_area".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::MaxArea
        );
        assert_matches!(
            "largest".parse::<SelectionPolicy>(),
            Err(StitchError::InvalidSelection(_))
        );
    }

    #[test]
    fn bounds_type_parse_case_insensitive() {
        assert_eq!("point".parse::<BoundsType>().unwrap(), BoundsType::Point);
        assert_matches!(
            "POLYGON".parse::<BoundsType>(),
            Err(StitchError::InvalidBoundsType(_))
        );
    }
}
