use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::{CatalogClient, DatasetInfo, MetadataField, SceneRecord};
use crate::domain::{BoundingBox, Candidate, Coordinate, Footprint};
use crate::error::StitchError;

pub const DEFAULT_DATASET_NAME: &str = "high_res_ortho";
pub const DEFAULT_MAX_RESULTS: u32 = 1000;
const AERIAL_KEYWORD: &str = "Aerial";

/// First dataset matching `dataset_name` whose keywords mark it as aerial photography.
pub fn find_aerial_dataset<C: CatalogClient + ?Sized>(
    client: &C,
    region: &BoundingBox,
    dataset_name: &str,
) -> Result<DatasetInfo, StitchError> {
    info!(dataset_name, "searching for datasets");
    client
        .dataset_search(region, Some(dataset_name))?
        .into_iter()
        .find(|dataset| dataset.has_keyword(AERIAL_KEYWORD))
        .ok_or_else(|| StitchError::NoAerialDataset(dataset_name.to_string()))
}

#[derive(Default)]
struct CornerReading {
    lat: Option<f64>,
    lon: Option<f64>,
}

impl CornerReading {
    fn coordinate(&self, entity_id: &str) -> Result<Coordinate, StitchError> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Coordinate::new(lat, lon)
                .map_err(|_| StitchError::InvalidFootprint(entity_id.to_string())),
            _ => Err(StitchError::InvalidFootprint(entity_id.to_string())),
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn fill(slot: &mut Option<f64>, field: &MetadataField) {
    if slot.is_none() {
        *slot = numeric(&field.value);
    }
}

/// Read the four corners and center from a scene's metadata fields.
/// The first usable occurrence of each field wins.
pub fn footprint_from_metadata(record: &SceneRecord) -> Result<Footprint, StitchError> {
    let mut ne = CornerReading::default();
    let mut se = CornerReading::default();
    let mut sw = CornerReading::default();
    let mut nw = CornerReading::default();
    let mut center = CornerReading::default();

    for field in &record.metadata {
        match field.field_name.as_str() {
            "NE Corner Lat dec" => fill(&mut ne.lat, field),
            "NE Corner Long dec" => fill(&mut ne.lon, field),
            "SE Corner Lat dec" => fill(&mut se.lat, field),
            "SE Corner Long dec" => fill(&mut se.lon, field),
            "SW Corner Lat dec" => fill(&mut sw.lat, field),
            "SW Corner Long dec" => fill(&mut sw.lon, field),
            "NW Corner Lat dec" => fill(&mut nw.lat, field),
            "NW Corner Long dec" => fill(&mut nw.lon, field),
            "Center Latitude dec" => fill(&mut center.lat, field),
            "Center Longitude dec" => fill(&mut center.lon, field),
            _ => {}
        }
    }

    let id = record.entity_id.as_str();
    Ok(Footprint::new(
        ne.coordinate(id)?,
        se.coordinate(id)?,
        sw.coordinate(id)?,
        nw.coordinate(id)?,
        center.coordinate(id)?,
    ))
}

/// Scenes with unusable footprints are logged and left out.
pub fn candidates_from_scenes(dataset_name: &str, scenes: &[SceneRecord]) -> Vec<Candidate> {
    scenes
        .iter()
        .filter_map(|scene| match footprint_from_metadata(scene) {
            Ok(footprint) => Some(Candidate::new(
                scene.entity_id.clone(),
                dataset_name,
                footprint,
            )),
            Err(err) => {
                warn!(entity_id = %scene.entity_id, %err, "skipping scene");
                None
            }
        })
        .collect()
}
