use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::area::ShapeFile;
use crate::catalog::CatalogClient;
use crate::config::ResolvedConfig;
use crate::dedup::deduplicate;
use crate::domain::{BoundingBox, BoundsType, Coordinate, parse_latitude, parse_longitude};
use crate::error::StitchError;
use crate::fetch::Fetcher;
use crate::orchestrator::{AcquisitionOrchestrator, AcquisitionReport, Sleeper, ThreadSleeper};
use crate::ortho::{candidates_from_scenes, find_aerial_dataset};
use crate::sidecar::SidecarStore;

#[derive(Debug, Clone, Serialize)]
pub struct CreateBoundsResult {
    pub path: String,
    pub bounds_type: BoundsType,
    pub center: Coordinate,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatherResult {
    pub region: BoundingBox,
    pub dataset_alias: String,
    pub scenes: usize,
    pub candidates: usize,
    pub kept: usize,
    pub download_dir: String,
    pub report: AcquisitionReport,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed_ms: Option<u128>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Discards progress; used when output is machine-readable.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn create_bounds(
    lat: &str,
    lon: &str,
    bounds_type: BoundsType,
    path: &Path,
) -> Result<CreateBoundsResult, StitchError> {
    let center = Coordinate::new(parse_latitude(lat)?, parse_longitude(lon)?)?;
    ShapeFile::new(bounds_type, center).write(path)?;
    info!(path = %path.display(), %center, "wrote shape file");
    Ok(CreateBoundsResult {
        path: path.display().to_string(),
        bounds_type,
        center,
    })
}

pub struct App<C: CatalogClient, F: Fetcher, S: Sleeper = ThreadSleeper> {
    config: ResolvedConfig,
    catalog: C,
    fetcher: F,
    sleeper: S,
}

impl<C: CatalogClient, F: Fetcher> App<C, F, ThreadSleeper> {
    pub fn new(config: ResolvedConfig, catalog: C, fetcher: F) -> Self {
        Self::with_sleeper(config, catalog, fetcher, ThreadSleeper)
    }
}

impl<C: CatalogClient, F: Fetcher, S: Sleeper> App<C, F, S> {
    pub fn with_sleeper(config: ResolvedConfig, catalog: C, fetcher: F, sleeper: S) -> Self {
        Self {
            config,
            catalog,
            fetcher,
            sleeper,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut C {
        &mut self.catalog
    }

    /// Region, aerial dataset, scene search, overlap reduction, then download.
    pub fn gather_ortho(
        &self,
        shape_path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<GatherResult, StitchError> {
        let start = Instant::now();
        let step = |message: String| {
            sink.event(ProgressEvent {
                message,
                elapsed_ms: Some(start.elapsed().as_millis()),
            })
        };

        let shape = ShapeFile::read(shape_path)?;
        let region = shape.total_region(self.config.radius_miles)?;
        step(format!(
            "region {} to {}",
            region.lower_left, region.upper_right
        ));

        let dataset = find_aerial_dataset(&self.catalog, &region, &self.config.dataset_name)?;
        step(format!("dataset {}", dataset.dataset_alias));

        let scenes =
            self.catalog
                .scene_search(&dataset.dataset_alias, &region, self.config.max_results)?;
        let candidates = candidates_from_scenes(&dataset.dataset_alias, &scenes);
        step(format!(
            "{} scenes, {} usable footprints",
            scenes.len(),
            candidates.len()
        ));

        let candidate_count = candidates.len();
        let kept = deduplicate(
            candidates,
            self.config.overlap_threshold,
            self.config.selection,
        )?;
        info!(
            candidates = candidate_count,
            kept = kept.len(),
            threshold = self.config.overlap_threshold,
            selection = %self.config.selection,
            "reduced overlapping tiles"
        );
        step(format!("{} of {} tiles kept", kept.len(), candidate_count));

        let orchestrator = AcquisitionOrchestrator::new(
            &self.catalog,
            &self.fetcher,
            &self.sleeper,
            SidecarStore::new(self.config.download_dir.clone()),
            self.config.orchestrator_options(),
        );
        let report = orchestrator.acquire(&kept)?;
        step(format!(
            "{} downloaded, {} already present, {} failed",
            report.succeeded.len(),
            report.skipped.len(),
            report.failed.len()
        ));

        Ok(GatherResult {
            region,
            dataset_alias: dataset.dataset_alias,
            scenes: scenes.len(),
            candidates: candidate_count,
            kept: kept.len(),
            download_dir: self.config.download_dir.to_string(),
            report,
        })
    }
}
