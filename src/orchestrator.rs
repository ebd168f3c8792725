//! Two-phase catalog ordering and resumable, bounded-concurrency downloads.
//!
//! One coordinating thread drives `download-options`, `download-request` and
//! `download-retrieve` (polling until every tracked entity has a URL) while a
//! fixed set of scoped worker threads fetch payloads. A task whose sidecar
//! already names a payload on disk is never queued again.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, DownloadSelection, RemoteDownload};
use crate::domain::{Candidate, Footprint};
use crate::error::StitchError;
use crate::fetch::Fetcher;
use crate::pool::{CloseOnDrop, WorkQueue};
use crate::sidecar::{SidecarRecord, SidecarStore};

pub const MAX_BATCH_ENTITIES: usize = 50_000;
pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Blocking pause used between `download-retrieve` polls.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// `None` polls until the catalog has prepared every download.
    pub max_poll_iterations: Option<u32>,
    /// Batch label; a timestamp is used when unset.
    pub label: Option<String>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_poll_iterations: None,
            label: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Downloading,
    Retrying,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub entity_id: String,
    pub dataset_name: String,
    pub footprint: Footprint,
    pub url: Option<String>,
    pub attempts: u32,
    pub sidecar_path: Utf8PathBuf,
    pub state: TaskState,
}

impl DownloadTask {
    pub fn new(candidate: &Candidate, url: Option<String>, sidecar_path: Utf8PathBuf) -> Self {
        Self {
            entity_id: candidate.record_id.clone(),
            dataset_name: candidate.dataset_name.clone(),
            footprint: candidate.footprint,
            url,
            attempts: 0,
            sidecar_path,
            state: TaskState::Queued,
        }
    }

    fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.state = TaskState::Downloading;
    }

    /// Moves to `Retrying` while attempts remain, otherwise to terminal `Failed`.
    fn record_failure(&mut self, max_attempts: u32) -> TaskState {
        self.state = if self.attempts < max_attempts {
            TaskState::Retrying
        } else {
            TaskState::Failed
        };
        self.state
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedDownload {
    pub entity_id: String,
    pub file_name: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDownload {
    pub entity_id: String,
    pub url: Option<String>,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionReport {
    pub label: Option<String>,
    pub requested: usize,
    pub unavailable: Vec<String>,
    pub remote_failed: usize,
    pub queued: usize,
    pub skipped: Vec<String>,
    pub poll_iterations: u32,
    pub succeeded: Vec<CompletedDownload>,
    pub failed: Vec<FailedDownload>,
}

#[derive(Default)]
struct BatchOutcome {
    succeeded: Vec<CompletedDownload>,
    failed: Vec<FailedDownload>,
}

/// Coordinator-side bookkeeping for one order.
struct OrderProgress<'c> {
    entities: HashMap<&'c str, &'c Candidate>,
    ready: HashSet<String>,
    handled: HashSet<&'c str>,
    queued: usize,
    skipped: Vec<String>,
    poll_iterations: u32,
    remote_failed: usize,
}

pub struct AcquisitionOrchestrator<'a, C: ?Sized, F: ?Sized, S: ?Sized> {
    catalog: &'a C,
    fetcher: &'a F,
    sleeper: &'a S,
    sidecars: SidecarStore,
    options: OrchestratorOptions,
}

impl<'a, C, F, S> AcquisitionOrchestrator<'a, C, F, S>
where
    C: CatalogClient + ?Sized,
    F: Fetcher + ?Sized,
    S: Sleeper + ?Sized,
{
    pub fn new(
        catalog: &'a C,
        fetcher: &'a F,
        sleeper: &'a S,
        sidecars: SidecarStore,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            sleeper,
            sidecars,
            options,
        }
    }

    /// Order and download every candidate; per-task failures are reported, not raised.
    pub fn acquire(&self, candidates: &[Candidate]) -> Result<AcquisitionReport, StitchError> {
        if candidates.len() > MAX_BATCH_ENTITIES {
            return Err(StitchError::BatchTooLarge {
                count: candidates.len(),
                max: MAX_BATCH_ENTITIES,
            });
        }
        let mut report = AcquisitionReport {
            requested: candidates.len(),
            ..AcquisitionReport::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let mut by_dataset: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for candidate in candidates {
            by_dataset
                .entry(candidate.dataset_name.as_str())
                .or_default()
                .push(candidate.record_id.clone());
        }

        let mut selections = Vec::new();
        for (dataset_name, entity_ids) in by_dataset {
            info!(dataset_name, entities = entity_ids.len(), "gathering available products");
            let options = self.catalog.download_options(dataset_name, &entity_ids)?;
            let mut offered = HashSet::new();
            for option in options {
                match option.product_id {
                    Some(product_id) if option.available => {
                        if offered.insert(option.entity_id.clone()) {
                            selections.push(DownloadSelection {
                                entity_id: option.entity_id,
                                product_id,
                            });
                        }
                    }
                    _ => {}
                }
            }
            report.unavailable.extend(
                entity_ids
                    .into_iter()
                    .filter(|entity_id| !offered.contains(entity_id)),
            );
        }

        if selections.is_empty() {
            info!("no downloadable products offered");
            return Ok(report);
        }
        self.run_batch(&selections, candidates, report)
    }

    fn run_batch(
        &self,
        selections: &[DownloadSelection],
        candidates: &[Candidate],
        mut report: AcquisitionReport,
    ) -> Result<AcquisitionReport, StitchError> {
        self.sidecars.ensure_root()?;
        let label = self
            .options
            .label
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d_%H%M%S").to_string());
        report.label = Some(label.clone());

        let mut progress = OrderProgress {
            entities: candidates
                .iter()
                .map(|candidate| (candidate.record_id.as_str(), candidate))
                .collect(),
            ready: HashSet::new(),
            handled: HashSet::new(),
            queued: 0,
            skipped: Vec::new(),
            poll_iterations: 0,
            remote_failed: 0,
        };
        let queue = WorkQueue::new();
        let outcome = Mutex::new(BatchOutcome::default());
        let workers = self.options.max_concurrent.max(1);

        let ordered = thread::scope(|scope| {
            let _close = CloseOnDrop(&queue);
            for _ in 0..workers {
                scope.spawn(|| self.work(&queue, &outcome));
            }
            let ordered = self.drive_order(selections, &label, &queue, &mut progress);
            if ordered.is_ok() {
                info!("downloading files");
                queue.wait_idle(self.options.heartbeat_interval, |remaining| {
                    info!(remaining, "download heartbeat");
                });
            }
            ordered
        });

        let outcome = outcome.into_inner().unwrap_or_else(PoisonError::into_inner);
        ordered?;

        report.queued = progress.queued;
        report.skipped = progress.skipped;
        report.poll_iterations = progress.poll_iterations;
        report.remote_failed = progress.remote_failed;
        report.succeeded = outcome.succeeded;
        report.failed = outcome.failed;
        info!(
            succeeded = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "download complete"
        );
        Ok(report)
    }

    fn drive_order(
        &self,
        selections: &[DownloadSelection],
        label: &str,
        queue: &WorkQueue<DownloadTask>,
        progress: &mut OrderProgress<'_>,
    ) -> Result<(), StitchError> {
        info!(label, entities = selections.len(), "requesting downloads");
        let request = self.catalog.download_request(selections, label)?;
        progress.remote_failed = request.failed.len();

        if !request.needs_preparation() {
            for download in &request.available_downloads {
                self.accept(download, None, queue, progress);
            }
            return Ok(());
        }

        let tracked = request.tracked_ids();
        let filter = (!tracked.is_empty()).then_some(&tracked);
        info!(
            preparing = request.preparing_downloads.len(),
            "downloads are being prepared"
        );
        let retrieved = self.catalog.download_retrieve(label)?;
        for download in retrieved.available.iter().chain(&retrieved.requested) {
            self.accept(download, filter, queue, progress);
        }

        let target = selections.len().saturating_sub(progress.remote_failed);
        while progress.ready.len() < target {
            if let Some(limit) = self.options.max_poll_iterations {
                if progress.poll_iterations >= limit {
                    return Err(StitchError::PollLimitExceeded {
                        iterations: progress.poll_iterations,
                    });
                }
            }
            info!(
                waiting = target - progress.ready.len(),
                interval_secs = self.options.poll_interval.as_secs(),
                "downloads not yet available"
            );
            self.sleeper.sleep(self.options.poll_interval);
            progress.poll_iterations += 1;
            let retrieved = self.catalog.download_retrieve(label)?;
            for download in &retrieved.available {
                self.accept(download, filter, queue, progress);
            }
        }
        Ok(())
    }

    /// Mark a URL-bearing download ready and queue it unless already complete on disk.
    fn accept(
        &self,
        download: &RemoteDownload,
        tracked: Option<&HashSet<String>>,
        queue: &WorkQueue<DownloadTask>,
        progress: &mut OrderProgress<'_>,
    ) {
        let download_id = download.download_id();
        // Tracked sets hold download ids; entries without one are matched by entity below.
        if let (Some(tracked), Some(id)) = (tracked, download_id.as_deref()) {
            if !tracked.contains(id) {
                return;
            }
        }
        let key = download_id
            .clone()
            .unwrap_or_else(|| download.entity_id.clone());
        if progress.ready.contains(&key) {
            return;
        }
        let Some(url) = download.url.as_deref() else {
            return;
        };
        let Some(candidate) = progress.entities.get(download.entity_id.as_str()).copied() else {
            warn!(entity_id = %download.entity_id, "catalog returned an entity that was not requested");
            return;
        };
        progress.ready.insert(key);
        if !progress.handled.insert(candidate.record_id.as_str()) {
            debug!(entity_id = %candidate.record_id, url, "entity already handled");
            return;
        }
        if download_id.is_none() {
            warn!(entity_id = %candidate.record_id, url, "download has no id, tracking it by entity");
        }

        let sidecar_path = self.sidecars.sidecar_path(url);
        if self.sidecars.is_complete(&sidecar_path) {
            info!(entity_id = %candidate.record_id, url, "skipping already downloaded file");
            progress.skipped.push(candidate.record_id.clone());
            return;
        }
        debug!(entity_id = %candidate.record_id, url, "queued download");
        queue.push(DownloadTask::new(candidate, Some(url.to_string()), sidecar_path));
        progress.queued += 1;
    }

    fn work(&self, queue: &WorkQueue<DownloadTask>, outcome: &Mutex<BatchOutcome>) {
        while let Some(mut task) = queue.next() {
            task.begin_attempt();
            info!(entity_id = %task.entity_id, attempt = task.attempts, url = task.url.as_deref(), "downloading");
            match self.download(&task) {
                Ok(file_name) => {
                    task.state = TaskState::Succeeded;
                    info!(entity_id = %task.entity_id, %file_name, attempt = task.attempts, "download done");
                    outcome
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .succeeded
                        .push(CompletedDownload {
                            entity_id: task.entity_id,
                            file_name,
                            attempts: task.attempts,
                        });
                }
                Err(err) => match task.record_failure(self.options.max_attempts) {
                    TaskState::Retrying => {
                        warn!(entity_id = %task.entity_id, attempt = task.attempts, url = task.url.as_deref(), %err, "download failed, will retry");
                        task.state = TaskState::Queued;
                        queue.push(task);
                    }
                    _ => {
                        warn!(entity_id = %task.entity_id, attempts = task.attempts, url = task.url.as_deref(), %err, "maximum attempts reached");
                        outcome
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .failed
                            .push(FailedDownload {
                                entity_id: task.entity_id,
                                url: task.url,
                                attempts: task.attempts,
                                error: err.to_string(),
                            });
                    }
                },
            }
            queue.finish();
        }
    }

    /// Payload first, sidecar second: the sidecar must never reference a missing file.
    fn download(&self, task: &DownloadTask) -> Result<String, StitchError> {
        let url = task
            .url
            .as_deref()
            .ok_or_else(|| StitchError::Download(format!("no url for {}", task.entity_id)))?;
        let file_name = self.fetcher.fetch(url, self.sidecars.root())?;
        self.sidecars.write(
            &task.sidecar_path,
            &SidecarRecord::completed(task.footprint, file_name.clone()),
        )?;
        Ok(file_name)
    }
}
