#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};

use terrain_stitcher::catalog::CatalogClient;
use terrain_stitcher::domain::{Candidate, Coordinate, Footprint};
use terrain_stitcher::error::StitchError;
use terrain_stitcher::fetch::Fetcher;
use terrain_stitcher::orchestrator::Sleeper;

pub fn square(south: f64, west: f64, size: f64) -> Footprint {
    Footprint::from_bounds(
        Coordinate::new(south, west).unwrap(),
        Coordinate::new(south + size, west + size).unwrap(),
    )
    .unwrap()
}

pub fn candidate(id: &str, footprint: Footprint) -> Candidate {
    Candidate::new(id, "high_res_ortho", footprint)
}

/// Candidates `E0..En` laid out on a grid so none overlap.
pub fn spread_candidates(count: usize) -> Vec<Candidate> {
    (0..count)
        .map(|i| candidate(&format!("E{i}"), square(0.0, i as f64 * 2.0, 1.0)))
        .collect()
}

pub fn download_url(entity_id: &str) -> String {
    format!("https://dds.example.test/download/{}.zip", entity_id.to_lowercase())
}

pub fn options_for(entity_ids: &[&str]) -> Value {
    Value::Array(
        entity_ids
            .iter()
            .enumerate()
            .map(|(i, id)| json!({ "entityId": id, "id": format!("P{i}"), "available": true }))
            .collect(),
    )
}

pub fn ready(download_id: u64, entity_id: &str) -> Value {
    json!({ "downloadId": download_id, "entityId": entity_id, "url": download_url(entity_id) })
}

pub fn pending(download_id: u64, entity_id: &str) -> Value {
    json!({ "downloadId": download_id, "entityId": entity_id, "url": null })
}

pub fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("downloads")).unwrap();
    (temp, root)
}

pub fn files_with_extension(root: &Utf8Path, extension: &str) -> usize {
    fs::read_dir(root.as_std_path())
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| {
                    entry.path().extension().and_then(|ext| ext.to_str()) == Some(extension)
                })
                .count()
        })
        .unwrap_or(0)
}

/// Scripted catalog: each endpoint answers from a queue whose last entry repeats.
#[derive(Default)]
pub struct MockCatalog {
    responses: Mutex<HashMap<String, VecDeque<Value>>>,
    failing: Mutex<Option<String>>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl MockCatalog {
    pub fn respond(self, endpoint: &str, data: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(data);
        self
    }

    pub fn fail_on(self, endpoint: &str) -> Self {
        *self.failing.lock().unwrap() = Some(endpoint.to_string());
        self
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == endpoint)
            .count()
    }

    pub fn payloads(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == endpoint)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl CatalogClient for MockCatalog {
    fn submit(&self, endpoint: &str, payload: Value) -> Result<Value, StitchError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), payload));
        if self.failing.lock().unwrap().as_deref() == Some(endpoint) {
            return Err(StitchError::Remote {
                code: "DOWNLOAD_ERROR".to_string(),
                message: format!("{endpoint} rejected"),
            });
        }
        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .get_mut(endpoint)
            .unwrap_or_else(|| panic!("unexpected call to {endpoint}"));
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().cloned().unwrap_or(Value::Null))
        }
    }
}

/// Writes a small payload per URL, failing the first `n` attempts where configured.
#[derive(Default)]
pub struct MockFetcher {
    failures: Mutex<HashMap<String, u32>>,
    delay: Duration,
    current: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing(self, url: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), times);
        self
    }

    pub fn attempts_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str, destination_dir: &Utf8Path) -> Result<String, StitchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let should_fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(url) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        self.current.fetch_sub(1, Ordering::SeqCst);
        if should_fail {
            return Err(StitchError::DownloadStatus { status: 503 });
        }
        let name = url.rsplit('/').next().unwrap().to_string();
        fs::write(destination_dir.join(&name).as_std_path(), b"tile").unwrap();
        Ok(name)
    }
}

#[derive(Default)]
pub struct MockSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl MockSleeper {
    pub fn count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

impl Sleeper for MockSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
