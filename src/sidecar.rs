use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::Footprint;
use crate::error::StitchError;
use crate::fetch::safe_name;

/// Per-tile metadata written next to the payload once it is on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRecord {
    pub bounds: Footprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_file_name: Option<String>,
}

impl SidecarRecord {
    pub fn completed(bounds: Footprint, image_file_name: impl Into<String>) -> Self {
        Self {
            bounds,
            image_file_name: Some(image_file_name.into()),
        }
    }
}

/// Host plus path (and query) of `url` with separators flattened, suffixed `.txt`.
pub fn sidecar_file_name(url: &str) -> String {
    let flattened = match Url::parse(url) {
        Ok(parsed) => {
            let mut name = format!("{}{}", parsed.host_str().unwrap_or_default(), parsed.path());
            if let Some(query) = parsed.query() {
                name.push('?');
                name.push_str(query);
            }
            name
        }
        Err(_) => url
            .split_once("://")
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| url.to_string()),
    };
    let sanitized: String = flattened
        .trim_end_matches('/')
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("{sanitized}.txt")
}

#[derive(Debug, Clone)]
pub struct SidecarStore {
    root: Utf8PathBuf,
}

impl SidecarStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), StitchError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| StitchError::Filesystem(err.to_string()))
    }

    pub fn sidecar_path(&self, url: &str) -> Utf8PathBuf {
        self.root.join(sidecar_file_name(url))
    }

    pub fn payload_path(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(file_name)
    }

    pub fn read(&self, path: &Utf8Path) -> Result<Option<SidecarRecord>, StitchError> {
        if !path.as_std_path().is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| StitchError::Filesystem(format!("read {path}: {err}")))?;
        let record = serde_json::from_str(&content)
            .map_err(|err| StitchError::Filesystem(format!("parse {path}: {err}")))?;
        Ok(Some(record))
    }

    /// A sidecar with a populated file name whose payload exists marks the tile done.
    pub fn is_complete(&self, path: &Utf8Path) -> bool {
        match self.read(path) {
            Ok(Some(SidecarRecord {
                image_file_name: Some(name),
                ..
            })) if is_bare_name(&name) => self.payload_path(&name).as_std_path().is_file(),
            Ok(_) => false,
            Err(err) => {
                warn!(%path, %err, "ignoring unreadable sidecar");
                false
            }
        }
    }

    /// Written through a temp file in the same directory so readers never see a partial record.
    pub fn write(&self, path: &Utf8Path, record: &SidecarRecord) -> Result<(), StitchError> {
        let parent = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| StitchError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(record)
            .map_err(|err| StitchError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".sidecar")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| StitchError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| StitchError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| StitchError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Recorded names are trusted only when they stay inside the download directory.
fn is_bare_name(name: &str) -> bool {
    safe_name(name).as_deref() == Some(name)
}
