use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StitchError {
    #[error("invalid latitude: {0} (expected -90..=90)")]
    InvalidLatitude(String),

    #[error("invalid longitude: {0} (expected -180..=180)")]
    InvalidLongitude(String),

    #[error("invalid footprint for {0}")]
    InvalidFootprint(String),

    #[error("invalid overlap threshold: {0} (expected 0..=1)")]
    InvalidThreshold(f64),

    #[error("batch of {count} entities exceeds the maximum of {max}")]
    BatchTooLarge { count: usize, max: usize },

    #[error("invalid bounds type: {0}")]
    InvalidBoundsType(String),

    #[error("invalid shape file {path}: {message}")]
    InvalidShape { path: PathBuf, message: String },

    #[error("invalid selection policy: {0}")]
    InvalidSelection(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigValue(String),

    #[error("missing catalog credentials (set USGS_USERNAME and USGS_APPLICATION_KEY)")]
    MissingCredentials,

    #[error("catalog session is not logged in")]
    NotLoggedIn,

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("catalog error {code}: {message}")]
    Remote { code: String, message: String },

    #[error("unexpected catalog response from {endpoint}: {message}")]
    CatalogResponse { endpoint: String, message: String },

    #[error("no aerial imagery dataset found for {0}")]
    NoAerialDataset(String),

    #[error("downloads still preparing after {iterations} poll iterations")]
    PollLimitExceeded { iterations: u32 },

    #[error("download failed: {0}")]
    Download(String),

    #[error("download returned status {status}")]
    DownloadStatus { status: u16 },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl StitchError {
    /// Errors raised before any network call; never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StitchError::InvalidLatitude(_)
                | StitchError::InvalidLongitude(_)
                | StitchError::InvalidFootprint(_)
                | StitchError::InvalidThreshold(_)
                | StitchError::BatchTooLarge { .. }
                | StitchError::InvalidBoundsType(_)
                | StitchError::InvalidShape { .. }
                | StitchError::InvalidSelection(_)
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            StitchError::NotLoggedIn
                | StitchError::CatalogHttp(_)
                | StitchError::CatalogStatus { .. }
                | StitchError::Remote { .. }
                | StitchError::CatalogResponse { .. }
                | StitchError::NoAerialDataset(_)
                | StitchError::PollLimitExceeded { .. }
        )
    }
}
