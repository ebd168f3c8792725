use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::area::DEFAULT_RADIUS_MILES;
use crate::catalog::DEFAULT_SERVICE_URL;
use crate::dedup::{DEFAULT_OVERLAP_THRESHOLD, validate_threshold};
use crate::domain::SelectionPolicy;
use crate::error::StitchError;
use crate::orchestrator::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT,
    DEFAULT_POLL_INTERVAL, OrchestratorOptions,
};
use crate::ortho::{DEFAULT_DATASET_NAME, DEFAULT_MAX_RESULTS};

pub const DEFAULT_CONFIG_FILE: &str = "terrain-stitcher.json";
pub const DEFAULT_DOWNLOAD_DIR: &str = "tmpDownloads";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const USERNAME_ENV: &str = "USGS_USERNAME";
pub const TOKEN_ENV: &str = "USGS_APPLICATION_KEY";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default)]
    pub overlap_threshold: Option<f64>,
    #[serde(default)]
    pub selection: Option<SelectionPolicy>,
    #[serde(default)]
    pub radius_miles: Option<f64>,
    #[serde(default)]
    pub max_results: Option<u32>,
    #[serde(default)]
    pub max_concurrent_downloads: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,
    #[serde(default)]
    pub max_poll_iterations: Option<u32>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub service_url: String,
    pub dataset_name: String,
    pub download_dir: Utf8PathBuf,
    pub overlap_threshold: f64,
    pub selection: SelectionPolicy,
    pub radius_miles: f64,
    pub max_results: u32,
    pub max_concurrent_downloads: usize,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub max_poll_iterations: Option<u32>,
    pub request_timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl ResolvedConfig {
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            max_concurrent: self.max_concurrent_downloads,
            max_attempts: self.max_attempts,
            poll_interval: self.poll_interval,
            heartbeat_interval: self.heartbeat_interval,
            max_poll_iterations: self.max_poll_iterations,
            label: None,
        }
    }

    pub fn credentials(&self) -> Result<&Credentials, StitchError> {
        self.credentials.as_ref().ok_or(StitchError::MissingCredentials)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or the default file when present; environment credentials win.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, StitchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| StitchError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| StitchError::ConfigParse(err.to_string()))?
        };

        let env_username = std::env::var(USERNAME_ENV).ok();
        let env_token = std::env::var(TOKEN_ENV).ok();
        Self::resolve_config(config, env_username, env_token)
    }

    pub fn resolve_config(
        config: Config,
        env_username: Option<String>,
        env_token: Option<String>,
    ) -> Result<ResolvedConfig, StitchError> {
        let overlap_threshold =
            validate_threshold(config.overlap_threshold.unwrap_or(DEFAULT_OVERLAP_THRESHOLD))?;

        let max_concurrent_downloads = config
            .max_concurrent_downloads
            .unwrap_or(DEFAULT_MAX_CONCURRENT);
        if max_concurrent_downloads == 0 {
            return Err(StitchError::ConfigValue(
                "maxConcurrentDownloads must be at least 1".to_string(),
            ));
        }
        let max_attempts = config.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(StitchError::ConfigValue(
                "maxAttempts must be at least 1".to_string(),
            ));
        }
        let radius_miles = config.radius_miles.unwrap_or(DEFAULT_RADIUS_MILES);
        if !radius_miles.is_finite() || radius_miles <= 0.0 {
            return Err(StitchError::ConfigValue(format!(
                "radiusMiles must be positive, got {radius_miles}"
            )));
        }

        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        let username = non_empty(env_username).or_else(|| non_empty(config.username));
        let token = non_empty(env_token).or_else(|| non_empty(config.token));
        let credentials = match (username, token) {
            (Some(username), Some(token)) => Some(Credentials { username, token }),
            _ => None,
        };

        Ok(ResolvedConfig {
            service_url: config
                .service_url
                .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string()),
            dataset_name: config
                .dataset_name
                .unwrap_or_else(|| DEFAULT_DATASET_NAME.to_string()),
            download_dir: Utf8PathBuf::from(
                config
                    .download_dir
                    .unwrap_or_else(|| DEFAULT_DOWNLOAD_DIR.to_string()),
            ),
            overlap_threshold,
            selection: config.selection.unwrap_or_default(),
            radius_miles,
            max_results: config.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            max_concurrent_downloads,
            max_attempts,
            poll_interval: config
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            heartbeat_interval: config
                .heartbeat_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
            max_poll_iterations: config.max_poll_iterations,
            request_timeout: config
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default(), None, None).unwrap();
        assert_eq!(resolved.dataset_name, "high_res_ortho");
        assert_eq!(resolved.download_dir, Utf8PathBuf::from("tmpDownloads"));
        assert_eq!(resolved.overlap_threshold, 0.3);
        assert_eq!(resolved.selection, SelectionPolicy::MinIndex);
        assert_eq!(resolved.max_concurrent_downloads, 5);
        assert_eq!(resolved.max_attempts, 5);
        assert_eq!(resolved.poll_interval, Duration::from_secs(30));
        assert!(resolved.max_poll_iterations.is_none());
        assert_matches!(resolved.credentials(), Err(StitchError::MissingCredentials));
    }

    #[test]
    fn environment_overrides_file_credentials() {
        let config = Config {
            username: Some("file-user".to_string()),
            token: Some("file-token".to_string()),
            ..Config::default()
        };
        let resolved =
            ConfigLoader::resolve_config(config, Some("env-user".to_string()), None).unwrap();
        let credentials = resolved.credentials().unwrap();
        assert_eq!(credentials.username, "env-user");
        assert_eq!(credentials.token, "file-token");
        assert!(!format!("{credentials:?}").contains("file-token"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = Config {
            max_concurrent_downloads: Some(0),
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config, None, None),
            Err(StitchError::ConfigValue(_))
        );
    }
}
