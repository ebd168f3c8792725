use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use camino::Utf8Path;
use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap, HeaderValue, USER_AGENT};

use crate::error::StitchError;

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"filename="?([^";]+)"?"#).expect("valid filename regex"));

/// Fetches one payload into a directory and reports the file name it was stored under.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, destination_dir: &Utf8Path) -> Result<String, StitchError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, StitchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("terrain-stitcher/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| StitchError::Download(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| StitchError::Download(err.to_string()))?;
        Ok(Self { client })
    }

    fn write_response_to_dir(
        &self,
        mut response: reqwest::blocking::Response,
        url: &str,
        destination_dir: &Utf8Path,
    ) -> Result<String, StitchError> {
        if !response.status().is_success() {
            return Err(StitchError::DownloadStatus {
                status: response.status().as_u16(),
            });
        }
        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let file_name = disposition
            .as_deref()
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(url))
            .ok_or_else(|| StitchError::Download(format!("no file name for {url}")))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".payload")
            .tempfile_in(destination_dir.as_std_path())
            .map_err(|err| StitchError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut temp)
            .map_err(|err| StitchError::Download(err.to_string()))?;
        temp.persist(destination_dir.join(&file_name).as_std_path())
            .map_err(|err| StitchError::Filesystem(err.to_string()))?;
        Ok(file_name)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination_dir: &Utf8Path) -> Result<String, StitchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| StitchError::Download(err.to_string()))?;
        self.write_response_to_dir(response, url, destination_dir)
    }
}

/// Only the final path component is kept so a hostile header cannot escape the directory.
pub(crate) fn safe_name(raw: &str) -> Option<String> {
    let name = Path::new(raw.trim()).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

pub fn filename_from_disposition(disposition: &str) -> Option<String> {
    let captures = FILENAME_RE.captures(disposition)?;
    safe_name(captures.get(1)?.as_str())
}

pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    safe_name(segment)
}
