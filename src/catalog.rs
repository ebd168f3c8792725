use std::collections::HashSet;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::domain::BoundingBox;
use crate::error::StitchError;

pub const DEFAULT_SERVICE_URL: &str = "https://m2m.cr.usgs.gov/api/api/json/stable/";
const AUTH_HEADER: &str = "X-Auth-Token";

/// Request/response channel to the remote scene catalog.
///
/// Implementors only provide [`CatalogClient::submit`]; the typed operations
/// are built on top of it.
pub trait CatalogClient: Send + Sync {
    fn submit(&self, endpoint: &str, payload: Value) -> Result<Value, StitchError>;

    fn dataset_search(
        &self,
        region: &BoundingBox,
        dataset_name: Option<&str>,
    ) -> Result<Vec<DatasetInfo>, StitchError> {
        let mut payload = json!({ "spatialFilter": mbr_filter(region) });
        if let Some(name) = dataset_name {
            payload["datasetName"] = Value::String(name.to_string());
        }
        decode("dataset-search", self.submit("dataset-search", payload)?)
    }

    fn scene_search(
        &self,
        dataset_alias: &str,
        region: &BoundingBox,
        max_results: u32,
    ) -> Result<Vec<SceneRecord>, StitchError> {
        let payload = json!({
            "datasetName": dataset_alias,
            "maxResults": max_results,
            "sceneFilter": { "spatialFilter": mbr_filter(region) },
        });
        let result: SceneSearchResult =
            decode("scene-search", self.submit("scene-search", payload)?)?;
        Ok(result.results)
    }

    fn download_options(
        &self,
        dataset_name: &str,
        entity_ids: &[String],
    ) -> Result<Vec<DownloadOption>, StitchError> {
        let payload = json!({ "datasetName": dataset_name, "entityIds": entity_ids });
        decode("download-options", self.submit("download-options", payload)?)
    }

    fn download_request(
        &self,
        downloads: &[DownloadSelection],
        label: &str,
    ) -> Result<DownloadRequestResult, StitchError> {
        let payload = json!({ "downloads": downloads, "label": label });
        decode("download-request", self.submit("download-request", payload)?)
    }

    fn download_retrieve(&self, label: &str) -> Result<RetrieveResult, StitchError> {
        let payload = json!({ "label": label });
        decode("download-retrieve", self.submit("download-retrieve", payload)?)
    }
}

pub fn mbr_filter(region: &BoundingBox) -> Value {
    json!({
        "filterType": "mbr",
        "lowerLeft": {
            "latitude": region.lower_left.lat(),
            "longitude": region.lower_left.lon(),
        },
        "upperRight": {
            "latitude": region.upper_right.lat(),
            "longitude": region.upper_right.lon(),
        },
    })
}

fn decode<T: DeserializeOwned>(endpoint: &str, data: Value) -> Result<T, StitchError> {
    serde_json::from_value(data).map_err(|err| StitchError::CatalogResponse {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Catalog ids arrive as JSON numbers or strings depending on the endpoint.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Ids from a list of ids, a list of objects carrying `downloadId`, or an object keyed by id.
fn id_set(value: &Value) -> HashSet<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => map.get("downloadId").and_then(id_string),
                other => id_string(other),
            })
            .collect(),
        Value::Object(map) => map.keys().cloned().collect(),
        _ => HashSet::new(),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub dataset_alias: String,
    #[serde(default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub keywords: Value,
}

impl DatasetInfo {
    pub fn has_keyword(&self, keyword: &str) -> bool {
        match &self.keywords {
            Value::String(text) => text.contains(keyword),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .any(|item| item.contains(keyword)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SceneSearchResult {
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<SceneRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRecord {
    pub entity_id: String,
    #[serde(default)]
    pub display_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Vec<MetadataField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataField {
    pub field_name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOption {
    pub entity_id: String,
    #[serde(rename = "id", default)]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSelection {
    pub entity_id: String,
    pub product_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDownload {
    #[serde(default)]
    pub download_id: Value,
    pub entity_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl RemoteDownload {
    pub fn download_id(&self) -> Option<String> {
        id_string(&self.download_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequestResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub available_downloads: Vec<RemoteDownload>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub preparing_downloads: Vec<RemoteDownload>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed: Vec<Value>,
    #[serde(default)]
    pub new_records: Value,
    #[serde(default)]
    pub duplicate_products: Value,
}

impl DownloadRequestResult {
    /// Download ids the batch owns: new records plus duplicates of earlier orders.
    pub fn tracked_ids(&self) -> HashSet<String> {
        let mut ids = id_set(&self.new_records);
        ids.extend(id_set(&self.duplicate_products));
        ids
    }

    pub fn needs_preparation(&self) -> bool {
        !self.preparing_downloads.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub available: Vec<RemoteDownload>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requested: Vec<RemoteDownload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    request_id: Value,
    #[serde(default)]
    data: Value,
}

/// Unwrap the `{errorCode, errorMessage, requestId, data}` envelope.
pub fn decode_envelope(
    endpoint: &str,
    status: u16,
    body: &str,
) -> Result<Value, StitchError> {
    let success = (200..300).contains(&status);
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(err) if success => {
            return Err(StitchError::CatalogResponse {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            });
        }
        Err(_) => {
            return Err(StitchError::CatalogStatus {
                status,
                message: body.chars().take(200).collect(),
            });
        }
    };

    if let Some(code) = envelope.error_code {
        warn!(endpoint, request_id = %envelope.request_id, %code, "catalog request failed");
        return Err(StitchError::Remote {
            code,
            message: envelope.error_message.unwrap_or_default(),
        });
    }
    if !success {
        return Err(StitchError::CatalogStatus {
            status,
            message: envelope
                .error_message
                .unwrap_or_else(|| "catalog request failed".to_string()),
        });
    }
    debug!(endpoint, request_id = %envelope.request_id, "catalog request finished");
    Ok(envelope.data)
}

/// Blocking client for the USGS machine-to-machine API.
pub struct M2mHttpClient {
    client: Client,
    service_url: String,
    api_key: Option<String>,
}

impl M2mHttpClient {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, StitchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("terrain-stitcher/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| StitchError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| StitchError::CatalogHttp(err.to_string()))?;
        let mut service_url = service_url.to_string();
        if !service_url.ends_with('/') {
            service_url.push('/');
        }
        Ok(Self {
            client,
            service_url,
            api_key: None,
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn login(&mut self, username: &str, token: &str) -> Result<(), StitchError> {
        info!(username, "logging in to catalog");
        let data = self.post(
            "login-token",
            json!({ "username": username, "token": token }),
            None,
        )?;
        let key = data
            .as_str()
            .ok_or_else(|| StitchError::CatalogResponse {
                endpoint: "login-token".to_string(),
                message: "expected an API key string".to_string(),
            })?;
        self.api_key = Some(key.to_string());
        info!("catalog login successful");
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), StitchError> {
        let Some(key) = self.api_key.take() else {
            return Ok(());
        };
        self.post("logout", Value::Null, Some(&key))?;
        info!("logged out of catalog");
        Ok(())
    }

    fn post(&self, endpoint: &str, payload: Value, api_key: Option<&str>) -> Result<Value, StitchError> {
        let url = format!("{}{}", self.service_url, endpoint);
        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = api_key {
            request = request.header(AUTH_HEADER, key);
        }
        let response = request
            .send()
            .map_err(|err| StitchError::CatalogHttp(format!("{endpoint}: {err}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| StitchError::CatalogHttp(format!("{endpoint}: {err}")))?;
        decode_envelope(endpoint, status, &body)
    }
}

impl CatalogClient for M2mHttpClient {
    fn submit(&self, endpoint: &str, payload: Value) -> Result<Value, StitchError> {
        let key = self.api_key.as_deref().ok_or(StitchError::NotLoggedIn)?;
        self.post(endpoint, payload, Some(key))
    }
}
