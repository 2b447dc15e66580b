/// Wire protocol for the PlayOn Cloud REST API.
///
/// Every endpoint answers with a JSON envelope carrying a boolean `success`
/// flag and a `data` payload. A `false` flag is a protocol failure; the whole
/// envelope is kept so it can be printed for diagnosis.
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::errors::PlayOnError;
use crate::models::{DownloadDescriptor, LibraryItem};

/// Default API root.
pub const DEFAULT_API_BASE: &str = "https://api.playonrecorder.com/v3";

/// Top-level fields of a response envelope.
pub type ResponseFields = serde_json::Map<String, serde_json::Value>;

/// The three calls this tool makes against the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    Login,
    ListLibrary,
    ResolveDownload,
}

impl std::fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiOperation::Login => write!(f, "log in"),
            ApiOperation::ListLibrary => write!(f, "retrieve the download list"),
            ApiOperation::ResolveDownload => write!(f, "retrieve the download info"),
        }
    }
}

// ====== PAYLOADS ======

/// `data` of a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    pub token: String,
}

/// `data` of a successful library listing.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryData {
    #[serde(default)]
    pub entries: Vec<LibraryItem>,
}

/// `data` of a successful download resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadData {
    pub url: String,
    /// Signed cookie set required by the media host.
    #[serde(default, rename = "data")]
    pub cookies: BTreeMap<String, serde_json::Value>,
}

impl From<DownloadData> for DownloadDescriptor {
    fn from(data: DownloadData) -> Self {
        let cookies = data
            .cookies
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();
        DownloadDescriptor {
            url: data.url,
            cookies,
        }
    }
}

// ====== ENVELOPE ======

/// Parsed response envelope.
#[derive(Debug, Clone)]
pub struct ApiEnvelope {
    pub success: bool,
    pub fields: ResponseFields,
}

impl ApiEnvelope {
    /// Parse a raw response body. A body that is not a JSON object, or that
    /// lacks a boolean `success` flag, is malformed.
    pub fn parse(operation: ApiOperation, body: &str) -> Result<Self, PlayOnError> {
        let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            PlayOnError::MalformedResponse {
                operation,
                reason: format!("invalid JSON: {}", e),
            }
        })?;

        let fields = match value {
            serde_json::Value::Object(map) => map,
            _ => {
                return Err(PlayOnError::MalformedResponse {
                    operation,
                    reason: "response is not a JSON object".to_string(),
                })
            }
        };

        let success = fields
            .get("success")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| PlayOnError::MalformedResponse {
                operation,
                reason: "missing `success` flag".to_string(),
            })?;

        Ok(Self { success, fields })
    }

    /// Turn a `success: false` envelope into the matching error.
    pub fn ensure_success(self, operation: ApiOperation) -> Result<Self, PlayOnError> {
        if self.success {
            return Ok(self);
        }
        Err(match operation {
            ApiOperation::Login => PlayOnError::Authentication {
                fields: self.fields,
            },
            _ => PlayOnError::Protocol {
                operation,
                fields: self.fields,
            },
        })
    }

    /// Decode the `data` payload into a typed value.
    pub fn data<T: DeserializeOwned>(&self, operation: ApiOperation) -> Result<T, PlayOnError> {
        let data = self
            .fields
            .get("data")
            .cloned()
            .ok_or_else(|| PlayOnError::MalformedResponse {
                operation,
                reason: "missing `data` payload".to_string(),
            })?;

        serde_json::from_value(data).map_err(|e| PlayOnError::MalformedResponse {
            operation,
            reason: e.to_string(),
        })
    }
}

/// Parse, check and decode a response body in one step.
pub fn decode_response<T: DeserializeOwned>(
    operation: ApiOperation,
    body: &str,
) -> Result<T, PlayOnError> {
    ApiEnvelope::parse(operation, body)?
        .ensure_success(operation)?
        .data(operation)
}

/// Format envelope fields as `key : value` lines.
pub fn describe_fields(fields: &ResponseFields) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{} : {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

// ====== ENDPOINTS ======

/// Current wall-clock time in milliseconds, used to defeat intermediary caches.
pub fn cache_buster() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Login endpoint.
pub fn login_url(base: &str) -> String {
    format!("{}/login", base.trim_end_matches('/'))
}

/// Full library listing endpoint.
pub fn library_url(base: &str, timestamp: i64) -> String {
    format!("{}/library/all?_={}", base.trim_end_matches('/'), timestamp)
}

/// Per-item download resolution endpoint.
pub fn download_url(base: &str, item_id: &str, timestamp: i64) -> String {
    format!(
        "{}/library/{}/download?_={}",
        base.trim_end_matches('/'),
        item_id,
        timestamp
    )
}
