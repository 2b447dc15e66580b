/// Unified error types for PlayOn DL.
use thiserror::Error;

use crate::api_protocol::{describe_fields, ApiOperation, ResponseFields};

/// Top-level error type for a sync pass.
#[derive(Debug, Error)]
pub enum PlayOnError {
    #[error("Login rejected by the service")]
    Authentication { fields: ResponseFields },

    #[error("Service reported failure while trying to {operation}")]
    Protocol {
        operation: ApiOperation,
        fields: ResponseFields,
    },

    #[error("Unexpected response while trying to {operation}: {reason}")]
    MalformedResponse {
        operation: ApiOperation,
        reason: String,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transfer incomplete: expected {expected} bytes, received {received}")]
    TransferIncomplete { expected: u64, received: u64 },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlayOnError {
    /// Response fields returned by the service, when the error carries them.
    pub fn response_fields(&self) -> Option<&ResponseFields> {
        match self {
            PlayOnError::Authentication { fields } | PlayOnError::Protocol { fields, .. } => {
                Some(fields)
            }
            _ => None,
        }
    }

    /// Human-readable dump of the service response, one `key : value` per line.
    pub fn diagnostics(&self) -> Option<String> {
        self.response_fields().map(describe_fields)
    }
}

/// Errors raised by the download ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Could not open ledger at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Could not create ledger schema: {0}")]
    Schema(#[from] sqlx::migrate::MigrateError),

    #[error("Ledger query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Could not add \"{name}\" ({}): already recorded", display_year(.release_year))]
    DuplicateEntry {
        name: String,
        release_year: Option<String>,
    },

    #[error("Could not add \"{name}\" ({}): {source}", display_year(.release_year))]
    Write {
        name: String,
        release_year: Option<String>,
        #[source]
        source: sqlx::Error,
    },
}

fn display_year(year: &Option<String>) -> &str {
    year.as_deref().unwrap_or("None")
}

/// Result type alias for PlayOn DL operations.
pub type PlayOnResult<T> = Result<T, PlayOnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_names_identity() {
        let err = LedgerError::DuplicateEntry {
            name: "Show A".into(),
            release_year: Some("2020".into()),
        };
        assert_eq!(err.to_string(), "Could not add \"Show A\" (2020): already recorded");

        let err = LedgerError::DuplicateEntry {
            name: "Show B".into(),
            release_year: None,
        };
        assert!(err.to_string().contains("(None)"));
    }

    #[test]
    fn test_protocol_error_diagnostics() {
        let fields = serde_json::json!({"success": false, "message": "Expired"})
            .as_object()
            .cloned()
            .unwrap();
        let err = PlayOnError::Protocol {
            operation: ApiOperation::ListLibrary,
            fields,
        };
        let dump = err.diagnostics().unwrap();
        assert!(dump.contains("message : \"Expired\""));
        assert!(dump.contains("success : false"));
        assert!(PlayOnError::Config("x".into()).diagnostics().is_none());
    }
}
