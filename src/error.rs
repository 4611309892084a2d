//! Error types for rota
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad period, bad bounds, unknown id, bad config)
//! - 3: Blocked (conflict, authorization, state, not enough eligible members)
//! - 4: Operation failed (io, lock, serialization)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the rota CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for rota operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Blocked (exit code 3)
    #[error(
        "Insufficient eligible members for '{template}' in {period}: need {required}, found {available}"
    )]
    Ineligible {
        template: String,
        period: String,
        required: usize,
        available: usize,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Invalid state: {0}")]
    State(String),

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

/// Coarse classification used by callers that branch on failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Config,
    Ineligibility,
    Conflict,
    Authorization,
    State,
    Operation,
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InvalidConfig(_) => ErrorKind::Config,
            Error::Ineligible { .. } => ErrorKind::Ineligibility,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Authorization(_) => ErrorKind::Authorization,
            Error::State(_) => ErrorKind::State,
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_) => ErrorKind::Operation,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Config => {
                exit_codes::USER_ERROR
            }
            ErrorKind::Ineligibility
            | ErrorKind::Conflict
            | ErrorKind::Authorization
            | ErrorKind::State => exit_codes::BLOCKED,
            ErrorKind::Operation => exit_codes::OPERATION_FAILED,
        }
    }

    /// Only infrastructure failures are worth retrying; domain refusals
    /// describe something that has already been decided.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockFailed(_) | Error::Io(_))
    }

    /// Structured details for machine output, when the variant carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::Ineligible {
                template,
                period,
                required,
                available,
            } => Some(serde_json::json!({
                "template": template,
                "period": period,
                "required": required,
                "available": available,
            })),
            Error::NotFound { kind, id } => Some(serde_json::json!({
                "kind": kind,
                "id": id,
            })),
            _ => None,
        }
    }
}

/// Result type alias for rota operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub kind: ErrorKind,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            kind: err.kind(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
