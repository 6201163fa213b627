// errors.rs — Tagged error taxonomy for every inbound operation.
//
// Each variant maps to one HTTP status. Handlers convert with
// `ApiError::response(dev_mode)`; internal detail (the full error chain) is
// only attached when the service runs with `dev_mode = true`.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

/// Field name → human-readable violation. Validation never fails fast: the
/// map carries every bad field so the caller can fix them in one round trip.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, or expired credential (401).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Authenticated but not permitted to perform this action (403).
    #[error("access denied: {0}")]
    Authorization(String),

    /// Payload shape or content violates the per-operation rules (400).
    #[error("validation failed for {} field(s)", details.len())]
    Validation { details: FieldErrors },

    /// A referenced entity does not exist (404).
    #[error("{0} not found")]
    NotFound(String),

    /// The action is not allowed in the entity's current state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The document store, object store, or a third-party call failed (500).
    /// Never trusted to have partially succeeded.
    #[error("external service failure: {0}")]
    External(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::External(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable, safe message for the response body. Raw error chains from the
    /// stores never leak here.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Authentication(msg) => msg.clone(),
            ApiError::Authorization(msg) => msg.clone(),
            ApiError::Validation { .. } => "Validation failed".to_string(),
            ApiError::NotFound(what) => format!("{what} not found"),
            ApiError::Conflict(msg) => msg.clone(),
            ApiError::External(_) => "Internal server error".to_string(),
        }
    }

    /// Convert into the axum response pair used by every route handler.
    pub fn response(&self, dev_mode: bool) -> (StatusCode, Json<Value>) {
        if matches!(self, ApiError::External(_)) {
            tracing::error!(err = %self, "request failed with external-service error");
        }

        let mut body = json!({ "error": self.public_message() });
        if let ApiError::Validation { details } = self {
            body["details"] = json!(details);
        }
        if dev_mode {
            body["detail"] = json!(format!("{self:#}"));
        }
        (self.status(), Json(body))
    }
}
