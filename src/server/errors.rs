//! Error taxonomy and centralized helpers for WebSocket and HTTP error responses.
//!
//! Every error carries a stable upper-snake code. Use the helpers below so that
//! all error payloads are consistent, explicit, and include a code and context.

use actix::MailboxError;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::server::types::{JoinCode, SessionId};

/// Errors raised by the session directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("capacity must be at least 1 (got {0})")]
    InvalidCapacity(u32),
    #[error("invalid session: {0}")]
    InvalidSession(String),
    #[error("session {0} is full")]
    Full(SessionId),
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("caller is not the host of session {0}")]
    NotHost(SessionId),
}

/// Errors raised by the relay allocator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("capacity must be at least 1 (got {0})")]
    InvalidCapacity(u32),
    #[error("requested capacity {requested} exceeds provider maximum {max}")]
    CapacityExceeded { requested: u32, max: u32 },
    #[error("relay allocator unavailable: {0}")]
    AllocatorUnavailable(String),
    #[error("join code {0} not found")]
    NotFound(JoinCode),
    #[error("join code {0} has expired")]
    Expired(JoinCode),
    #[error("relay allocation {0} belongs to another player")]
    NotOwner(String),
}

/// Service-level error, as seen by HTTP/WebSocket clients and the matchmaker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("session directory unavailable: {0}")]
    DirectoryUnavailable(String),
    #[error("join attempt failed: {reason}")]
    Failed { reason: String },
    #[error("missing or unknown player token")]
    Unauthenticated,
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ServiceError {
    /// Wrap an actor mailbox failure on the directory.
    pub fn directory_mailbox(err: MailboxError) -> Self {
        ServiceError::DirectoryUnavailable(err.to_string())
    }

    /// Wrap an actor mailbox failure on the relay allocator.
    pub fn relay_mailbox(err: MailboxError) -> Self {
        ServiceError::Relay(RelayError::AllocatorUnavailable(err.to_string()))
    }

    /// Stable error code used in JSON payloads.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Directory(err) => match err {
                DirectoryError::InvalidCapacity(_) => "INVALID_CAPACITY",
                DirectoryError::InvalidSession(_) => "INVALID_SESSION",
                DirectoryError::Full(_) => "FULL",
                DirectoryError::NotFound(_) => "NOT_FOUND",
                DirectoryError::NotHost(_) => "NOT_HOST",
            },
            ServiceError::Relay(err) => match err {
                RelayError::InvalidCapacity(_) => "INVALID_CAPACITY",
                RelayError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
                RelayError::AllocatorUnavailable(_) => "ALLOCATOR_UNAVAILABLE",
                RelayError::NotFound(_) => "NOT_FOUND",
                RelayError::Expired(_) => "EXPIRED",
                RelayError::NotOwner(_) => "NOT_OWNER",
            },
            ServiceError::DirectoryUnavailable(_) => "DIRECTORY_UNAVAILABLE",
            ServiceError::Failed { .. } => "FAILED",
            ServiceError::Unauthenticated => "UNAUTHENTICATED",
            ServiceError::BadRequest(_) => "BAD_REQUEST",
        }
    }

    /// Transient provider errors are worth retrying; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::DirectoryUnavailable(_)
                | ServiceError::Relay(RelayError::AllocatorUnavailable(_))
        )
    }

    /// Optional context (identifier the error is about).
    fn context(&self) -> Option<String> {
        match self {
            ServiceError::Directory(
                DirectoryError::Full(id) | DirectoryError::NotFound(id) | DirectoryError::NotHost(id),
            ) => Some(id.to_string()),
            ServiceError::Relay(
                RelayError::NotFound(code) | RelayError::Expired(code) | RelayError::NotOwner(code),
            ) => {
                Some(code.clone())
            }
            _ => None,
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Directory(DirectoryError::Full(_)) => StatusCode::CONFLICT,
            ServiceError::Directory(DirectoryError::NotFound(_))
            | ServiceError::Relay(RelayError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Relay(RelayError::Expired(_)) => StatusCode::GONE,
            ServiceError::Directory(DirectoryError::NotHost(_))
            | ServiceError::Relay(RelayError::NotOwner(_)) => StatusCode::FORBIDDEN,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::DirectoryUnavailable(_)
            | ServiceError::Relay(RelayError::AllocatorUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Failed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        http_error_response(
            self.code(),
            &self.to_string(),
            self.context().as_deref(),
            self.status_code(),
        )
    }
}

/// Formats a WebSocket error message as a JSON string.
///
/// # Arguments
/// - `code`: Unique error code (e.g. "NOT_HOST").
/// - `message`: Human-readable error message (in English).
/// - `context`: Optional JSON context (e.g. session_id, ban duration).
pub fn ws_error_message(code: &str, message: &str, context: Option<Value>) -> String {
    serde_json::json!({
        "action": "Error",
        "data": {
            "code": code,
            "message": message,
            "context": context.unwrap_or(Value::Null),
        }
    })
    .to_string()
}

/// Returns an HTTP error response with a JSON body.
///
/// # Arguments
/// - `code`: Unique error code.
/// - `message`: Human-readable error message.
/// - `context`: Optional context string.
/// - `status`: HTTP status code.
pub fn http_error_response(
    code: &str,
    message: &str,
    context: Option<&str>,
    status: StatusCode,
) -> HttpResponse {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "context": context.unwrap_or(""),
        }
    });
    HttpResponse::build(status).json(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn only_provider_outages_are_retryable() {
        assert!(ServiceError::DirectoryUnavailable("down".into()).is_retryable());
        assert!(ServiceError::from(RelayError::AllocatorUnavailable("busy".into())).is_retryable());
        assert!(!ServiceError::from(DirectoryError::Full(Uuid::nil())).is_retryable());
        assert!(!ServiceError::from(RelayError::Expired("ABC123".into())).is_retryable());
        assert!(!ServiceError::Failed { reason: "x".into() }.is_retryable());
    }

    #[test]
    fn codes_and_statuses_follow_taxonomy() {
        let full = ServiceError::from(DirectoryError::Full(Uuid::nil()));
        assert_eq!(full.code(), "FULL");
        assert_eq!(full.status_code(), StatusCode::CONFLICT);

        let expired = ServiceError::from(RelayError::Expired("ABC123".into()));
        assert_eq!(expired.code(), "EXPIRED");
        assert_eq!(expired.status_code(), StatusCode::GONE);

        let exceeded = ServiceError::from(RelayError::CapacityExceeded { requested: 500, max: 100 });
        assert_eq!(exceeded.code(), "CAPACITY_EXCEEDED");
        assert_eq!(exceeded.status_code(), StatusCode::BAD_REQUEST);

        let foreign = ServiceError::from(RelayError::NotOwner("ABC123".into()));
        assert_eq!(foreign.code(), "NOT_OWNER");
        assert_eq!(foreign.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn ws_error_message_is_valid_json() {
        let text = ws_error_message("NOT_HOST", "nope", Some(serde_json::json!({"session_id": "x"})));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["action"], "Error");
        assert_eq!(value["data"]["code"], "NOT_HOST");
        assert_eq!(value["data"]["context"]["session_id"], "x");
    }
}
