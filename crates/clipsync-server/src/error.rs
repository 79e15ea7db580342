use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use clipsync_shared::wire::{RpcError, RpcErrorKind};

/// Errors raised by identity validation and token handling.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The presented identity or bearer token did not validate.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The server is missing configuration required for auth.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Per-invocation hub errors. Always reported to the calling session only.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidCredential(String),

    #[error("JoinRoom must be called first")]
    NotJoined,

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    NotFound(String),
}

impl From<AuthError> for HubError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredential(msg) => HubError::InvalidCredential(msg),
            AuthError::Configuration(msg) => HubError::Configuration(msg),
        }
    }
}

impl From<HubError> for RpcError {
    fn from(err: HubError) -> Self {
        let kind = match &err {
            HubError::Validation(_) => RpcErrorKind::Validation,
            HubError::InvalidCredential(_) => RpcErrorKind::InvalidCredential,
            HubError::NotJoined => RpcErrorKind::NotJoined,
            HubError::Configuration(_) => RpcErrorKind::Configuration,
            HubError::NotFound(_) => RpcErrorKind::NotFound,
        };
        RpcError::new(kind, err.to_string())
    }
}

/// HTTP boundary errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found")]
    NotFound,
}

impl From<AuthError> for ServerError {
    // Expected auth failures are clean 400s, never a generic 500.
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredential(msg) | AuthError::Configuration(msg) => {
                ServerError::BadRequest(msg)
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ServerError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_error_maps_to_rpc_kind() {
        let rpc: RpcError = HubError::NotJoined.into();
        assert_eq!(rpc.kind, RpcErrorKind::NotJoined);

        let rpc: RpcError = HubError::Validation("deviceId is required".into()).into();
        assert_eq!(rpc.kind, RpcErrorKind::Validation);
        assert_eq!(rpc.message, "deviceId is required");
    }

    #[test]
    fn test_auth_error_maps_to_hub_error() {
        let err: HubError = AuthError::Configuration("no signing key".into()).into();
        assert!(matches!(err, HubError::Configuration(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServerError::from(AuthError::InvalidCredential("bad".into()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Unauthorized("missing bearer".into())
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
