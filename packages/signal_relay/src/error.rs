//! Error types and the HTTP shape of admission rejections.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::protocol::PeerId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("websocket upgrade failed: {0}")]
    UpgradeFailure(String),

    #[error("peer id not provided")]
    MissingIdentity,

    #[error("peer id {0} already in use")]
    DuplicateIdentity(PeerId),

    #[error("malformed signaling message: {0}")]
    DecodeFailure(String),

    #[error("no target specified")]
    MissingTarget,

    #[error("target peer {0} not found")]
    RoutingFailure(PeerId),

    #[error("delivery to {peer} failed: {reason}")]
    DeliveryFailure { peer: PeerId, reason: String },

    #[error("liveness ping to {peer} failed: {reason}")]
    LivenessFailure { peer: PeerId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::UpgradeFailure(_) => "upgrade_failure",
            Self::MissingIdentity => "missing_identity",
            Self::DuplicateIdentity(_) => "duplicate_identity",
            Self::DecodeFailure(_) => "decode_failure",
            Self::MissingTarget => "missing_target",
            Self::RoutingFailure(_) => "routing_failure",
            Self::DeliveryFailure { .. } => "delivery_failure",
            Self::LivenessFailure { .. } => "liveness_failure",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Status used when the error is answered over plain HTTP, before any
    /// upgrade has happened. Only admission rejections take that path; the
    /// rest occur on live connections and share a generic status.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UpgradeFailure(_) | Self::MissingIdentity => StatusCode::BAD_REQUEST,
            Self::DuplicateIdentity(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Serializable error body for rejected requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl From<&RelayError> for ErrorResponse {
    fn from(err: &RelayError) -> Self {
        Self {
            error: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(RelayError::MissingIdentity.error_code(), "missing_identity");
        assert_eq!(
            RelayError::DuplicateIdentity(PeerId::from("alice")).error_code(),
            "duplicate_identity"
        );
        assert_eq!(
            RelayError::RoutingFailure(PeerId::from("bob")).error_code(),
            "routing_failure"
        );
    }

    #[test]
    fn admission_rejections_map_to_client_errors() {
        assert_eq!(
            RelayError::MissingIdentity.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::DuplicateIdentity(PeerId::from("alice")).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn connection_errors_share_generic_status() {
        for err in [
            RelayError::MissingTarget,
            RelayError::RoutingFailure(PeerId::from("bob")),
            RelayError::DecodeFailure("eof".into()),
            RelayError::DeliveryFailure {
                peer: PeerId::from("bob"),
                reason: "closed".into(),
            },
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn error_response_serde() {
        let err = RelayError::DuplicateIdentity(PeerId::from("alice"));
        let resp = ErrorResponse::from(&err);
        let json = serde_json::to_string(&resp).unwrap();
        let back: ErrorResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.error, "duplicate_identity");
        assert!(back.message.contains("alice"));
    }
}
