//! HTTP error mapping.

use assetkeep_core::AssetError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    Conflict,
    Unavailable,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        let code = match &err {
            AssetError::NotFound(_) => ErrorCode::NotFound,
            AssetError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            AssetError::Conflict(_) => ErrorCode::Conflict,
            AssetError::Unavailable(_) => ErrorCode::Unavailable,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        if status.is_server_error() {
            tracing::error!(code = ?self.code, message = %self.message, "request failed");
        }
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_errors_map_to_statuses() {
        let cases = [
            (AssetError::NotFound("b1".into()), StatusCode::NOT_FOUND),
            (AssetError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (AssetError::Conflict("a1".into()), StatusCode::CONFLICT),
            (AssetError::Unavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).code.status_code(), status);
        }
    }

    #[test]
    fn body_carries_code_and_message() {
        let err = ApiError::from(AssetError::NotFound("build b1".into()));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "not_found");
        assert!(json["message"].as_str().unwrap().contains("build b1"));
    }
}
