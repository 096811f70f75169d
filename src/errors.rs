use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::domain::query::error::DispatchError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Body parsing error: {0}")]
    BodyParsingError(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            AppError::BodyParsingError(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        // String provided by thiserror → safe JSON message
        let body = Json(json!({
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_become_bad_request() {
        let err: AppError = DispatchError::EmptyBatch.into();
        assert_eq!(err.to_string(), "bad request: query contains no queries");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::NotFound("/nope".into());
        assert_eq!(err.to_string(), "Not found: /nope");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
