use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::core::store::StoreError;

#[derive(Debug)]
pub enum Error {
    UserNotFound { uid: String },
    StoreUnavailable(String),

    // Generic
    BadRequest(String),
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Error::UserNotFound { uid } => {
                (StatusCode::NOT_FOUND, format!("User {} not found", uid))
            }
            Error::StoreUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": {
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(uid) => Error::UserNotFound { uid },
            StoreError::Timeout(_) | StoreError::Unavailable(_) => {
                Error::StoreUnavailable(err.to_string())
            }
            StoreError::Database(_) | StoreError::Corrupt(_) => Error::Internal(err.to_string()),
        }
    }
}
