//! HTTP mapping of console errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::dataplane::types::DataplaneError;

#[derive(Debug)]
pub enum ApiError {
    Dataplane(DataplaneError),
    NotFound(String),
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Dataplane(err) => match err {
                DataplaneError::Conflict { .. } => StatusCode::CONFLICT,
                DataplaneError::Invalid(_) => StatusCode::BAD_REQUEST,
                DataplaneError::Mutation { status, .. } if (400..500).contains(status) => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl From<DataplaneError> for ApiError {
    fn from(err: DataplaneError) -> Self {
        ApiError::Dataplane(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Dataplane(err) => err.to_string(),
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg.clone(),
        };
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %message, "API request failed upstream");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
