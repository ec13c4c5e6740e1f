use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::models::REMAINING_READS_HEADER;

/// Protocol failures. The status code is the signal; bodies are short plain
/// text lines.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Not found")]
    NotFound,

    #[error("Invalid request body")]
    BadRequest(String),

    #[error("Too Many Requests")]
    Throttled,
}

impl SimulatorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SimulatorError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            SimulatorError::NotFound => StatusCode::NOT_FOUND,
            SimulatorError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SimulatorError::Throttled => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for SimulatorError {
    fn into_response(self) -> Response {
        if let SimulatorError::BadRequest(reason) = &self {
            tracing::debug!(reason = %reason, "Rejected checkaccess body");
        }

        let mut res = (self.status_code(), format!("{}\n", self)).into_response();
        let headers = res.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );

        if matches!(self, SimulatorError::Throttled) {
            headers.insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            headers.insert(REMAINING_READS_HEADER, HeaderValue::from_static("0"));
        }
        res
    }
}
