use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::io;

use crate::api::ApiError;
use crate::middleware::RequestId;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    #[error("Template rendering error: {0}")]
    Template(#[from] tera::Error),

    #[error("Email not found: {0}")]
    EmailNotFound(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Invalid list address: {0}")]
    InvalidList(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::EmailNotFound(_) | AppError::ThreadNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidList(_) => StatusCode::BAD_REQUEST,
            AppError::Api(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            AppError::Api(ApiError::Superseded) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Api(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::EmailNotFound(_)
            | AppError::ThreadNotFound(_)
            | AppError::InvalidList(_) => self.to_string(),
            AppError::Api(e) => e.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

fn error_page(error: &AppError, request_id: Option<&RequestId>) -> Response {
    let status = error.status();
    let request_id = request_id.map(|id| id.0.to_string());
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(request_id = request_id.as_deref(), "Internal error: {:?}", error);
    } else {
        tracing::warn!(
            request_id = request_id.as_deref(),
            status = status.as_u16(),
            error = %error,
            "Request failed"
        );
    }
    let message = tera::escape_html(&error.public_message()).replace('\n', "<br>");
    let reference = request_id
        .map(|id| format!("\n            <p class=\"request-id\">Request ID: {}</p>", id))
        .unwrap_or_default();

    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Error {}</title>
    <link rel="stylesheet" href="/static/css/style.css">
</head>
<body>
    <div class="container">
        <div class="error-page">
            <h1>An error occurred</h1>
            <p>{}</p>{}
        </div>
    </div>
</body>
</html>"#,
        status.as_u16(),
        message,
        reference
    );

    (status, Html(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_page(&self, None)
    }
}

/// An [`AppError`] tagged with the request it failed, shown on the error page.
#[derive(Debug)]
pub struct AppErrorResponse {
    pub error: AppError,
    pub request_id: Option<RequestId>,
}

impl From<AppError> for AppErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            error,
            request_id: None,
        }
    }
}

impl IntoResponse for AppErrorResponse {
    fn into_response(self) -> Response {
        error_page(&self.error, self.request_id.as_ref())
    }
}

/// Attach the current request id to an error result.
pub trait ResultExt<T> {
    fn with_request_id(self, request_id: &RequestId) -> Result<T, AppErrorResponse>;
}

impl<T, E: Into<AppError>> ResultExt<T> for Result<T, E> {
    fn with_request_id(self, request_id: &RequestId) -> Result<T, AppErrorResponse> {
        self.map_err(|e| AppErrorResponse {
            error: e.into(),
            request_id: Some(request_id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::ThreadNotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Api(ApiError::Status {
                status: 404,
                url: "u".into(),
                message: "gone".into(),
            })
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Api(ApiError::Backend("denied".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::InvalidList("nope".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_with_request_id() {
        let id = RequestId(uuid::Uuid::new_v4());
        let result: Result<(), AppError> = Err(AppError::EmailNotFound("x".into()));
        let err = result.with_request_id(&id).unwrap_err();
        assert_eq!(err.request_id.as_ref().unwrap().0, id.0);
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Internal("secret path /etc".into());
        assert_eq!(err.public_message(), "Internal server error");
    }
}
