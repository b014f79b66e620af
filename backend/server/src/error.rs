use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::{guard::Rejection, utils::json_response};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Missing environment variable {0}")]
    ConfigurationMissing(&'static str),

    #[error("Upstream request failed: {0}")]
    UpstreamFailure(#[from] reqwest::Error),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Rejected(rejection) => rejection.code(),
            AppError::MissingFields(_) => "missing_fields",
            AppError::ConfigurationMissing(_) => "missing_env",
            AppError::UpstreamFailure(_) => "upstream_failure",
            AppError::MethodNotAllowed => "method_not_allowed",
            AppError::InternalError(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Rejected(_) | AppError::MissingFields(_) => StatusCode::BAD_REQUEST,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::ConfigurationMissing(_)
            | AppError::UpstreamFailure(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Option<Value> {
        match self {
            AppError::Rejected(rejection) => rejection.detail(),
            AppError::MissingFields(fields) => Some(json!({ "fields": fields })),
            AppError::ConfigurationMissing(key) => Some(json!({ "key": key })),
            AppError::UpstreamFailure(e) => Some(json!({ "message": e.to_string() })),
            AppError::InternalError(e) => Some(json!({ "message": e.to_string() })),
            AppError::MethodNotAllowed => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({ "ok": false, "error": self.code() });
        if let Some(detail) = self.detail() {
            body["detail"] = detail;
        }

        json_response(self.status(), body.to_string())
    }
}
