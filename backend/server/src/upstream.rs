//! # Upstream
//!
//! The sheet-backed script endpoint is the only system of record. Every route
//! ends here with either a JSON `POST` or a query-string `GET`.
//!
//! Two ways of handing the reply back:
//! - [`UpstreamReply::relay`] passes status and body through untouched
//! - [`UpstreamReply::relay_json`] re-encodes the body as JSON (`{}` when it is
//!   not JSON) and collapses the status to `200` or `500`
use std::time::Duration;

use axum::{http::StatusCode, response::Response};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{error::AppError, utils::json_response};

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
}

#[derive(Debug)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: String,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self { http })
    }

    pub async fn post_json<T>(&self, url: &str, payload: &T) -> Result<UpstreamReply, AppError>
    where
        T: Serialize + ?Sized,
    {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .inspect_err(|e| warn!("Upstream POST failed: {e}"))?;

        UpstreamReply::read(response).await
    }

    pub async fn get(&self, url: Url) -> Result<UpstreamReply, AppError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .inspect_err(|e| warn!("Upstream GET failed: {e}"))?;

        UpstreamReply::read(response).await
    }
}

impl UpstreamReply {
    async fn read(response: reqwest::Response) -> Result<Self, AppError> {
        let status = response.status();
        let body = response.text().await?;

        info!("Upstream replied {status}");

        Ok(Self { status, body })
    }

    pub fn relay(self) -> Response {
        json_response(self.status, self.body)
    }

    pub fn relay_json(self) -> Response {
        let body: Value = serde_json::from_str(&self.body).unwrap_or_else(|_| json!({}));
        let status = if self.status.is_success() {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        json_response(status, body.to_string())
    }
}

/// Upstream URL for a query-string call. Any query already on `base` is
/// dropped so a stale `action` or `secret` cannot ride along.
pub fn with_action(base: &str, action: &str, secret: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(base).map_err(|e| AppError::InternalError(Box::new(e)))?;
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("action", action)
        .append_pair("secret", secret);

    Ok(url)
}
