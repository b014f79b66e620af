use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::AppError,
    guard::{SubmissionRequest, validate},
    state::AppState,
    upstream::with_action,
    utils::{json_response, parse_or_default},
};

/// Upstream body: the secret first, then the payload's own fields.
#[derive(Serialize)]
struct WithSecret<'a, T: Serialize> {
    secret: &'a str,
    #[serde(flatten)]
    payload: T,
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let upstream = state.config.upstream()?;

    let request = SubmissionRequest::from_body(&body);
    let server_now = state.clock.now();

    let submission = validate(&request, server_now, state.config.log_date_format)
        .inspect_err(|rejection| warn!(code = rejection.code(), "Submission rejected: {rejection}"))?;

    info!(
        log_date = %submission.log_date_iso,
        tz_offset_min = submission.tz_offset_min,
        "Submission accepted"
    );

    let payload = WithSecret {
        secret: upstream.secret,
        payload: &submission,
    };
    let reply = state.upstream.post_json(upstream.url, &payload).await?;

    Ok(reply.relay_json())
}

pub async fn check_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let upstream = state.config.upstream()?;

    // action and secret always come from us, never the caller
    let mut payload = parse_or_default(&body);
    payload.insert("action".to_string(), json!("check"));
    payload.insert("secret".to_string(), json!(upstream.secret));

    let reply = state.upstream.post_json(upstream.url, &payload).await?;

    Ok(reply.relay())
}

pub async fn names_handler(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let upstream = state.config.upstream()?;

    let payload = WithSecret {
        secret: upstream.secret,
        payload: json!({ "action": "names" }),
    };
    let reply = state.upstream.post_json(upstream.url, &payload).await?;

    Ok(reply.relay())
}

pub async fn dashboard_handler(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let upstream = state.config.upstream()?;

    let url = with_action(upstream.url, "dashboard", upstream.secret)?;
    let reply = state.upstream.get(url).await?;

    Ok(reply.relay())
}

pub async fn check_status_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let param = |key: &str| {
        params
            .get(key)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };
    let name = param("name");
    let log_date = param("logDate");

    let missing: Vec<&'static str> = [("name", &name), ("logDate", &log_date)]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| key)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::MissingFields(missing));
    }

    let upstream = state.config.upstream()?;

    let mut url = with_action(upstream.url, "checkStatus", upstream.secret)?;
    url.query_pairs_mut()
        .append_pair("name", &name)
        .append_pair("logDate", &log_date);

    let reply = state.upstream.get(url).await?;

    Ok(reply.relay_json())
}

pub async fn health_handler() -> &'static str {
    "ok"
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

pub async fn not_found() -> Response {
    json_response(
        StatusCode::NOT_FOUND,
        json!({ "ok": false, "error": "not_found" }).to_string(),
    )
}
