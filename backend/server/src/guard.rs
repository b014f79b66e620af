//! # Submission Guard
//!
//! Decides whether a submission may be forwarded to the sheet.
//!
//! Threat model: a client may have moved its device clock to log a day other
//! than today. The client's clock is only trusted within [`MAX_DRIFT_MS`] of
//! the server clock, and the day written to the sheet is always the one the
//! server observes in the client's declared timezone.
//!
//! ## Checks, in order
//! 1. required fields present
//! 2. `tzOffsetMin` is an integer within ±14h
//! 3. `logDate` is `YYYY-MM-DD` (or `D/M/YYYY`, normalized first)
//! 4. `clientNow` parses
//! 5. `|server - client| <= 10 minutes`
//! 6. `logDate` equals the server-local day
//! 7. `logDate` equals the client-local day
//!
//! On success the forwarded `logDate` is overwritten with the server-local
//! day rather than echoing the client's string.
//!
//! ## Sign convention
//! `tzOffsetMin` follows `Date.getTimezoneOffset()`: minutes of `UTC - local`,
//! positive west of UTC. See [`local_day`].
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::utils::{
    LogDateFormat, canonical_instant, local_day, normalize_log_date, parse_instant,
    parse_or_default,
};

pub const MAX_DRIFT_MS: i64 = 10 * 60 * 1000;

/// UTC-14 .. UTC+14, wide enough for every zone in use.
pub const MAX_TZ_OFFSET_MIN: i64 = 14 * 60;

/// Raw submission as received. Fields stay untyped so that a wrongly typed
/// value is reported by [`validate`] instead of failing the decode.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub name: Option<Value>,
    pub log_date: Option<Value>,
    pub session: Option<Value>,
    pub duration: Option<Value>,
    pub weekday: Option<Value>,
    pub client_now: Option<Value>,
    pub tz_offset_min: Option<Value>,
}

impl SubmissionRequest {
    pub fn from_body(bytes: &[u8]) -> Self {
        serde_json::from_value(Value::Object(parse_or_default(bytes))).unwrap_or_default()
    }
}

/// What gets forwarded upstream, minus the secret.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSubmission {
    pub name: String,
    pub log_date: String,
    #[serde(rename = "logDateISO")]
    pub log_date_iso: String,
    pub weekday: Value,
    pub session: String,
    pub duration: Value,
    pub client_now: String,
    pub tz_offset_min: i32,
    pub server_now: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("tzOffsetMin must be an integer within ±840 minutes")]
    BadTimezoneOffset,

    #[error("logDate is not a recognised date")]
    BadDateFormat,

    #[error("clientNow is not a valid timestamp")]
    BadClientTimestamp,

    #[error("Client clock is {drift_ms}ms away from the server")]
    ClockDriftExceeded { drift_ms: i64 },

    #[error("logDate {log_date} is not the client's local day {client_local_date}")]
    ClientLocalDayMismatch {
        log_date: String,
        client_local_date: NaiveDate,
    },

    #[error("logDate {log_date} is not today ({server_local_date})")]
    ServerLocalDayMismatch {
        log_date: String,
        server_local_date: NaiveDate,
    },
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::MissingFields(_) => "missing_fields",
            Rejection::BadTimezoneOffset => "bad_tzOffsetMin",
            Rejection::BadDateFormat => "bad_logDate_format",
            Rejection::BadClientTimestamp => "bad_clientNow",
            Rejection::ClockDriftExceeded { .. } => "clock_drift_too_large",
            Rejection::ClientLocalDayMismatch { .. } => "logDate_mismatch_client_local_day",
            Rejection::ServerLocalDayMismatch { .. } => "logDate_mismatch_server_local_day",
        }
    }

    pub fn detail(&self) -> Option<Value> {
        match self {
            Rejection::MissingFields(fields) => Some(json!({ "fields": fields })),
            Rejection::ClockDriftExceeded { drift_ms } => Some(json!({
                "driftSeconds": (drift_ms + 500) / 1000,
                "maxDriftSeconds": MAX_DRIFT_MS / 1000,
            })),
            Rejection::ClientLocalDayMismatch {
                log_date,
                client_local_date,
            } => Some(json!({
                "logDate": log_date,
                "clientLocalDate": client_local_date.to_string(),
            })),
            Rejection::ServerLocalDayMismatch {
                log_date,
                server_local_date,
            } => Some(json!({
                "logDate": log_date,
                "serverLocalDate": server_local_date.to_string(),
            })),
            _ => None,
        }
    }
}

pub fn validate(
    request: &SubmissionRequest,
    server_now: DateTime<Utc>,
    log_date_format: LogDateFormat,
) -> Result<NormalizedSubmission, Rejection> {
    let mut missing = Vec::new();
    let name = require_text("name", &request.name, &mut missing);
    let session = require_text("session", &request.session, &mut missing);
    let duration = require("duration", &request.duration, &mut missing);
    let log_date = require("logDate", &request.log_date, &mut missing);
    let client_now = require("clientNow", &request.client_now, &mut missing);
    let tz = require("tzOffsetMin", &request.tz_offset_min, &mut missing);

    let (Some(name), Some(session), Some(duration), Some(log_date), Some(client_now), Some(tz)) =
        (name, session, duration, log_date, client_now, tz)
    else {
        return Err(Rejection::MissingFields(missing));
    };

    let tz_offset_min = parse_tz_offset(tz).ok_or(Rejection::BadTimezoneOffset)?;

    let log_date = log_date
        .as_str()
        .and_then(normalize_log_date)
        .ok_or(Rejection::BadDateFormat)?;

    let client_now = client_now
        .as_str()
        .and_then(parse_instant)
        .ok_or(Rejection::BadClientTimestamp)?;

    let drift = (server_now - client_now).abs();
    if drift > TimeDelta::milliseconds(MAX_DRIFT_MS) {
        return Err(Rejection::ClockDriftExceeded {
            drift_ms: drift.num_milliseconds(),
        });
    }

    let server_local_date = local_day(server_now, tz_offset_min);
    let client_local_date = local_day(client_now, tz_offset_min);

    if log_date != server_local_date.to_string() {
        return Err(Rejection::ServerLocalDayMismatch {
            log_date,
            server_local_date,
        });
    }

    if log_date != client_local_date.to_string() {
        return Err(Rejection::ClientLocalDayMismatch {
            log_date,
            client_local_date,
        });
    }

    Ok(NormalizedSubmission {
        name: name.to_string(),
        log_date: log_date_format.render(server_local_date),
        log_date_iso: server_local_date.to_string(),
        weekday: request
            .weekday
            .clone()
            .unwrap_or_else(|| Value::String(String::new())),
        session: session.to_string(),
        duration: duration.clone(),
        client_now: canonical_instant(client_now),
        tz_offset_min,
        server_now: canonical_instant(server_now),
    })
}

/// Blank strings count as absent.
fn require<'a>(
    key: &'static str,
    value: &'a Option<Value>,
    missing: &mut Vec<&'static str>,
) -> Option<&'a Value> {
    let present = match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    };
    if !present {
        missing.push(key);
        return None;
    }

    value.as_ref()
}

/// Labels must be strings; anything else counts as absent. Returns the
/// trimmed text.
fn require_text<'a>(
    key: &'static str,
    value: &'a Option<Value>,
    missing: &mut Vec<&'static str>,
) -> Option<&'a str> {
    let text = value
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if text.is_none() {
        missing.push(key);
    }

    text
}

/// Accepts `-420`, `-420.0` and `"-420"`.
fn parse_tz_offset(value: &Value) -> Option<i32> {
    let integral = |f: f64| (f.is_finite() && f.fract() == 0.0).then_some(f as i64);

    let minutes = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral))?,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))?
        }
        _ => return None,
    };

    if !(-MAX_TZ_OFFSET_MIN..=MAX_TZ_OFFSET_MIN).contains(&minutes) {
        return None;
    }

    i32::try_from(minutes).ok()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    const SERVER_NOW: &str = "2026-02-10T23:50:00Z";

    fn at(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    fn request(body: Value) -> SubmissionRequest {
        serde_json::from_value(body).unwrap()
    }

    fn bangkok(log_date: &str, client_now: &str) -> SubmissionRequest {
        request(json!({
            "name": "Somchai",
            "logDate": log_date,
            "session": " Morning ",
            "duration": "1:30",
            "weekday": "Wednesday",
            "clientNow": client_now,
            "tzOffsetMin": -420,
        }))
    }

    fn check(request: &SubmissionRequest) -> Result<NormalizedSubmission, Rejection> {
        validate(request, at(SERVER_NOW), LogDateFormat::DayMonthYear)
    }

    #[test]
    fn test_accepts_today_east_of_utc() {
        let accepted = check(&bangkok("2026-02-11", "2026-02-10T23:49:30Z")).unwrap();

        assert_eq!(accepted.log_date, "11/2/2026");
        assert_eq!(accepted.log_date_iso, "2026-02-11");
        assert_eq!(accepted.session, "Morning");
        assert_eq!(accepted.duration, json!("1:30"));
        assert_eq!(accepted.weekday, json!("Wednesday"));
        assert_eq!(accepted.tz_offset_min, -420);
        assert_eq!(accepted.client_now, "2026-02-10T23:49:30.000Z");
        assert_eq!(accepted.server_now, "2026-02-10T23:50:00.000Z");
    }

    #[test]
    fn test_rejects_yesterday_east_of_utc() {
        let rejection = check(&bangkok("2026-02-10", "2026-02-10T23:49:30Z")).unwrap_err();

        assert_eq!(rejection.code(), "logDate_mismatch_server_local_day");
        assert_eq!(
            rejection.detail(),
            Some(json!({ "logDate": "2026-02-10", "serverLocalDate": "2026-02-11" }))
        );
    }

    #[test]
    fn test_west_of_utc_uses_positive_offset() {
        // 23:50Z is 18:50 in New York (UTC-5)
        let mut req = bangkok("2026-02-10", "2026-02-10T23:55:00Z");
        req.tz_offset_min = Some(json!(300));
        assert_eq!(check(&req).unwrap().log_date_iso, "2026-02-10");

        // reading the offset as UTC+5 would land on the 11th
        req.log_date = Some(json!("2026-02-11"));
        assert_eq!(
            check(&req).unwrap_err().code(),
            "logDate_mismatch_server_local_day"
        );
    }

    #[test]
    fn test_client_day_disagrees_near_midnight() {
        // server sees 00:05 on the 11th in Bangkok, client still on the 10th
        let req = bangkok("2026-02-11", "2026-02-10T16:58:00Z");
        let rejection = validate(&req, at("2026-02-10T17:05:00Z"), LogDateFormat::Iso).unwrap_err();

        assert_eq!(
            rejection,
            Rejection::ClientLocalDayMismatch {
                log_date: "2026-02-11".to_string(),
                client_local_date: NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            }
        );
        assert_eq!(rejection.code(), "logDate_mismatch_client_local_day");
    }

    #[test]
    fn test_drift_boundary() {
        let server = at(SERVER_NOW);

        let exact = canonical_instant(server - Duration::milliseconds(MAX_DRIFT_MS));
        assert!(check(&bangkok("2026-02-11", &exact)).is_ok());

        let exact_ahead = canonical_instant(server + Duration::milliseconds(MAX_DRIFT_MS));
        assert!(check(&bangkok("2026-02-11", &exact_ahead)).is_ok());

        let over = canonical_instant(server - Duration::milliseconds(MAX_DRIFT_MS + 1));
        let rejection = check(&bangkok("2026-02-11", &over)).unwrap_err();
        assert_eq!(rejection, Rejection::ClockDriftExceeded { drift_ms: 600_001 });
        assert_eq!(
            rejection.detail(),
            Some(json!({ "driftSeconds": 600, "maxDriftSeconds": 600 }))
        );
    }

    #[test]
    fn test_backdated_device_clock_hits_drift() {
        let rejection = check(&bangkok("2026-02-10", "2026-02-09T23:50:00Z")).unwrap_err();

        assert_eq!(rejection.code(), "clock_drift_too_large");
        assert_eq!(
            rejection.detail(),
            Some(json!({ "driftSeconds": 86_400, "maxDriftSeconds": 600 }))
        );
    }

    #[test]
    fn test_missing_duration() {
        let mut req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");
        req.duration = None;

        assert_eq!(
            check(&req).unwrap_err(),
            Rejection::MissingFields(vec!["duration"])
        );
    }

    #[test]
    fn test_missing_fields_win_over_bad_values() {
        let req = request(json!({
            "name": "",
            "session": "   ",
            "logDate": "garbage",
            "clientNow": "garbage",
            "tzOffsetMin": null,
        }));
        let rejection = check(&req).unwrap_err();

        assert_eq!(
            rejection,
            Rejection::MissingFields(vec!["name", "session", "duration", "tzOffsetMin"])
        );
        assert_eq!(rejection.code(), "missing_fields");
    }

    #[test]
    fn test_labels_must_be_strings() {
        for bad in [json!([]), json!({}), json!(false), json!(7)] {
            let mut req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");
            req.name = Some(bad.clone());
            req.session = Some(bad);

            assert_eq!(
                check(&req).unwrap_err(),
                Rejection::MissingFields(vec!["name", "session"])
            );
        }
    }

    #[test]
    fn test_name_is_trimmed() {
        let mut req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");
        req.name = Some(json!("  Somchai "));

        assert_eq!(check(&req).unwrap().name, "Somchai");
    }

    #[test]
    fn test_empty_request() {
        let rejection = check(&SubmissionRequest::default()).unwrap_err();

        assert_eq!(rejection.code(), "missing_fields");
    }

    #[test]
    fn test_tz_offset_bounds() {
        let mut req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");

        req.tz_offset_min = Some(json!(1000));
        assert_eq!(check(&req).unwrap_err(), Rejection::BadTimezoneOffset);

        req.tz_offset_min = Some(json!(-841));
        assert_eq!(check(&req).unwrap_err(), Rejection::BadTimezoneOffset);

        req.tz_offset_min = Some(json!(-420.5));
        assert_eq!(check(&req).unwrap_err(), Rejection::BadTimezoneOffset);

        req.tz_offset_min = Some(json!("abc"));
        assert_eq!(check(&req).unwrap_err(), Rejection::BadTimezoneOffset);

        req.tz_offset_min = Some(json!(true));
        assert_eq!(check(&req).unwrap_err(), Rejection::BadTimezoneOffset);
    }

    #[test]
    fn test_tz_offset_accepted_shapes() {
        let mut req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");

        req.tz_offset_min = Some(json!("-420"));
        assert_eq!(check(&req).unwrap().tz_offset_min, -420);

        req.tz_offset_min = Some(json!(-420.0));
        assert_eq!(check(&req).unwrap().tz_offset_min, -420);

        // UTC+14 and UTC+5:45 are still real zones
        req.tz_offset_min = Some(json!(-840));
        assert_eq!(check(&req).unwrap().log_date_iso, "2026-02-11");

        req.tz_offset_min = Some(json!(-345));
        assert_eq!(check(&req).unwrap().log_date_iso, "2026-02-11");
    }

    #[test]
    fn test_large_positive_offset() {
        // +690 puts local time at 12:20 on the 10th
        let mut req = bangkok("2026-02-10", "2026-02-10T23:49:30Z");
        req.tz_offset_min = Some(json!(690));

        assert_eq!(check(&req).unwrap().log_date_iso, "2026-02-10");
    }

    #[test]
    fn test_day_month_year_input_is_normalized() {
        let server = at("2026-02-10T12:00:00Z");
        let req = bangkok("10/2/2026", "2026-02-10T11:58:00Z");
        let accepted = validate(&req, server, LogDateFormat::Iso).unwrap();

        assert_eq!(accepted.log_date, "2026-02-10");
        assert_eq!(accepted.log_date_iso, "2026-02-10");
    }

    #[test]
    fn test_bad_log_date() {
        for bad in [json!("2026/02/11"), json!("11-02-2026"), json!("31/2/2026"), json!(20260211)] {
            let mut req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");
            req.log_date = Some(bad);
            assert_eq!(check(&req).unwrap_err(), Rejection::BadDateFormat);
        }
    }

    #[test]
    fn test_bad_client_now() {
        for bad in [json!("yesterday"), json!("2026-02-31T10:00:00Z"), json!(1770767400000i64)] {
            let mut req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");
            req.client_now = Some(bad);
            assert_eq!(check(&req).unwrap_err(), Rejection::BadClientTimestamp);
        }
    }

    #[test]
    fn test_client_now_with_offset_is_canonicalized() {
        let req = bangkok("2026-02-11", "2026-02-11T06:45:00+07:00");

        assert_eq!(check(&req).unwrap().client_now, "2026-02-10T23:45:00.000Z");
    }

    #[test]
    fn test_missing_weekday_forwards_empty() {
        let mut req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");
        req.weekday = None;

        assert_eq!(check(&req).unwrap().weekday, json!(""));
    }

    #[test]
    fn test_translation_invariance() {
        let req = bangkok("2026-02-11", "2026-02-10T23:49:30Z");
        let base = check(&req).unwrap();

        for days in [-30i64, -1, 1, 365] {
            let shift = Duration::days(days);
            let expected = NaiveDate::from_ymd_opt(2026, 2, 11).unwrap() + shift;
            let mut moved = req.clone();
            moved.log_date = Some(json!(expected.to_string()));
            moved.client_now = Some(json!(canonical_instant(at("2026-02-10T23:49:30Z") + shift)));

            let accepted = validate(&moved, at(SERVER_NOW) + shift, LogDateFormat::Iso).unwrap();
            assert_eq!(accepted.log_date_iso, expected.to_string());
            assert_eq!(accepted.tz_offset_min, base.tz_offset_min);
        }
    }

    #[test]
    fn test_idempotent() {
        let ok = bangkok("2026-02-11", "2026-02-10T23:49:30Z");
        assert_eq!(check(&ok), check(&ok));

        let bad = bangkok("2026-02-10", "2026-02-10T23:49:30Z");
        assert_eq!(check(&bad), check(&bad));
    }

    #[test]
    fn test_from_body_falls_back_to_empty() {
        assert_eq!(SubmissionRequest::from_body(b"not json"), SubmissionRequest::default());

        let req = SubmissionRequest::from_body(br#"{"name":"A","tzOffsetMin":-420,"extra":1}"#);
        assert_eq!(req.name, Some(json!("A")));
        assert_eq!(req.tz_offset_min, Some(json!(-420)));
    }

    #[test]
    fn test_serialized_payload_keys() {
        let accepted = check(&bangkok("2026-02-11", "2026-02-10T23:49:30Z")).unwrap();
        let value = serde_json::to_value(&accepted).unwrap();

        assert_eq!(value["logDate"], "11/2/2026");
        assert_eq!(value["logDateISO"], "2026-02-11");
        assert_eq!(value["tzOffsetMin"], -420);
        assert_eq!(value["serverNow"], "2026-02-10T23:50:00.000Z");
        assert!(value.get("secret").is_none());
    }
}
