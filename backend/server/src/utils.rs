use std::{str::FromStr, sync::LazyLock};

use axum::{
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("static regex"));

static DMY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})$").expect("static regex"));

/// How the forwarded `logDate` is rendered for the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogDateFormat {
    /// `2026-02-10`
    Iso,
    /// `10/2/2026`, no zero padding
    #[default]
    DayMonthYear,
}

impl LogDateFormat {
    pub fn render(self, date: NaiveDate) -> String {
        match self {
            LogDateFormat::Iso => date.format("%Y-%m-%d").to_string(),
            LogDateFormat::DayMonthYear => {
                format!("{}/{}/{}", date.day(), date.month(), date.year())
            }
        }
    }
}

impl FromStr for LogDateFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iso" | "yyyy-mm-dd" => Ok(LogDateFormat::Iso),
            "dmy" | "d/m/yyyy" => Ok(LogDateFormat::DayMonthYear),
            other => Err(format!("unknown log date format '{other}'")),
        }
    }
}

/// Calendar day at `instant` for a zone `tz_offset_min` minutes behind UTC.
///
/// Uses the `getTimezoneOffset` sign: `local = UTC - offset`, so Bangkok is
/// `-420` and New York in winter is `300`.
pub fn local_day(instant: DateTime<Utc>, tz_offset_min: i32) -> NaiveDate {
    (instant.naive_utc() - Duration::minutes(i64::from(tz_offset_min))).date()
}

/// Brings a submitted day into `YYYY-MM-DD`.
///
/// `D/M/YYYY` and `DD/MM/YYYY` are rewritten; anything else, or a result that
/// is not a real calendar day, gives `None`.
pub fn normalize_log_date(input: &str) -> Option<String> {
    let s = input.trim();

    let candidate = if ISO_DATE.is_match(s) {
        s.to_string()
    } else {
        let caps = DMY_DATE.captures(s)?;
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        format!("{}-{month:02}-{day:02}", &caps[3])
    };

    // both shapes go through the same check
    if !ISO_DATE.is_match(&candidate) {
        return None;
    }
    NaiveDate::parse_from_str(&candidate, "%Y-%m-%d").ok()?;

    Some(candidate)
}

/// Parses an RFC 3339 instant. A timestamp without an offset is read as UTC.
pub fn parse_instant(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `2026-02-10T23:50:00.000Z`
pub fn canonical_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Response with a JSON body that is already serialized.
pub fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response()
}

/// Decodes a request body, treating anything that is not a JSON object as `{}`.
pub fn parse_or_default(bytes: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
