use std::{
    env,
    fmt::{Debug, Display},
    fs::read_to_string,
    num::NonZeroU64,
    str::FromStr,
    time::Duration,
};

use tracing::{info, warn};

use crate::{error::AppError, utils::LogDateFormat};

pub const UPSTREAM_URL_KEYS: [&str; 2] = ["GAS_URL", "APPS_SCRIPT_URL"];
pub const SECRET_KEY: &str = "SECRET";

// `0` fails the `NonZeroU64` parse and falls back to this.
const DEFAULT_TIMEOUT_SECS: NonZeroU64 = NonZeroU64::new(30).unwrap();

/// Settings read once at start-up.
///
/// The upstream URL and secret are optional here: a deployment without them
/// still starts, and every proxied request answers `missing_env` instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upstream_url: Option<String>,
    pub secret: Option<String>,
    pub upstream_timeout: Duration,
    pub log_date_format: LogDateFormat,
}

/// Borrowed view of the upstream settings, only handed out when complete.
#[derive(Debug, Clone, Copy)]
pub struct Upstream<'a> {
    pub url: &'a str,
    pub secret: &'a str,
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok(), read_secret)
    }

    /// `lookup` reads a variable, `secret_file` a mounted secret by name.
    pub fn from_lookup<L, S>(lookup: L, secret_file: S) -> Self
    where
        L: Fn(&str) -> Option<String>,
        S: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            port: try_load(&var, "RUST_PORT", 8788),
            upstream_url: UPSTREAM_URL_KEYS.iter().find_map(|&key| var(key)),
            secret: var(SECRET_KEY).or_else(|| secret_file(SECRET_KEY)),
            upstream_timeout: Duration::from_secs(
                try_load(&var, "UPSTREAM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS).get(),
            ),
            log_date_format: try_load(&var, "LOG_DATE_FORMAT", LogDateFormat::DayMonthYear),
        }
    }

    pub fn upstream(&self) -> Result<Upstream<'_>, AppError> {
        let url = self
            .upstream_url
            .as_deref()
            .ok_or(AppError::ConfigurationMissing(UPSTREAM_URL_KEYS[0]))?;
        let secret = self
            .secret
            .as_deref()
            .ok_or(AppError::ConfigurationMissing(SECRET_KEY))?;

        Ok(Upstream { url, secret })
    }
}

fn try_load<T, F>(var: F, key: &str, default: T) -> T
where
    T: FromStr + Debug,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(key) else {
        info!("{key} not set, using default: {default:?}");
        return default;
    };

    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value: {e}, using default: {default:?}");
        default
    })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}
