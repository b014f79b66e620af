//! Documentation of the logbook edge proxy.
//!
//! A thin HTTP layer in front of a spreadsheet-backed script endpoint. The
//! sheet is the system of record; this server holds no data of its own.
//!
//!
//!
//! # Routes
//!
//! | Route | Methods | Upstream |
//! |---|---|---|
//! | `/api/submit` | POST | guarded JSON `POST` |
//! | `/api/check` | POST | JSON `POST`, `action=check` |
//! | `/api/names` | GET, POST | JSON `POST`, `action=names` |
//! | `/api/dashboard` | GET | `GET ?action=dashboard` |
//! | `/api/checkStatus` | GET | `GET ?action=checkStatus&name=..&logDate=..` |
//!
//! Every upstream call carries the shared secret from configuration. A
//! `secret` sent by the browser is never forwarded.
//!
//!
//!
//! # Preventing Backdating
//!
//! **Goal**: a user must not be able to log yesterday's session by changing
//! the date on their phone.
//!
//! - Browser sends `clientNow` and `tzOffsetMin` alongside the claimed `logDate`
//! - Server rejects when its own clock and `clientNow` disagree by more than 10 minutes
//! - Server works out "today" in the declared timezone from its own clock
//! - `logDate` must equal that day, and the day the browser's clock implies
//! - The sheet receives the server's day, not the browser's string
//!
//! See [`guard`] for the exact rules.
//!
//!
//!
//! # Errors
//!
//! Failures are JSON: `{ "ok": false, "error": "<code>", "detail": {..} }`.
//! Codes are stable and meant for branching on the client; `detail` is
//! informational only.
//!
//!
//!
//! # Configuration
//!
//! | Variable | Default | |
//! |---|---|---|
//! | `RUST_PORT` | `8788` | listen port |
//! | `GAS_URL` / `APPS_SCRIPT_URL` | | upstream endpoint |
//! | `SECRET` | `/run/secrets/SECRET` | shared secret |
//! | `UPSTREAM_TIMEOUT_SECS` | `30` | per upstream call |
//! | `LOG_DATE_FORMAT` | `dmy` | `dmy` or `iso`, forwarded `logDate` shape |
//! | `RUST_LOG` | | tracing filter |
//!
//! A missing upstream URL or secret does not stop the server. Each proxied
//! request answers `500 missing_env` until it is set.
//!
//!
//!
//! # Setup
//!
//! Run locally.
//! ```sh
//! GAS_URL=https://script.google.com/macros/s/.../exec SECRET=... RUST_LOG=info cargo run -p logbook
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod routes;
pub mod state;
pub mod upstream;
pub mod utils;

use routes::{
    check_handler, check_status_handler, dashboard_handler, health_handler, method_not_allowed,
    names_handler, not_found, submit_handler,
};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::from_env()?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = app(state);

    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route(
            "/api/submit",
            post(submit_handler).fallback(method_not_allowed),
        )
        .route("/api/check", post(check_handler).fallback(method_not_allowed))
        .route(
            "/api/names",
            get(names_handler)
                .post(names_handler)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/dashboard",
            get(dashboard_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/checkStatus",
            get(check_status_handler).fallback(method_not_allowed),
        )
        .route("/healthz", get(health_handler))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
