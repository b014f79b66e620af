use std::sync::Arc;

use super::{
    clock::{Clock, SystemClock},
    config::Config,
    error::AppError,
    upstream::UpstreamClient,
};

pub struct AppState {
    pub config: Config,
    pub upstream: UpstreamClient,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Result<Arc<Self>, AppError> {
        let upstream = UpstreamClient::new(config.upstream_timeout)?;

        Ok(Arc::new(Self {
            config,
            upstream,
            clock,
        }))
    }

    pub fn from_env() -> Result<Arc<Self>, AppError> {
        Self::new(Config::load(), Arc::new(SystemClock))
    }
}
