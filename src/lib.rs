pub mod api;
pub mod config;
pub mod db;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::services::Clock;
use crate::storage::ImageStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub images: Arc<dyn ImageStore>,
    pub clock: Arc<dyn Clock>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        images: Arc<dyn ImageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            images,
            clock,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
