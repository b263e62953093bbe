//! Shared application state used across the API and CLI.
//!
//! `AppState` wraps the single process-wide [`Orchestrator`] plus the
//! config snapshot and optional Prometheus handle. There is no database:
//! all durable-within-process state lives in the Orchestrator's
//! `SessionStore`.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::metadata::TmdbMetadataProvider;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,

    pub config: Config,

    pub prometheus_handle: Option<PrometheusHandle>,

    pub start_time: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, prometheus_handle: Option<PrometheusHandle>) -> Self {
        let metadata = Arc::new(TmdbMetadataProvider::new(
            config.metadata.base_url.clone(),
            config.metadata.api_key.clone(),
        ));
        let min_request_interval =
            std::time::Duration::from_secs_f64(config.storage.min_request_interval_s.max(0.0));
        let orchestrator = Arc::new(Orchestrator::with_rate_limit(metadata, min_request_interval));

        Self {
            orchestrator,
            config,
            prometheus_handle,
            start_time: std::time::Instant::now(),
        }
    }
}
