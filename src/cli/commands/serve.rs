use crate::config::Config;
use crate::state::AppState;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

pub async fn cmd_serve(config: Config, prometheus_handle: Option<PrometheusHandle>) -> anyhow::Result<()> {
    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, prometheus_handle));

    let app = crate::api::router(state);
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("mediatree API listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
