mod classify;
mod connect;
mod init;
mod metadata;
mod organize;
mod retry;
mod scan;
mod serve;
mod strm;

pub use classify::cmd_classify;
pub use connect::{cmd_connect_source, cmd_connect_target};
pub use init::cmd_init;
pub use metadata::cmd_lookup_metadata;
pub use organize::cmd_organize;
pub use retry::cmd_retry_failed;
pub use scan::cmd_scan;
pub use serve::cmd_serve;
pub use strm::cmd_generate_strm;

use crate::cli::{ClassifyArgs, ScanArgs, SourceArgs, TargetArgs};
use crate::classifier::MappingRule;
use crate::domain::SessionId;
use crate::metadata::TmdbMetadataProvider;
use crate::orchestrator::{Orchestrator, OrchestratorError, ScanDelta, ScanRequest};
use std::sync::Arc;

/// Builds a fresh process-lifetime [`Orchestrator`] for a single CLI
/// invocation: one session per process invocation, session id
/// implicit/ephemeral.
pub(super) fn new_orchestrator(config: &crate::config::Config) -> Orchestrator {
    let metadata = Arc::new(TmdbMetadataProvider::new(
        config.metadata.base_url.clone(),
        config.metadata.api_key.clone(),
    ));
    let min_request_interval =
        std::time::Duration::from_secs_f64(config.storage.min_request_interval_s.max(0.0));
    Orchestrator::with_rate_limit(metadata, min_request_interval)
}

pub(super) async fn connect_source(
    orchestrator: &Orchestrator,
    session_id: SessionId,
    source: &SourceArgs,
) -> anyhow::Result<()> {
    let (message, delta) = orchestrator
        .connect_source(
            session_id,
            source.source_url.clone(),
            source.source_username.clone(),
            source.source_password.clone(),
            Some(source.source_path.clone()),
        )
        .await
        .map_err(orchestrator_error)?;
    println!("{message} ({})", delta.root_path);
    Ok(())
}

pub(super) async fn connect_target(
    orchestrator: &Orchestrator,
    session_id: SessionId,
    target: &TargetArgs,
) -> anyhow::Result<()> {
    let (message, delta) = orchestrator
        .connect_target(
            session_id,
            target.target_url.clone(),
            target.target_username.clone(),
            target.target_password.clone(),
            target.target_path.clone(),
        )
        .await
        .map_err(orchestrator_error)?;
    println!("{message} ({})", delta.root_path);
    Ok(())
}

pub(super) async fn scan(
    orchestrator: &Orchestrator,
    session_id: SessionId,
    scan: &ScanArgs,
) -> anyhow::Result<ScanDelta> {
    let request = ScanRequest {
        path: scan.path.clone(),
        recursive: scan.recursive,
        max_files: scan.max_files,
        max_depth: scan.max_depth,
        scan_delay_s: scan.scan_delay_s,
    };
    let (message, delta) = orchestrator
        .scan(session_id, request)
        .await
        .map_err(orchestrator_error)?;
    println!("{message}");
    Ok(delta)
}

pub(super) fn load_rules(classify: &ClassifyArgs) -> anyhow::Result<Vec<MappingRule>> {
    let content = std::fs::read_to_string(&classify.rules)
        .map_err(|e| anyhow::anyhow!("failed to read rules file '{}': {e}", classify.rules))?;
    let rules: Vec<MappingRule> = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse rules file '{}': {e}", classify.rules))?;
    Ok(rules)
}

pub(super) fn orchestrator_error(err: OrchestratorError) -> anyhow::Error {
    anyhow::anyhow!("{err}")
}
