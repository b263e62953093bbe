use crate::cli::{SourceArgs, TargetArgs};
use crate::config::Config;
use crate::domain::SessionId;
use crate::materializer::FailedUpload;

use super::{connect_source, connect_target, new_orchestrator, orchestrator_error};

pub async fn cmd_retry_failed(
    config: &Config,
    source: &SourceArgs,
    target: &TargetArgs,
    failed_file: &str,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(failed_file)
        .map_err(|e| anyhow::anyhow!("failed to read '{failed_file}': {e}"))?;
    let failed: Vec<FailedUpload> = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse '{failed_file}': {e}"))?;

    let orchestrator = new_orchestrator(config);
    let session_id = SessionId::new();
    connect_source(&orchestrator, session_id, source).await?;
    connect_target(&orchestrator, session_id, target).await?;
    orchestrator.seed_failed_uploads(session_id, failed).await;

    let (message, delta) = orchestrator
        .retry_failed(session_id)
        .await
        .map_err(orchestrator_error)?;

    println!("{message}");

    if delta.failed_uploads.is_empty() {
        let _ = std::fs::remove_file(failed_file);
        return Ok(());
    }

    let content = serde_json::to_string_pretty(&delta.failed_uploads)?;
    std::fs::write(failed_file, content)?;
    println!("  {} still failing, rewritten to {failed_file}", delta.failed_uploads.len());
    Ok(())
}
