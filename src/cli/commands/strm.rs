use crate::cli::{CliNamingLanguage, ClassifyArgs, ScanArgs, SourceArgs, TargetArgs};
use crate::config::Config;
use crate::domain::SessionId;

use super::{connect_source, connect_target, load_rules, new_orchestrator, orchestrator_error, scan};

pub async fn cmd_generate_strm(
    config: &Config,
    source: &SourceArgs,
    target: &TargetArgs,
    scan_args: &ScanArgs,
    classify_args: &ClassifyArgs,
    naming_language: Option<CliNamingLanguage>,
) -> anyhow::Result<()> {
    let orchestrator = new_orchestrator(config);
    let session_id = SessionId::new();
    connect_source(&orchestrator, session_id, source).await?;
    connect_target(&orchestrator, session_id, target).await?;
    scan(&orchestrator, session_id, scan_args).await?;

    let rules = load_rules(classify_args)?;
    let (message, _) = orchestrator
        .classify(session_id, rules)
        .await
        .map_err(orchestrator_error)?;
    println!("{message}");

    let (message, delta) = orchestrator
        .generate_strm(session_id, naming_language.map(Into::into))
        .await
        .map_err(orchestrator_error)?;

    println!("{message}");
    println!();
    println!("{:-<60}", "");
    println!("  Succeeded: {}", delta.summary.succeeded);
    println!("  Failed:    {}", delta.summary.failed);

    if delta.failed_uploads.is_empty() {
        return Ok(());
    }

    let path = "failed_uploads.json";
    let content = serde_json::to_string_pretty(&delta.failed_uploads)?;
    std::fs::write(path, content)?;
    println!(
        "  {} failed upload(s) written to {path}; rerun `retry-failed --failed-file {path}`",
        delta.failed_uploads.len()
    );
    Ok(())
}
