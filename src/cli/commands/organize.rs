use crate::cli::{CliNamingLanguage, ClassifyArgs, ScanArgs, SourceArgs};
use crate::config::Config;
use crate::domain::SessionId;

use super::{connect_source, load_rules, new_orchestrator, orchestrator_error, scan};

pub async fn cmd_organize(
    config: &Config,
    source: &SourceArgs,
    scan_args: &ScanArgs,
    classify_args: &ClassifyArgs,
    naming_language: Option<CliNamingLanguage>,
) -> anyhow::Result<()> {
    let orchestrator = new_orchestrator(config);
    let session_id = SessionId::new();
    connect_source(&orchestrator, session_id, source).await?;
    scan(&orchestrator, session_id, scan_args).await?;

    let rules = load_rules(classify_args)?;
    let (message, _) = orchestrator
        .classify(session_id, rules)
        .await
        .map_err(orchestrator_error)?;
    println!("{message}");

    let (message, delta) = orchestrator
        .organize(session_id, naming_language.map(Into::into))
        .await
        .map_err(orchestrator_error)?;

    println!("{message}");
    println!();
    println!("{:-<60}", "");
    println!("  Succeeded: {}", delta.summary.succeeded);
    println!("  Failed:    {}", delta.summary.failed);
    for path in &delta.summary.failed_paths {
        println!("    - {path}");
    }
    if delta.summary.elided > 0 {
        println!("  ...and {} more", delta.summary.elided);
    }
    Ok(())
}
