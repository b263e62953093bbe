use crate::cli::{ClassifyArgs, ScanArgs, SourceArgs};
use crate::config::Config;
use crate::domain::SessionId;

use super::{connect_source, load_rules, new_orchestrator, orchestrator_error, scan};

pub async fn cmd_classify(
    config: &Config,
    source: &SourceArgs,
    scan_args: &ScanArgs,
    classify_args: &ClassifyArgs,
) -> anyhow::Result<()> {
    let orchestrator = new_orchestrator(config);
    let session_id = SessionId::new();
    connect_source(&orchestrator, session_id, source).await?;
    scan(&orchestrator, session_id, scan_args).await?;

    let rules = load_rules(classify_args)?;
    let (message, delta) = orchestrator
        .classify(session_id, rules)
        .await
        .map_err(orchestrator_error)?;

    println!("{message}");
    println!();
    println!("{:-<60}", "");
    println!(
        "  Matched: {}  Unmatched: {}  Errored: {}",
        delta.classification_result.matched,
        delta.classification_result.unmatched,
        delta.classification_result.error
    );
    for result in &delta.unmatched_or_error {
        let reason = result.error_message.as_deref().unwrap_or("no rule");
        println!("    - {} ({reason})", result.file_path);
    }
    Ok(())
}
