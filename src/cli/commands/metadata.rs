use crate::cli::CliKind;
use crate::config::Config;

use super::{new_orchestrator, orchestrator_error};

pub async fn cmd_lookup_metadata(config: &Config, query: &str, kind: CliKind) -> anyhow::Result<()> {
    let orchestrator = new_orchestrator(config);
    let hits = orchestrator
        .lookup_metadata(query, kind.into())
        .await
        .map_err(orchestrator_error)?;

    if hits.is_empty() {
        println!("No results for '{query}'");
        return Ok(());
    }

    println!("{:-<60}", "");
    for hit in &hits {
        let year = hit.year.map_or_else(String::new, |y| format!(" ({y})"));
        println!("  {} - {}{year} [{}]", hit.series_id, hit.title, hit.kind);
    }
    Ok(())
}
