use crate::cli::{ScanArgs, SourceArgs};
use crate::config::Config;
use crate::domain::SessionId;

use super::{connect_source, new_orchestrator, scan};

pub async fn cmd_scan(config: &Config, source: &SourceArgs, scan_args: &ScanArgs) -> anyhow::Result<()> {
    let orchestrator = new_orchestrator(config);
    let session_id = SessionId::new();
    connect_source(&orchestrator, session_id, source).await?;
    let delta = scan(&orchestrator, session_id, scan_args).await?;

    println!();
    println!("{:-<60}", "");
    println!("  Total:    {}", delta.scan_result.total);
    println!("  Video:    {}", delta.scan_result.video_count);
    println!("  Subtitle: {}", delta.scan_result.subtitle_count);
    if delta.scan_result.truncated {
        println!("  (truncated by max_files)");
    }
    if !delta.scan_result.failed_directories.is_empty() {
        println!("  Failed directories:");
        for dir in &delta.scan_result.failed_directories {
            println!("    - {dir}");
        }
    }
    Ok(())
}
