use crate::cli::{SourceArgs, TargetArgs};
use crate::config::Config;
use crate::domain::SessionId;

use super::{connect_source, connect_target, new_orchestrator};

pub async fn cmd_connect_source(config: &Config, source: &SourceArgs) -> anyhow::Result<()> {
    let orchestrator = new_orchestrator(config);
    connect_source(&orchestrator, SessionId::new(), source).await
}

pub async fn cmd_connect_target(config: &Config, target: &TargetArgs) -> anyhow::Result<()> {
    let orchestrator = new_orchestrator(config);
    connect_target(&orchestrator, SessionId::new(), target).await
}
