pub mod api;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod constants;
pub mod domain;
pub mod materializer;
pub mod metadata;
pub mod naming;
pub mod orchestrator;
pub mod resolver;
pub mod scanner;
pub mod session;
pub mod state;
pub mod storage;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use config::Config;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    run_with_config(config).await
}

pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let prometheus_handle = init_prometheus(&config)?;
    init_logging(&config)?;

    let cli = Cli::parse();
    execute_command(cli, config, prometheus_handle).await
}

fn init_prometheus(
    config: &Config,
) -> anyhow::Result<Option<metrics_exporter_prometheus::PrometheusHandle>> {
    if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Ok(Some(handle))
    } else {
        Ok(None)
    }
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let mut log_level = config.general.log_level.clone();
    if config.general.suppress_connection_errors {
        log_level.push_str(",reqwest::retry=off,hyper_util=off");
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let use_json = config.observability.loki_enabled
        || std::env::var("LOG_FORMAT").unwrap_or_default() == "json";

    if use_json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false);

        if config.observability.loki_enabled {
            let url =
                url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

            let (loki_layer, task) = tracing_loki::builder()
                .label("app", "mediatree")?
                .extra_field("env", "production")?
                .extra_field("version", env!("CARGO_PKG_VERSION"))?
                .build_url(url)?;

            tokio::spawn(task);
            registry.with(fmt_layer).with(loki_layer).init();
            info!(
                "Loki logging initialized at {}",
                config.observability.loki_url
            );
        } else {
            registry.with(fmt_layer).init();
        }
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().pretty();
        registry.with(fmt_layer).init();
    }
    Ok(())
}

async fn execute_command(
    cli: Cli,
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    match cli.command {
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }

        Some(Commands::Init) => cli::cmd_init().await,

        Some(Commands::Serve) => cli::cmd_serve(config, prometheus_handle).await,

        Some(Commands::ConnectSource { source }) => {
            cli::cmd_connect_source(&config, &source).await
        }

        Some(Commands::ConnectTarget { target }) => {
            cli::cmd_connect_target(&config, &target).await
        }

        Some(Commands::Scan { source, scan }) => cli::cmd_scan(&config, &source, &scan).await,

        Some(Commands::Classify {
            source,
            scan,
            classify,
        }) => cli::cmd_classify(&config, &source, &scan, &classify).await,

        Some(Commands::Organize {
            source,
            scan,
            classify,
            naming_language,
        }) => cli::cmd_organize(&config, &source, &scan, &classify, naming_language).await,

        Some(Commands::GenerateStrm {
            source,
            target,
            scan,
            classify,
            naming_language,
        }) => {
            cli::cmd_generate_strm(&config, &source, &target, &scan, &classify, naming_language)
                .await
        }

        Some(Commands::RetryFailed {
            source,
            target,
            failed_file,
        }) => cli::cmd_retry_failed(&config, &source, &target, &failed_file).await,

        Some(Commands::LookupMetadata { query, kind }) => {
            let query_str = query.join(" ");
            cli::cmd_lookup_metadata(&config, &query_str, kind).await
        }
    }
}
