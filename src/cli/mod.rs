//! CLI module - command-line interface for mediatree.
//!
//! Exposes every orchestrator operation as a subcommand for
//! scripting/testing outside the web API. Each subcommand invocation is
//! its own ephemeral session (a fresh [`SessionId`](crate::domain::SessionId)
//! created for the process lifetime) — multi-step workflows either chain
//! flags on one subcommand invocation or run against the long-running
//! `serve` session over HTTP.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "mediatree")]
#[command(author, version, about = "Media-library organizer over Alist/WebDAV", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Mirrors [`crate::domain::Kind`] with a `clap::ValueEnum` impl so the
/// domain type itself stays free of CLI-framework dependencies.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliKind {
    Tv,
    Movie,
}

impl From<CliKind> for crate::domain::Kind {
    fn from(kind: CliKind) -> Self {
        match kind {
            CliKind::Tv => Self::Tv,
            CliKind::Movie => Self::Movie,
        }
    }
}

/// Mirrors [`crate::domain::NamingLanguage`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliNamingLanguage {
    Zh,
    En,
}

impl From<CliNamingLanguage> for crate::domain::NamingLanguage {
    fn from(lang: CliNamingLanguage) -> Self {
        match lang {
            CliNamingLanguage::Zh => Self::Zh,
            CliNamingLanguage::En => Self::En,
        }
    }
}

/// Shared storage-connection flags for `connect_source`/`connect_target`.
#[derive(Debug, clap::Args)]
pub struct SourceArgs {
    /// Source store URL (Alist or WebDAV)
    #[arg(long)]
    pub source_url: String,
    #[arg(long, default_value = "")]
    pub source_username: String,
    #[arg(long, default_value = "")]
    pub source_password: String,
    /// Root path within the source store to operate under
    #[arg(long, default_value = "/")]
    pub source_path: String,
}

#[derive(Debug, clap::Args)]
pub struct TargetArgs {
    /// Target store URL (Alist or WebDAV), for strm mode
    #[arg(long)]
    pub target_url: String,
    #[arg(long, default_value = "")]
    pub target_username: String,
    #[arg(long, default_value = "")]
    pub target_password: String,
    /// Root path within the target store to write under
    #[arg(long)]
    pub target_path: String,
}

/// Scan traversal flags.
#[derive(Debug, clap::Args)]
pub struct ScanArgs {
    /// Path under the source root to start scanning from
    #[arg(long)]
    pub path: Option<String>,
    #[arg(long, default_value_t = true)]
    pub recursive: bool,
    #[arg(long)]
    pub max_files: Option<usize>,
    #[arg(long)]
    pub max_depth: Option<u32>,
    #[arg(long)]
    pub scan_delay_s: Option<f64>,
}

/// Classification rule input: a path to a JSON file holding a
/// `Vec<MappingRule>`.
#[derive(Debug, clap::Args)]
pub struct ClassifyArgs {
    /// Path to a JSON file containing the mapping rules array
    #[arg(long)]
    pub rules: String,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Probe and authenticate a source store
    ConnectSource {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Probe and authenticate a target store (strm destination)
    ConnectTarget {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Scan a connected source store and print the inventory summary
    Scan {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Scan then classify against a set of mapping rules
    Classify {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        scan: ScanArgs,
        #[command(flatten)]
        classify: ClassifyArgs,
    },

    /// Scan, classify, and rename/move files in place on the source store
    Organize {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        scan: ScanArgs,
        #[command(flatten)]
        classify: ClassifyArgs,
        #[arg(long, value_enum)]
        naming_language: Option<CliNamingLanguage>,
    },

    /// Scan, classify, and emit `.strm` redirectors + subtitles on a target store
    GenerateStrm {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        scan: ScanArgs,
        #[command(flatten)]
        classify: ClassifyArgs,
        #[arg(long, value_enum)]
        naming_language: Option<CliNamingLanguage>,
    },

    /// Replay a failure list previously written by `generate-strm`
    RetryFailed {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        target: TargetArgs,
        /// Path to the JSON failure list (defaults to `failed_uploads.json`)
        #[arg(long, default_value = "failed_uploads.json")]
        failed_file: String,
    },

    /// Look up metadata candidates by title
    LookupMetadata {
        query: Vec<String>,
        #[arg(long, value_enum, default_value = "tv")]
        kind: CliKind,
    },

    /// Run the web API server
    Serve,

    /// Create a default config file
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
