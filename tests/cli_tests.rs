//! Argument-parsing coverage for every subcommand. Execution is covered
//! indirectly: each `cmd_*` function delegates to the same
//! [`mediatree::orchestrator::Orchestrator`] methods already exercised in
//! that module's own tests.

use clap::Parser;
use mediatree::cli::{Cli, Commands};

fn parse(args: &[&str]) -> Cli {
    let mut full = vec!["mediatree"];
    full.extend_from_slice(args);
    Cli::try_parse_from(full).expect("args should parse")
}

#[test]
fn no_subcommand_is_allowed() {
    let cli = Cli::try_parse_from(["mediatree"]).unwrap();
    assert!(cli.command.is_none());
}

#[test]
fn connect_source_requires_url_but_defaults_path_and_creds() {
    let cli = parse(&["connect-source", "--source-url", "http://alist.local"]);
    match cli.command.unwrap() {
        Commands::ConnectSource { source } => {
            assert_eq!(source.source_url, "http://alist.local");
            assert_eq!(source.source_path, "/");
            assert_eq!(source.source_username, "");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn connect_source_without_url_fails() {
    assert!(Cli::try_parse_from(["mediatree", "connect-source"]).is_err());
}

#[test]
fn scan_flattens_source_and_scan_flags() {
    let cli = parse(&[
        "scan",
        "--source-url",
        "http://alist.local",
        "--path",
        "/anime",
        "--max-files",
        "500",
        "--recursive",
        "false",
    ]);
    match cli.command.unwrap() {
        Commands::Scan { source, scan } => {
            assert_eq!(source.source_url, "http://alist.local");
            assert_eq!(scan.path.as_deref(), Some("/anime"));
            assert_eq!(scan.max_files, Some(500));
            assert!(!scan.recursive);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn scan_recursive_defaults_true() {
    let cli = parse(&["scan", "--source-url", "http://alist.local"]);
    match cli.command.unwrap() {
        Commands::Scan { scan, .. } => assert!(scan.recursive),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn generate_strm_requires_target_path_but_not_target_creds() {
    let cli = parse(&[
        "generate-strm",
        "--source-url",
        "http://alist.local",
        "--target-url",
        "http://webdav.local",
        "--target-path",
        "/strm",
        "--rules",
        "rules.json",
    ]);
    match cli.command.unwrap() {
        Commands::GenerateStrm { target, classify, .. } => {
            assert_eq!(target.target_path, "/strm");
            assert_eq!(classify.rules, "rules.json");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn generate_strm_without_target_path_fails() {
    assert!(
        Cli::try_parse_from([
            "mediatree",
            "generate-strm",
            "--source-url",
            "http://alist.local",
            "--target-url",
            "http://webdav.local",
            "--rules",
            "rules.json",
        ])
        .is_err()
    );
}

#[test]
fn retry_failed_defaults_failed_file() {
    let cli = parse(&[
        "retry-failed",
        "--source-url",
        "http://alist.local",
        "--target-url",
        "http://webdav.local",
        "--target-path",
        "/strm",
    ]);
    match cli.command.unwrap() {
        Commands::RetryFailed { failed_file, .. } => {
            assert_eq!(failed_file, "failed_uploads.json");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn lookup_metadata_defaults_to_tv_and_joins_query_words() {
    let cli = parse(&["lookup-metadata", "Attack", "on", "Titan"]);
    match cli.command.unwrap() {
        Commands::LookupMetadata { query, kind } => {
            assert_eq!(query, vec!["Attack", "on", "Titan"]);
            assert!(matches!(kind, mediatree::cli::CliKind::Tv));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn init_accepts_its_legacy_alias() {
    let cli = Cli::try_parse_from(["mediatree", "--init"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Init)));
}

#[test]
fn serve_takes_no_arguments() {
    let cli = Cli::try_parse_from(["mediatree", "serve"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Serve)));
}
