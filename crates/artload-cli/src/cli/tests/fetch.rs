use super::parse;
use crate::cli::{Cli, CliCommand};
use artload_core::request::Priority;
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_fetch_defaults() {
    match parse(&["artload", "fetch", "https://a.test/1.png", "https://a.test/2.png"]) {
        CliCommand::Fetch {
            urls,
            priority,
            from_file,
            cache_dir,
        } => {
            assert_eq!(urls, vec!["https://a.test/1.png", "https://a.test/2.png"]);
            assert_eq!(priority, Priority::Normal);
            assert!(from_file.is_none());
            assert!(cache_dir.is_none());
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_fetch_options() {
    match parse(&[
        "artload",
        "fetch",
        "--priority",
        "Critical",
        "--from-file",
        "urls.txt",
        "--cache-dir",
        "/tmp/art",
    ]) {
        CliCommand::Fetch {
            urls,
            priority,
            from_file,
            cache_dir,
        } => {
            assert!(urls.is_empty());
            assert_eq!(priority, Priority::Critical);
            assert_eq!(from_file, Some(PathBuf::from("urls.txt")));
            assert_eq!(cache_dir, Some(PathBuf::from("/tmp/art")));
        }
        _ => panic!("expected Fetch with options"),
    }
}

#[test]
fn cli_parse_fetch_rejects_unknown_priority() {
    assert!(Cli::try_parse_from(["artload", "fetch", "--priority", "urgent", "x"]).is_err());
}
