//! Command-line interface definitions for Article Scout.
//!
//! Every option can come from a flag; the Supabase credentials also come
//! from the environment (or a `.env` file).

use crate::schedule::{DEFAULT_TAG, DEFAULT_WINDOW_MINUTES};
use crate::store::DEFAULT_STATE_FILE;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for Article Scout.
///
/// # Examples
///
/// ```sh
/// # Scheduled run against Supabase (credentials from .env)
/// article_scout
///
/// # Offline run: sources from a file, batch written as JSON
/// article_scout --sources-file sources.txt -j ./batches
///
/// # Clear pending queue rows
/// article_scout purge
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase service key
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// File holding the URLs already seen
    #[arg(short, long, default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,

    /// YAML file of per-domain rules (replaces the built-in set)
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Read source URLs from this file instead of Supabase
    #[arg(long)]
    pub sources_file: Option<PathBuf>,

    /// Write batches as JSON files here instead of to Supabase
    #[arg(short, long)]
    pub json_output_dir: Option<PathBuf>,

    /// Tag stamped on every scheduled record
    #[arg(long, default_value = DEFAULT_TAG)]
    pub tag: String,

    /// Minutes over which a batch is spread (at most one week)
    #[arg(long, default_value_t = DEFAULT_WINDOW_MINUTES, allow_negative_numbers = true)]
    pub window_minutes: i64,

    /// Shuffle the batch before assigning times
    #[arg(long)]
    pub shuffle: bool,

    /// Sources fetched at once
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Browsers running at once
    #[arg(long, default_value_t = 2)]
    pub render_concurrency: usize,

    /// What to do with a domain that has no rule
    #[arg(long, value_enum, default_value_t = MissingRule::Skip)]
    pub missing_rule_policy: MissingRule,

    /// Minimum path length under `--missing-rule-policy path-length`
    #[arg(long, default_value_t = 20)]
    pub fallback_min_path_len: usize,

    /// Record links as seen even if the queue write fails
    #[arg(long)]
    pub always_persist: bool,

    /// Fetch each new article's headline and drop links without one
    #[arg(long)]
    pub with_titles: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discover new articles and schedule them (default)
    Run,
    /// Delete pending rows from the queue
    Purge,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRule {
    Skip,
    PathLength,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["article_scout"]);

        assert_eq!(cli.command(), Command::Run);
        assert_eq!(cli.state_file, PathBuf::from("processed-urls.txt"));
        assert_eq!(cli.tag, "formula");
        assert_eq!(cli.window_minutes, 180);
        assert_eq!(cli.concurrency, 4);
        assert_eq!(cli.render_concurrency, 2);
        assert_eq!(cli.missing_rule_policy, MissingRule::Skip);
        assert!(!cli.shuffle && !cli.always_persist && !cli.with_titles);
    }

    #[test]
    fn test_cli_offline_flags() {
        let cli = Cli::parse_from([
            "article_scout",
            "--sources-file",
            "sources.txt",
            "-j",
            "/tmp/batches",
            "-s",
            "/tmp/seen.txt",
            "--missing-rule-policy",
            "path-length",
            "--shuffle",
        ]);

        assert_eq!(cli.sources_file, Some(PathBuf::from("sources.txt")));
        assert_eq!(cli.json_output_dir, Some(PathBuf::from("/tmp/batches")));
        assert_eq!(cli.state_file, PathBuf::from("/tmp/seen.txt"));
        assert_eq!(cli.missing_rule_policy, MissingRule::PathLength);
        assert!(cli.shuffle);
    }

    #[test]
    fn test_cli_purge_subcommand() {
        let cli = Cli::parse_from(["article_scout", "--tag", "rally", "purge"]);
        assert_eq!(cli.command(), Command::Purge);
        assert_eq!(cli.tag, "rally");
    }

    #[test]
    fn test_cli_rejects_unknown_policy() {
        assert!(Cli::try_parse_from(["article_scout", "--missing-rule-policy", "guess"]).is_err());
    }
}
