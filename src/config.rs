//! Resolved run settings.
//!
//! [`Settings::from_cli`] turns raw arguments into validated values so that
//! every configuration problem surfaces before the first fetch.

use crate::cli::{Cli, Command, MissingRule};
use crate::error::ConfigError;
use crate::pipeline::{PersistPolicy, RunOptions};
use crate::rules::{MissingRulePolicy, RuleBook};
use crate::schedule::{MAX_WINDOW_MINUTES, Order};
use chrono::TimeDelta;
use std::path::PathBuf;
use tracing::{info, instrument};
use url::Url;

#[derive(Debug, Clone)]
pub struct SupabaseCredentials {
    pub url: String,
    pub key: String,
}

#[derive(Debug)]
pub struct Settings {
    pub command: Command,
    /// Present whenever the registry or the queue is Supabase-backed.
    pub supabase: Option<SupabaseCredentials>,
    pub state_file: PathBuf,
    pub sources_file: Option<PathBuf>,
    pub json_output_dir: Option<PathBuf>,
    pub rules: RuleBook,
    pub run: RunOptions,
    pub render_concurrency: usize,
}

impl Settings {
    #[instrument(level = "debug", skip_all)]
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let command = cli.command();
        let needs_supabase = command == Command::Purge
            || cli.sources_file.is_none()
            || cli.json_output_dir.is_none();
        let supabase = if needs_supabase {
            Some(supabase_credentials(cli)?)
        } else {
            None
        };

        let window = (0..=MAX_WINDOW_MINUTES)
            .contains(&cli.window_minutes)
            .then(|| TimeDelta::try_minutes(cli.window_minutes))
            .flatten()
            .ok_or_else(|| ConfigError::Invalid {
                name: "window-minutes",
                reason: format!(
                    "must be between 0 and {MAX_WINDOW_MINUTES}, got {}",
                    cli.window_minutes
                ),
            })?;
        if cli.concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if cli.render_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "render-concurrency",
                reason: "must be at least 1".into(),
            });
        }

        let missing = match cli.missing_rule_policy {
            MissingRule::Skip => MissingRulePolicy::Skip,
            MissingRule::PathLength => MissingRulePolicy::PathLength {
                min_len: cli.fallback_min_path_len,
            },
        };
        let rules = match &cli.rules {
            Some(path) => RuleBook::load(path, missing)?,
            None => RuleBook::builtin().with_missing_policy(missing),
        };
        if rules.is_empty() && missing == MissingRulePolicy::Skip {
            return Err(ConfigError::Invalid {
                name: "rules",
                reason: "no domain rules and missing-rule policy is skip".into(),
            });
        }
        info!(domains = rules.len(), policy = ?rules.missing_policy(), "Loaded site rules");

        let run = RunOptions {
            tag: cli.tag.clone(),
            window,
            order: if cli.shuffle { Order::Shuffled } else { Order::Sorted },
            concurrency: cli.concurrency,
            persist: if cli.always_persist {
                PersistPolicy::Always
            } else {
                PersistPolicy::AfterQueueSuccess
            },
            with_titles: cli.with_titles,
        };

        Ok(Self {
            command,
            supabase,
            state_file: cli.state_file.clone(),
            sources_file: cli.sources_file.clone(),
            json_output_dir: cli.json_output_dir.clone(),
            rules,
            run,
            render_concurrency: cli.render_concurrency,
        })
    }
}

fn supabase_credentials(cli: &Cli) -> Result<SupabaseCredentials, ConfigError> {
    let url = cli
        .supabase_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::MissingEnv("SUPABASE_URL"))?;
    let key = cli
        .supabase_key
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::MissingEnv("SUPABASE_KEY"))?;

    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => {
            return Err(ConfigError::InvalidUrl {
                name: "SUPABASE_URL",
                value: url.to_string(),
            });
        }
    }

    Ok(SupabaseCredentials {
        url: url.to_string(),
        key: key.to_string(),
    })
}
