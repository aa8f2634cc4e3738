//! # Article Scout
//!
//! Discovers new motorsport news articles on a fixed list of source pages and
//! hands them to a downstream publishing queue, spread over a time window.
//!
//! ## Usage
//!
//! ```sh
//! # Credentials from the environment or .env
//! article_scout
//!
//! # Offline: sources from a file, batch written as JSON
//! article_scout --sources-file sources.txt -j ./batches
//! ```
//!
//! ## Architecture
//!
//! One run is a single pass:
//! 1. **Sources**: list entry pages from the registry
//! 2. **Fetching**: plain GET, or a headless browser for script-heavy sites
//! 3. **Classification**: extract anchors, normalize, keep article links per site rule
//! 4. **Dedup**: drop links already recorded in the seen-set file
//! 5. **Scheduling**: spread new links over the window and insert one batch
//! 6. **Persist**: record everything validated as seen

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod fetch;
mod links;
mod models;
mod pipeline;
mod queue;
mod rules;
mod schedule;
mod store;
mod titles;
mod utils;

use cli::{Cli, Command};
use config::Settings;
use error::ConfigError;
use fetch::light::{DEFAULT_TIMEOUT, LightFetcher};
use fetch::rendered::{RenderFetcher, RenderTimings};
use fetch::{Fetchers, StrategySelector};
use pipeline::{PersistPolicy, Pipeline, RunOutcome, RunSummary};
use queue::file::SourcesFile;
use queue::json::JsonDirQueue;
use queue::supabase::SupabaseClient;
use queue::{Registry, RetryQueue, Sink};
use store::SeenStore;
use utils::ensure_writable_dir;

const QUEUE_RETRIES: usize = 3;
const QUEUE_BASE_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("article_scout starting up");

    let args = Cli::parse();
    debug!(command = ?args.command(), ?args.state_file, ?args.sources_file, ?args.json_output_dir, "Parsed CLI arguments");

    let settings = match Settings::from_cli(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let supabase = match &settings.supabase {
        Some(creds) => Some(SupabaseClient::new(&creds.url, &creds.key)?),
        None => None,
    };

    if settings.command == Command::Purge {
        let client = supabase.ok_or(ConfigError::MissingEnv("SUPABASE_URL"))?;
        if let Err(e) = client.purge_queue().await {
            error!(error = %e, "Failed to purge queue");
            return Err(e.into());
        }
        info!("Queue purged");
        return Ok(());
    }

    // Early checks: every directory the run writes into must be writable.
    let state_dir = settings
        .state_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if let Err(e) = ensure_writable_dir(state_dir).await {
        error!(
            path = %state_dir.display(),
            error = %e,
            "State directory is not writable (fix perms or choose a different --state-file)"
        );
        return Err(e);
    }
    if let Some(dir) = &settings.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir.display(), error = %e, "JSON output directory is not writable");
            return Err(e);
        }
    }

    let registry = match (&settings.sources_file, &supabase) {
        (Some(path), _) => Registry::File(SourcesFile::new(path)),
        (None, Some(client)) => Registry::Supabase(client.clone()),
        (None, None) => return Err(ConfigError::MissingEnv("SUPABASE_URL").into()),
    };
    let sink = match (&settings.json_output_dir, supabase) {
        (Some(dir), _) => Sink::Json(JsonDirQueue::new(dir)),
        (None, Some(client)) => {
            Sink::Supabase(RetryQueue::new(client, QUEUE_RETRIES, QUEUE_BASE_DELAY))
        }
        (None, None) => return Err(ConfigError::MissingEnv("SUPABASE_URL").into()),
    };
    info!(?registry, ?sink, state_file = %settings.state_file.display(), "Collaborators ready");

    let fetchers = Fetchers {
        light: LightFetcher::new(DEFAULT_TIMEOUT)?,
        rendered: RenderFetcher::new(RenderTimings::default(), settings.render_concurrency),
        selector: StrategySelector::default(),
    };

    let persist = settings.run.persist;
    let pipeline = Pipeline::new(
        registry,
        sink,
        fetchers,
        settings.rules,
        SeenStore::new(&settings.state_file),
        settings.run,
    );

    let summary = match pipeline.run(Utc::now()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Run aborted");
            return Err(e.into());
        }
    };

    report(&summary, persist);

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    if let Some(e) = summary.persist_error {
        return Err(e.into());
    }
    if let RunOutcome::QueueFailed { error } = summary.outcome {
        return Err(format!("queue write failed: {error}").into());
    }
    Ok(())
}

fn report(summary: &RunSummary, persist: PersistPolicy) {
    info!(
        sources = summary.sources,
        failed = summary.failed_sources.len(),
        skipped_domains = summary.skipped_domains.len(),
        validated = summary.validated,
        new = summary.new_links,
        persisted = summary.persisted,
        "Run summary"
    );
    for url in &summary.failed_sources {
        warn!(%url, "Source contributed nothing (fetch failed)");
    }
    if !summary.skipped_domains.is_empty() {
        warn!(domains = %summary.skipped_domains.join(", "), "Domains without a rule were skipped");
    }
    if !summary.fallback_domains.is_empty() {
        warn!(
            domains = %summary.fallback_domains.join(", "),
            "Domains without a rule were classified by path length"
        );
    }

    match &summary.outcome {
        RunOutcome::NoSources => info!("No sources configured"),
        RunOutcome::NothingNew => info!("No new articles"),
        RunOutcome::Emitted { accepted } => {
            let first = summary.records.first().map(|r| r.scheduled_time);
            let last = summary.records.last().map(|r| r.scheduled_time);
            info!(accepted, ?first, ?last, "Scheduled new articles");
        }
        RunOutcome::QueueFailed { error } => match persist {
            PersistPolicy::Always => error!(
                %error,
                lost = summary.records.len(),
                "Queue write failed; these links were recorded as seen and will NOT be retried"
            ),
            PersistPolicy::AfterQueueSuccess => error!(
                %error,
                pending = summary.records.len(),
                "Queue write failed; links will be retried next run"
            ),
        },
    }
}
