//! One discovery run, end to end.
//!
//! ```text
//! registry ─► sources ─► [fetch ─► extract ─► classify] × N ─► validated set
//!                                                                 │
//!                       seen set (file) ◄─── persist ◄─┐          ▼
//!                                                      └── diff ─► schedule ─► queue
//! ```
//!
//! Sources are scanned concurrently (bounded by `concurrency`) and fail
//! independently. The diff only runs once every scan has finished, so a run
//! never emits from a partial view of what it found.

use crate::error::RunError;
use crate::fetch::{Fetch, Fetchers, Strategy};
use crate::links::{extract, origin_of};
use crate::models::{ScheduledRecord, Source};
use crate::queue::{RecordQueue, SourceRegistry};
use crate::rules::RuleBook;
use crate::schedule::{self, Order};
use crate::store::{self, SeenSet, SeenStore};
use crate::titles;
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use tracing::{error, info, instrument, warn};

/// When the SeenSet may be advanced relative to the queue write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistPolicy {
    /// Only after the queue accepted the batch. A failed write leaves the
    /// links unseen so the next run emits them again (at-least-once).
    #[default]
    AfterQueueSuccess,
    /// Even if the queue write failed. Links from a failed write are
    /// recorded as seen and never retried (at-most-once).
    Always,
}

/// Knobs for a run that do not come from collaborators.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub tag: String,
    pub window: TimeDelta,
    pub order: Order,
    pub concurrency: usize,
    pub persist: PersistPolicy,
    pub with_titles: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tag: schedule::DEFAULT_TAG.to_string(),
            window: TimeDelta::minutes(schedule::DEFAULT_WINDOW_MINUTES),
            order: Order::default(),
            concurrency: 4,
            persist: PersistPolicy::default(),
            with_titles: false,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The registry returned nothing; no side effects.
    NoSources,
    /// Every validated link was already seen (or none kept a title).
    NothingNew,
    /// The queue accepted the batch.
    Emitted { accepted: usize },
    /// The queue write failed after retries.
    QueueFailed { error: String },
}

/// What a run did, for the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sources: usize,
    pub failed_sources: Vec<String>,
    pub skipped_domains: Vec<String>,
    /// Domains without a rule classified by the path-length heuristic.
    pub fallback_domains: Vec<String>,
    pub validated: usize,
    pub new_links: usize,
    pub records: Vec<ScheduledRecord>,
    pub outcome: RunOutcome,
    /// Whether the SeenSet file was rewritten.
    pub persisted: bool,
    pub persist_error: Option<String>,
}

impl RunSummary {
    fn empty(outcome: RunOutcome) -> Self {
        Self {
            sources: 0,
            failed_sources: Vec::new(),
            skipped_domains: Vec::new(),
            fallback_domains: Vec::new(),
            validated: 0,
            new_links: 0,
            records: Vec::new(),
            outcome,
            persisted: false,
            persist_error: None,
        }
    }
}

/// Result of scanning one source.
enum Scan {
    Valid(BTreeSet<String>),
    Failed(String),
    NoRule,
}

pub struct Pipeline<S, Q, L, R> {
    registry: S,
    queue: Q,
    fetchers: Fetchers<L, R>,
    rules: RuleBook,
    store: SeenStore,
    options: RunOptions,
}

impl<S, Q, L, R> Pipeline<S, Q, L, R>
where
    S: SourceRegistry,
    Q: RecordQueue,
    L: Fetch,
    R: Fetch,
{
    pub fn new(
        registry: S,
        queue: Q,
        fetchers: Fetchers<L, R>,
        rules: RuleBook,
        store: SeenStore,
        options: RunOptions,
    ) -> Self {
        Self {
            registry,
            queue,
            fetchers,
            rules,
            store,
            options,
        }
    }

    /// Run one full discovery pass; `now` is the first schedule slot.
    #[instrument(level = "info", skip(self), fields(tag = %self.options.tag))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, RunError> {
        let urls = self
            .registry
            .list_sources()
            .await
            .map_err(RunError::Registry)?;
        if urls.is_empty() {
            info!("No sources; nothing to do");
            return Ok(RunSummary::empty(RunOutcome::NoSources));
        }

        // Read state before fetching: an unreadable SeenSet would make every
        // link look new.
        let seen = self.store.load().await?;

        let mut summary = RunSummary::empty(RunOutcome::NothingNew);
        summary.sources = urls.len();

        let mut sources = Vec::with_capacity(urls.len());
        for url in &urls {
            match Source::parse(url) {
                Some(source) => sources.push(source),
                None => {
                    warn!(%url, "Source has no host; skipping");
                    summary.failed_sources.push(url.clone());
                }
            }
        }

        let unruled: BTreeSet<&str> = sources
            .iter()
            .map(|source| source.domain.as_str())
            .filter(|domain| self.rules.skips(domain) || self.rules.uses_fallback(domain))
            .collect();
        for domain in unruled {
            if self.rules.skips(domain) {
                warn!(%domain, "No rule for domain; skipping");
                summary.skipped_domains.push(domain.to_string());
            } else {
                warn!(%domain, "No rule for domain; using path-length heuristic");
                summary.fallback_domains.push(domain.to_string());
            }
        }

        let scans: Vec<Scan> = stream::iter(sources.iter())
            .map(|source| self.scan(source))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut validated = BTreeSet::new();
        for scan in scans {
            match scan {
                Scan::Valid(links) => validated.extend(links),
                Scan::Failed(url) => summary.failed_sources.push(url),
                Scan::NoRule => {}
            }
        }
        summary.failed_sources.sort();
        summary.validated = validated.len();

        let new_links = store::diff(&validated, &seen);
        summary.new_links = new_links.len();
        info!(
            validated = validated.len(),
            new = new_links.len(),
            failed_sources = summary.failed_sources.len(),
            "Scanned all sources"
        );

        let cumulative: SeenSet = seen.union(&validated).cloned().collect();

        if new_links.is_empty() {
            info!("No new articles; all found links were seen before");
            self.persist(&cumulative, &mut summary).await;
            return Ok(summary);
        }

        let records = self.schedule(&new_links, now).await;
        if records.is_empty() {
            warn!("No new link kept a title; nothing to emit");
            self.persist(&cumulative, &mut summary).await;
            return Ok(summary);
        }

        info!(count = records.len(), "Writing batch to queue");
        summary.outcome = match self.queue.insert_batch(&records).await {
            Ok(accepted) => {
                info!(accepted, "Queue accepted batch");
                RunOutcome::Emitted { accepted }
            }
            Err(e) => {
                error!(error = %e, "Queue write failed");
                RunOutcome::QueueFailed {
                    error: e.to_string(),
                }
            }
        };
        summary.records = records;

        let queue_failed = matches!(summary.outcome, RunOutcome::QueueFailed { .. });
        match (queue_failed, self.options.persist) {
            (false, _) => self.persist(&cumulative, &mut summary).await,
            (true, PersistPolicy::Always) => {
                warn!(
                    lost = summary.records.len(),
                    "Recording links as seen although the queue write failed; they will not be retried"
                );
                self.persist(&cumulative, &mut summary).await;
            }
            (true, PersistPolicy::AfterQueueSuccess) => {
                warn!("Seen set not advanced; the new links will be retried next run");
            }
        }

        Ok(summary)
    }

    /// Fetch, extract and classify one source.
    #[instrument(level = "info", skip_all, fields(domain = %source.domain))]
    async fn scan(&self, source: &Source) -> Scan {
        if self.rules.skips(&source.domain) {
            return Scan::NoRule;
        }

        let (strategy, fetched) = self.fetchers.fetch_source(source).await;
        let markup = match fetched {
            Ok(markup) => markup,
            Err(e) => {
                error!(url = %source.url, %strategy, error = %e, "Could not fetch source");
                return Scan::Failed(source.url.clone());
            }
        };
        if strategy == Strategy::Rendered {
            info!(bytes = markup.len(), "Rendered source");
        }

        let found = extract(&markup, &origin_of(&source.url));
        let valid = self
            .rules
            .validate(&source.domain, &found)
            .unwrap_or_default();
        info!(found = found.len(), valid = valid.len(), "Classified links");
        Scan::Valid(valid)
    }

    async fn schedule(&self, new_links: &BTreeSet<String>, now: DateTime<Utc>) -> Vec<ScheduledRecord> {
        let opts = &self.options;
        if !opts.with_titles {
            return schedule::assign(new_links, opts.window, &opts.tag, opts.order, now);
        }

        let titled = titles::fetch_titles(new_links, &self.fetchers.light, opts.concurrency).await;
        let keep: BTreeSet<String> = titled.keys().cloned().collect();
        let mut records = schedule::assign(&keep, opts.window, &opts.tag, opts.order, now);
        for record in &mut records {
            record.title = titled.get(&record.url).cloned();
        }
        records
    }

    async fn persist(&self, cumulative: &SeenSet, summary: &mut RunSummary) {
        match self.store.save(cumulative).await {
            Ok(()) => summary.persisted = true,
            Err(e) => {
                error!(error = %e, "Failed to persist seen set");
                summary.persist_error = Some(e.to_string());
            }
        }
    }
}
