//! Optional headline annotation for new links.
//!
//! Reads each new article's `og:title` and formats it as
//! `"<title>" -<domain>` for the queue's `title` column. Links whose title
//! cannot be read are left out of the batch.

use crate::fetch::Fetch;
use crate::models::domain_of;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument, warn};

static OG_TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:title"]"#).expect("static selector parses")
});

/// The trimmed, non-empty `og:title` of a page, if any.
pub fn og_title(markup: &str) -> Option<String> {
    let document = Html::parse_document(markup);
    document
        .select(&OG_TITLE_SELECTOR)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(String::from)
}

/// `"<title>" -<domain>`
pub fn format_title(title: &str, url: &str) -> String {
    let publication = domain_of(url).unwrap_or_default();
    format!("\"{title}\" -{publication}")
}

/// Fetch titles for `links`, `concurrency` pages at a time.
///
/// Returns formatted titles keyed by link; untitled links are absent.
#[instrument(level = "info", skip_all, fields(count = links.len()))]
pub async fn fetch_titles<F: Fetch>(
    links: &BTreeSet<String>,
    fetcher: &F,
    concurrency: usize,
) -> BTreeMap<String, String> {
    let titled: BTreeMap<String, String> = stream::iter(links.iter())
        .map(|url| async move {
            match fetcher.fetch(url).await {
                Ok(markup) => match og_title(&markup) {
                    Some(title) => Some((url.clone(), format_title(&title, url))),
                    None => {
                        warn!(%url, "No og:title; dropping link from batch");
                        None
                    }
                },
                Err(e) => {
                    warn!(%url, error = %e, "Title fetch failed; dropping link from batch");
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(titled = titled.len(), dropped = links.len() - titled.len(), "Fetched titles");
    titled
}
