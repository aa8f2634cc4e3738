//! Link extraction and URL normalization.
//!
//! Every href found on a source page is reduced to `scheme://host[:port]/path`
//! with no query, fragment, userinfo or trailing slash. Two hrefs that reduce
//! to the same string are the same article everywhere downstream.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use tracing::{debug, instrument};
use url::Url;

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector parses"));

/// Resolve `href` against `base_url` and reduce it to its canonical form.
///
/// Never fails. If the base does not parse, `href` is tried as an absolute
/// URL. An empty href, or one that cannot be resolved at all (such as a bare
/// `https://`), yields an empty string, which [`extract`] drops. Other nonsensical results
/// are left for the rule engine to reject.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     normalize("/f1/news/x-1/?utm=a#top", "https://motorsport.com"),
///     "https://motorsport.com/f1/news/x-1"
/// );
/// ```
pub fn normalize(href: &str, base_url: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    let resolved = match Url::parse(base_url) {
        Ok(base) => base.join(href),
        Err(_) => Url::parse(href),
    };

    match resolved {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            // Only fails for cannot-be-a-base URLs, which carry no userinfo.
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => String::new(),
    }
}

/// The origin (`scheme://host[:port]`) of a source URL, used as the base for
/// resolving its hrefs. Falls back to the URL itself when it does not parse.
pub fn origin_of(source_url: &str) -> String {
    match Url::parse(source_url) {
        Ok(url) if url.has_host() => url.origin().ascii_serialization(),
        _ => source_url.to_string(),
    }
}

/// Collect every anchor href in `markup`, normalized against `base_url`.
///
/// Anchors without an `href` are ignored. `html5ever` recovers from broken
/// markup, so a malformed page yields whatever anchors could be parsed.
#[instrument(level = "debug", skip(markup), fields(bytes = markup.len()))]
pub fn extract(markup: &str, base_url: &str) -> BTreeSet<String> {
    let document = Html::parse_document(markup);
    let links: BTreeSet<String> = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| normalize(href, base_url))
        .filter(|link| !link.is_empty())
        .collect();

    debug!(count = links.len(), "Extracted links");
    links
}
