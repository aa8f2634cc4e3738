//! Page fetching for source entry pages.
//!
//! Two strategies exist and the choice is static per domain:
//!
//! | Strategy | Module | Client | Timeout |
//! |----------|--------|--------|---------|
//! | [`Strategy::Light`] | [`light`] | `reqwest` GET | 15 s |
//! | [`Strategy::Rendered`] | [`rendered`] | headless Chromium | 30 s navigation |
//!
//! A domain on the render allow-list always renders; everything else always
//! uses a plain GET. There is no fallback from one strategy to the other
//! within a run: a failed fetch is a failed source.

pub mod light;
pub mod rendered;

use crate::error::FetchError;
use crate::models::Source;
use std::fmt;
use tracing::{debug, instrument};

/// Sites whose article links only appear after client-side rendering.
pub const RENDERED_SITES: &[&str] = &["f1oversteer.com", "racefans.net", "bbc.co.uk", "formula1.com"];

/// Desktop Chrome user agent sent by both strategies.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Anything that turns a URL into markup.
///
/// Implemented by [`light::LightFetcher`] and [`rendered::RenderFetcher`];
/// tests substitute canned doubles.
pub trait Fetch {
    /// Fetch `url` and return its markup.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Light,
    Rendered,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Light => f.write_str("light"),
            Strategy::Rendered => f.write_str("rendered"),
        }
    }
}

/// Static per-domain choice between a plain GET and a browser render.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    rendered_sites: Vec<String>,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(RENDERED_SITES.iter().map(|s| s.to_string()))
    }
}

impl StrategySelector {
    pub fn new(rendered_sites: impl IntoIterator<Item = String>) -> Self {
        Self {
            rendered_sites: rendered_sites.into_iter().collect(),
        }
    }

    /// A domain renders when it is, or is a subdomain of, a listed site.
    pub fn strategy_for(&self, domain: &str) -> Strategy {
        let listed = self.rendered_sites.iter().any(|site| {
            domain == site
                || domain
                    .strip_suffix(site.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        });
        if listed {
            Strategy::Rendered
        } else {
            Strategy::Light
        }
    }
}

/// Both fetch clients plus the selector that routes between them.
pub struct Fetchers<L, R> {
    pub light: L,
    pub rendered: R,
    pub selector: StrategySelector,
}

impl<L, R> Fetchers<L, R>
where
    L: Fetch,
    R: Fetch,
{
    /// Fetch a source's entry page with the strategy its domain requires.
    #[instrument(level = "info", skip_all, fields(domain = %source.domain))]
    pub async fn fetch_source(&self, source: &Source) -> (Strategy, Result<String, FetchError>) {
        let strategy = self.selector.strategy_for(&source.domain);
        debug!(%strategy, url = %source.url, "Fetching source");
        let result = match strategy {
            Strategy::Light => self.light.fetch(&source.url).await,
            Strategy::Rendered => self.rendered.fetch(&source.url).await,
        };
        (strategy, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_default_selector() {
        let selector = StrategySelector::default();
        assert_eq!(selector.strategy_for("bbc.co.uk"), Strategy::Rendered);
        assert_eq!(selector.strategy_for("formula1.com"), Strategy::Rendered);
        assert_eq!(selector.strategy_for("motorsport.com"), Strategy::Light);
        assert_eq!(selector.strategy_for("it.motorsport.com"), Strategy::Light);
    }

    #[test]
    fn test_subdomains_follow_their_site() {
        let selector = StrategySelector::default();
        assert_eq!(selector.strategy_for("m.racefans.net"), Strategy::Rendered);
        assert_eq!(selector.strategy_for("notracefans.net"), Strategy::Light);
    }

    struct Recorder {
        name: &'static str,
        calls: RefCell<Vec<String>>,
    }

    impl Fetch for Recorder {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.borrow_mut().push(url.to_string());
            Ok(self.name.to_string())
        }
    }

    fn recorder(name: &'static str) -> Recorder {
        Recorder {
            name,
            calls: RefCell::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_fetchers_route_by_domain() {
        let fetchers = Fetchers {
            light: recorder("light"),
            rendered: recorder("rendered"),
            selector: StrategySelector::default(),
        };

        let bbc = Source::parse("https://www.bbc.co.uk/sport/formula1").unwrap();
        let (strategy, body) = fetchers.fetch_source(&bbc).await;
        assert_eq!(strategy, Strategy::Rendered);
        assert_eq!(body.unwrap(), "rendered");

        let sky = Source::parse("https://www.skysports.com/f1/news").unwrap();
        let (strategy, body) = fetchers.fetch_source(&sky).await;
        assert_eq!(strategy, Strategy::Light);
        assert_eq!(body.unwrap(), "light");

        assert_eq!(*fetchers.light.calls.borrow(), vec!["https://www.skysports.com/f1/news"]);
        assert_eq!(*fetchers.rendered.calls.borrow(), vec!["https://www.bbc.co.uk/sport/formula1"]);
    }
}
