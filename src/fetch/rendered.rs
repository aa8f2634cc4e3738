//! Browser-rendered fetching with `chromiumoxide`.
//!
//! Every fetch launches its own headless Chromium with a throwaway profile
//! directory, captures the rendered DOM of one page and shuts the browser
//! down again. The shutdown runs on every exit path of the capture (success,
//! navigation error, timeout), so no browser process outlives its fetch.
//!
//! # Capture sequence
//!
//! 1. open `about:blank` and set the desktop user agent
//! 2. navigate until the DOM is ready (`readyState` past `loading` on an
//!    http(s) document) or the load event fires, bounded by `nav_timeout`
//!    (30 s); slow subresources do not hold up the capture
//! 3. poll for the `body` marker, bounded by `marker_timeout` (15 s)
//! 4. sleep `settle` (3 s) for late-loading link lists
//! 5. read `page.content()`

use super::{Fetch, USER_AGENT};
use crate::error::FetchError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, instrument, warn};

/// Timing knobs for a render.
#[derive(Debug, Clone)]
pub struct RenderTimings {
    pub nav_timeout: Duration,
    pub marker_timeout: Duration,
    pub settle: Duration,
}

impl Default for RenderTimings {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(30),
            marker_timeout: Duration::from_secs(15),
            settle: Duration::from_secs(3),
        }
    }
}

const CONTENT_MARKER: &str = "body";
const MARKER_POLL: Duration = Duration::from_millis(250);
const READY_STATE_JS: &str = "[document.readyState, location.href]";

/// Renders pages in short-lived headless browsers, at most `max_browsers`
/// at a time.
#[derive(Debug)]
pub struct RenderFetcher {
    timings: RenderTimings,
    permits: Semaphore,
}

impl RenderFetcher {
    pub fn new(timings: RenderTimings, max_browsers: usize) -> Self {
        Self {
            timings,
            permits: Semaphore::new(max_browsers.max(1)),
        }
    }
}

impl Fetch for RenderFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        let session = BrowserSession::launch(self.timings.nav_timeout).await?;
        let result = session.capture(url, &self.timings).await;
        session.shutdown().await;
        result
    }
}

fn browser_err(e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(e.to_string())
}

/// One isolated Chromium process and the task pumping its CDP events.
struct BrowserSession {
    browser: Browser,
    events: JoinHandle<()>,
    // Removed from disk when the session is dropped.
    _profile: tempfile::TempDir,
}

impl BrowserSession {
    async fn launch(request_timeout: Duration) -> Result<Self, FetchError> {
        let profile = tempfile::Builder::new()
            .prefix("article-scout-")
            .tempdir()
            .map_err(browser_err)?;

        let config = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(request_timeout)
            .user_data_dir(profile.path())
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .build()
            .map_err(FetchError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        debug!(profile = %profile.path().display(), "Launched headless browser");

        Ok(Self {
            browser,
            events,
            _profile: profile,
        })
    }

    async fn capture(&self, url: &str, timings: &RenderTimings) -> Result<String, FetchError> {
        let page = self.browser.new_page("about:blank").await.map_err(browser_err)?;
        page.set_user_agent(USER_AGENT).await.map_err(browser_err)?;

        navigate(&page, url, timings.nav_timeout).await?;
        wait_for_marker(&page, timings.marker_timeout).await?;
        sleep(timings.settle).await;

        let html = page.content().await.map_err(browser_err)?;
        if html.trim().is_empty() {
            return Err(FetchError::Empty);
        }
        debug!(bytes = html.len(), "Captured rendered page");
        Ok(html)
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser close failed; killing process");
            if let Some(Err(e)) = self.browser.kill().await {
                warn!(error = %e, "Browser kill failed");
            }
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Waiting for browser exit failed");
        }
        self.events.abort();
    }
}

/// Start navigating and return once the new document is DOM-ready, without
/// waiting for its load event.
async fn navigate(page: &Page, url: &str, limit: Duration) -> Result<(), FetchError> {
    let raced = async {
        tokio::select! {
            loaded = page.goto(url) => loaded.map(|_| ()).map_err(browser_err),
            () = wait_for_dom_ready(page) => Ok(()),
        }
    };
    timeout(limit, raced)
        .await
        .map_err(|_| FetchError::Timeout(limit, "navigating"))?
}

async fn wait_for_dom_ready(page: &Page) {
    loop {
        // Evaluation fails while the old context is torn down; keep polling.
        let state = match page.evaluate(READY_STATE_JS).await {
            Ok(result) => result.into_value::<(String, String)>().ok(),
            Err(_) => None,
        };
        if state.is_some_and(|(ready_state, href)| dom_ready(&ready_state, &href)) {
            return;
        }
        sleep(MARKER_POLL).await;
    }
}

/// The navigated document has parsed. `about:blank` and Chromium's error
/// pages never count.
fn dom_ready(ready_state: &str, href: &str) -> bool {
    let http = href.starts_with("http://") || href.starts_with("https://");
    http && matches!(ready_state, "interactive" | "complete")
}

async fn wait_for_marker(page: &Page, limit: Duration) -> Result<(), FetchError> {
    let deadline = Instant::now() + limit;
    loop {
        if page.find_element(CONTENT_MARKER).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(FetchError::Timeout(limit, "waiting for page content"));
        }
        sleep(MARKER_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let timings = RenderTimings::default();
        assert_eq!(timings.nav_timeout, Duration::from_secs(30));
        assert_eq!(timings.marker_timeout, Duration::from_secs(15));
        assert_eq!(timings.settle, Duration::from_secs(3));
    }

    #[test]
    fn test_dom_ready_before_load() {
        assert!(dom_ready("interactive", "https://www.bbc.co.uk/sport/formula1"));
        assert!(dom_ready("complete", "https://www.formula1.com/en/latest"));
        assert!(!dom_ready("loading", "https://www.bbc.co.uk/sport/formula1"));
    }

    #[test]
    fn test_dom_ready_ignores_blank_and_error_pages() {
        assert!(!dom_ready("complete", "about:blank"));
        assert!(!dom_ready("complete", "chrome-error://chromewebdata/"));
    }

    #[tokio::test]
    async fn test_permits_never_zero() {
        let fetcher = RenderFetcher::new(RenderTimings::default(), 0);
        assert_eq!(fetcher.permits.available_permits(), 1);
    }
}
