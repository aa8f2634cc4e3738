//! Plain HTTP fetching with `reqwest`.
//!
//! One GET per source with a desktop browser user agent and the usual
//! `Accept` headers. Non-2xx statuses, transport errors and the 15 s timeout
//! all surface as [`FetchError::Http`].

use super::{Fetch, USER_AGENT};
use crate::error::FetchError;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the shared HTTP client: browser user agent, HTML accept headers,
/// compressed transfer decoding and a whole-request timeout.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
}

#[derive(Debug, Clone)]
pub struct LightFetcher {
    client: Client,
}

impl LightFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

impl Fetch for LightFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::Empty);
        }
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_body_and_sends_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f1/news/"))
            .and(header_regex("user-agent", "Chrome/108"))
            .and(header_regex("accept-language", "en-US"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<a href=\"/f1/news/x\">x</a>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = LightFetcher::new(DEFAULT_TIMEOUT).unwrap();
        let body = fetcher
            .fetch(&format!("{}/f1/news/", server.uri()))
            .await
            .unwrap();
        assert!(body.contains("/f1/news/x"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = LightFetcher::new(DEFAULT_TIMEOUT).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        match err {
            FetchError::Http(e) => assert_eq!(e.status().map(|s| s.as_u16()), Some(503)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = LightFetcher::new(Duration::from_millis(50)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        match err {
            FetchError::Http(e) => assert!(e.is_timeout()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blank_body_is_empty_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("   \n"))
            .mount(&server)
            .await;

        let fetcher = LightFetcher::new(DEFAULT_TIMEOUT).unwrap();
        assert!(matches!(
            fetcher.fetch(&server.uri()).await,
            Err(FetchError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_error() {
        let fetcher = LightFetcher::new(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            fetcher.fetch("http://127.0.0.1:1/").await,
            Err(FetchError::Http(_))
        ));
    }
}
