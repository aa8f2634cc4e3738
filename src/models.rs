//! Data models shared across the pipeline.
//!
//! - [`Source`]: an entry page to scan, with its [`domain_of`] join key
//! - [`ScheduledRecord`]: a new article link bound for the downstream queue
//! - [`SourceRow`]: a row of the registry's `sources` table
//!
//! Normalized and validated links are plain `String`s held in `BTreeSet`s;
//! see [`crate::links`] for what makes a link canonical.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// The domain key for a URL: its host with a leading `www.` removed.
///
/// Returns `None` when the URL does not parse or has no host.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(domain_of("https://www.bbc.co.uk/sport/formula1"), Some("bbc.co.uk".into()));
/// assert_eq!(domain_of("https://it.motorsport.com/f1/news/"), Some("it.motorsport.com".into()));
/// ```
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// An entry page to scan for article links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// The entry URL exactly as the registry supplied it.
    pub url: String,
    /// Host without a leading `www.`.
    pub domain: String,
}

impl Source {
    /// Build a source from a registry URL, or `None` if it has no usable host.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        domain_of(url).map(|domain| Self {
            url: url.to_string(),
            domain,
        })
    }
}

/// A row of the registry's `sources` table.
#[derive(Debug, Deserialize)]
pub struct SourceRow {
    pub url: String,
}

/// A new article link paired with its paced processing time.
///
/// Serialized with the column names of the `to_process` table: the tag is
/// stored as `bot` and the schedule as `time` (RFC 3339 with offset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRecord {
    pub url: String,
    #[serde(rename = "bot")]
    pub tag: String,
    #[serde(rename = "time")]
    pub scheduled_time: DateTime<Utc>,
    /// Present only when title annotation is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_domain_of_strips_leading_www_only() {
        assert_eq!(
            domain_of("https://www.motorsport.com/f1/news/").as_deref(),
            Some("motorsport.com")
        );
        assert_eq!(
            domain_of("https://it.motorsport.com/f1/news/").as_deref(),
            Some("it.motorsport.com")
        );
        assert_eq!(
            domain_of("https://news.www.example.com/").as_deref(),
            Some("news.www.example.com")
        );
    }

    #[test]
    fn test_domain_of_rejects_hostless() {
        assert_eq!(domain_of("mailto:a@b.com"), None);
        assert_eq!(domain_of("/relative/path"), None);
    }

    #[test]
    fn test_source_parse_trims() {
        let source = Source::parse("  https://www.planetf1.com/news/ \n").unwrap();
        assert_eq!(source.url, "https://www.planetf1.com/news/");
        assert_eq!(source.domain, "planetf1.com");
    }

    #[test]
    fn test_scheduled_record_serializes_with_queue_columns() {
        let record = ScheduledRecord {
            url: "https://motorsport.com/f1/news/x-1".to_string(),
            tag: "formula".to_string(),
            scheduled_time: Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap(),
            title: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["bot"], "formula");
        assert_eq!(json["time"], "2025-05-06T12:00:00Z");
        assert!(json.get("title").is_none());
        assert!(json.get("tag").is_none());
    }

    #[test]
    fn test_source_row_deserialization() {
        let rows: Vec<SourceRow> =
            serde_json::from_str(r#"[{"url":"https://a.com"},{"url":"https://b.com"}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].url, "https://b.com");
    }
}
