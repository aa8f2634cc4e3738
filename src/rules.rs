//! Per-site article classification rules.
//!
//! Every supported domain has one [`SiteRule`] describing what an article path
//! looks like on that site. A [`RuleBook`] holds the rules plus the single
//! [`MissingRulePolicy`] applied to domains that have none.
//!
//! # Evaluation order
//!
//! [`SiteRule::accepts`] short-circuits on the first failing check:
//!
//! 1. the link's host must contain the domain
//! 2. the path must contain one required substring (unless `any_path`)
//! 3. the path must contain no forbidden substring
//! 4. `min_hyphens`: the path must carry at least that many `-`
//! 5. `numeric_tail`: the last non-empty path segment must be all digits
//! 6. `page_suffixes`: the path must end with one of them
//!
//! # Rules file
//!
//! `--rules <path>` replaces the built-in book with a YAML map of domain to
//! rule:
//!
//! ```yaml
//! racingnews365.com:
//!   required_paths: ["-"]
//!   forbidden_paths: ["/video", "/podcast"]
//!   min_hyphens: 3
//! gazzetta.it:
//!   required_paths: ["/Formula-1/"]
//!   page_suffixes: [".shtml"]
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, instrument};
use url::Url;

/// What to do with links from a domain that has no rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingRulePolicy {
    /// Discard every link from the domain.
    #[default]
    Skip,
    /// Accept links on the domain whose path is longer than `min_len`.
    PathLength { min_len: usize },
}

/// Structural description of an article URL on one site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteRule {
    /// At least one must appear in the path.
    #[serde(default)]
    pub required_paths: Vec<String>,
    /// Skip the required-path check entirely. An empty `required_paths`
    /// without this flag rejects every link.
    #[serde(default)]
    pub any_path: bool,
    /// None may appear in the path.
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
    #[serde(default)]
    pub min_hyphens: Option<usize>,
    /// Last non-empty path segment must be all ASCII digits.
    #[serde(default)]
    pub numeric_tail: bool,
    /// Path must end with one of these (e.g. `.shtml`). Empty means unchecked.
    #[serde(default)]
    pub page_suffixes: Vec<String>,
}

impl SiteRule {
    fn new(required: &[&str], forbidden: &[&str]) -> Self {
        Self {
            required_paths: required.iter().map(|s| s.to_string()).collect(),
            forbidden_paths: forbidden.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn min_hyphens(mut self, n: usize) -> Self {
        self.min_hyphens = Some(n);
        self
    }

    /// Is `link` an article on `domain` under this rule?
    pub fn accepts(&self, link: &str, domain: &str) -> bool {
        let Some((host, path)) = host_and_path(link) else {
            return false;
        };
        if !host.contains(domain) {
            return false;
        }
        if !self.any_path && !self.required_paths.iter().any(|p| path.contains(p.as_str())) {
            return false;
        }
        if self.forbidden_paths.iter().any(|p| path.contains(p.as_str())) {
            return false;
        }
        if let Some(min) = self.min_hyphens {
            if path.matches('-').count() < min {
                return false;
            }
        }
        if self.numeric_tail && !ends_in_numeric_segment(&path) {
            return false;
        }
        if !self.page_suffixes.is_empty()
            && !self.page_suffixes.iter().any(|s| path.ends_with(s.as_str()))
        {
            return false;
        }
        true
    }
}

fn host_and_path(link: &str) -> Option<(String, String)> {
    let url = Url::parse(link).ok()?;
    let host = url.host_str()?.to_string();
    Some((host, url.path().to_string()))
}

fn ends_in_numeric_segment(path: &str) -> bool {
    path.split('/')
        .filter(|s| !s.is_empty())
        .last()
        .is_some_and(|seg| seg.bytes().all(|b| b.is_ascii_digit()))
}

/// All site rules for a run plus the policy for unknown domains.
#[derive(Debug, Clone)]
pub struct RuleBook {
    rules: BTreeMap<String, SiteRule>,
    missing: MissingRulePolicy,
}

impl RuleBook {
    pub fn new(rules: BTreeMap<String, SiteRule>, missing: MissingRulePolicy) -> Self {
        Self { rules, missing }
    }

    /// The production rule set for the supported Formula 1 news sites.
    pub fn builtin() -> Self {
        let rules = [
            ("formula1.com", SiteRule::new(&["/latest/article/"], &["/tags/"])),
            (
                "motorsport.com",
                SiteRule::new(&["/f1/news/"], &["/videos/", "/galleries/", "/info/"]),
            ),
            (
                "it.motorsport.com",
                SiteRule::new(
                    &["/f1/news/"],
                    &["/videos/", "/galleries/", "/info/", "/live-text/"],
                ),
            ),
            (
                "autosport.com",
                SiteRule::new(&["/f1/news/"], &["/videos/", "/galleries/", "/info/"]),
            ),
            (
                "bbc.co.uk",
                SiteRule::new(
                    &["/sport/formula1/"],
                    &["/calendar", "/latest", "/results", "/standings", "/videos"],
                ),
            ),
            ("the-race.com", SiteRule::new(&["/formula-1/"], &["/category/"])),
            (
                "planetf1.com",
                SiteRule::new(
                    &["/news/", "/features/"],
                    &["/tag/", "/team/", "/driver/", "/author/"],
                ),
            ),
            ("racefans.net", SiteRule::new(&["/2024/", "/2025/"], &["/calendar/"])),
            ("f1technical.net", SiteRule::new(&["/news/", "/features/"], &["/forum/"])),
            ("grandprix.com", SiteRule::new(&["/news/"], &[])),
            (
                "racingnews365.com",
                SiteRule::new(
                    &["-"],
                    &[
                        "/video",
                        "/podcast",
                        "grand-prix",
                        "/formula-1-",
                        "/f1-news",
                        "live-timing",
                        "editorial-team-and-staff",
                        "privacy-policy",
                        "terms-and-conditions",
                        "service-and-contact",
                        "disclaimer",
                    ],
                )
                .min_hyphens(3),
            ),
            ("skysports.com", SiteRule::new(&["/f1/news/"], &["/f1/video/"])),
            ("f1oversteer.com", SiteRule::new(&["/news/"], &["/page/", "/tag/"])),
            (
                "gazzetta.it",
                SiteRule::new(
                    &["/Formula-1/", "/motori/ferrari/"],
                    &["/pagina-", "/classifiche", "/calendario-risultati", "/piloti", "/scuderie"],
                ),
            ),
            (
                "autosprint.it",
                SiteRule::new(
                    &["/news/formula1/"],
                    &["/foto/", "/video/", "/widget/", "/live/", "/in-diretta/"],
                ),
            ),
        ]
        .into_iter()
        .map(|(domain, rule)| (domain.to_string(), rule))
        .collect();

        Self::new(rules, MissingRulePolicy::default())
    }

    /// Parse a YAML map of domain to rule.
    pub fn parse_rules(yaml: &str) -> Result<BTreeMap<String, SiteRule>, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a rules file, replacing the built-in set.
    pub fn load(path: &Path, missing: MissingRulePolicy) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::RulesIo {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::parse_rules(&yaml).map_err(|source| ConfigError::RulesParse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(rules, missing))
    }

    pub fn with_missing_policy(mut self, missing: MissingRulePolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn missing_policy(&self) -> MissingRulePolicy {
        self.missing
    }

    /// No rule for `domain` and the policy says to skip it.
    pub fn skips(&self, domain: &str) -> bool {
        self.missing == MissingRulePolicy::Skip && !self.rules.contains_key(domain)
    }

    /// No rule for `domain`, so the path-length heuristic decides.
    pub fn uses_fallback(&self, domain: &str) -> bool {
        matches!(self.missing, MissingRulePolicy::PathLength { .. })
            && !self.rules.contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Is `link` a genuine article for `domain`?
    ///
    /// Domains without a rule go through the [`MissingRulePolicy`].
    pub fn classify(&self, link: &str, domain: &str) -> bool {
        match self.rules.get(domain) {
            Some(rule) => rule.accepts(link, domain),
            None => match self.missing {
                MissingRulePolicy::Skip => false,
                MissingRulePolicy::PathLength { min_len } => host_and_path(link)
                    .is_some_and(|(host, path)| host.contains(domain) && path.len() > min_len),
            },
        }
    }

    /// Keep the article links of one domain's candidate set.
    ///
    /// Returns `None` when the domain has no rule and the policy is
    /// [`MissingRulePolicy::Skip`], so callers can report the skip once.
    #[instrument(level = "debug", skip(self, links), fields(%domain))]
    pub fn validate<'a, I>(&self, domain: &str, links: I) -> Option<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        if self.skips(domain) {
            return None;
        }
        let valid: BTreeSet<String> = links
            .into_iter()
            .filter(|link| self.classify(link, domain))
            .cloned()
            .collect();
        debug!(count = valid.len(), "Validated links");
        Some(valid)
    }
}
