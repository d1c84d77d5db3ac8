//! Fallback probe specs.
//!
//! A spec is `url@@/@@statusRegex@@/@@locationRegex`; several specs are
//! joined with `@@,@@`. A fallback response counts as success when its
//! status code matches `statusRegex` and its `Location` header matches
//! `locationRegex` (a missing header never matches). Both regexes must
//! match the whole string.

use regex::Regex;
use reqwest::Url;
use std::fmt;
use tracing::warn;

const SPEC_SEPARATOR: &str = "@@,@@";
const FIELD_SEPARATOR: &str = "@@/@@";

#[derive(Debug, Clone)]
pub struct FallbackSpec {
    url: Url,
    status_pattern: String,
    status_regex: Regex,
    location_pattern: String,
    location_regex: Regex,
}

impl FallbackSpec {
    /// Parse one spec. Returns `None` for anything malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
        let [url, status, location] = fields.as_slice() else {
            return None;
        };
        let url = Url::parse(url.trim()).ok()?;
        let status_regex = Regex::new(&format!("^(?:{})$", status)).ok()?;
        let location_regex = Regex::new(&format!("^(?:{})$", location)).ok()?;
        Some(Self {
            url,
            status_pattern: status.to_string(),
            status_regex,
            location_pattern: location.to_string(),
            location_regex,
        })
    }

    /// Parse a list of specs, dropping the invalid ones.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(SPEC_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| {
                let parsed = Self::parse(s);
                if parsed.is_none() {
                    warn!("Dropping invalid fallback probe spec {:?}", s);
                }
                parsed
            })
            .collect()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether a response with this status and location means "no portal".
    pub fn matches(&self, status: u16, location: Option<&str>) -> bool {
        self.status_regex.is_match(&status.to_string())
            && location.is_some_and(|loc| self.location_regex.is_match(loc))
    }
}

impl PartialEq for FallbackSpec {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.status_pattern == other.status_pattern
            && self.location_pattern == other.location_pattern
    }
}

impl fmt::Display for FallbackSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.url, FIELD_SEPARATOR, self.status_pattern, FIELD_SEPARATOR, self.location_pattern
        )
    }
}
