//! Captive portal API (RFC 8908) probe.

use crate::deps::{HttpClient, HttpRequest};
use crate::probe::http::extract_charset;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CAPPORT_CONTENT_TYPE: &str = "application/captive+json";

/// Responses larger than this are ignored.
pub const MAX_CAPPORT_JSON_LENGTH: usize = 4096;

/// Structured portal state published by the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptivePortalData {
    pub captive: bool,
    pub user_portal_url: Option<String>,
    pub venue_info_url: Option<String>,
    pub can_extend_session: bool,
    pub bytes_remaining: Option<u64>,
    /// Absolute expiry computed from `seconds-remaining` at parse time.
    pub expiry_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CapportJson {
    captive: bool,
    #[serde(rename = "user-portal-url")]
    user_portal_url: Option<String>,
    #[serde(rename = "venue-info-url")]
    venue_info_url: Option<String>,
    #[serde(rename = "can-extend-session", default)]
    can_extend_session: bool,
    #[serde(rename = "seconds-remaining")]
    seconds_remaining: Option<f64>,
    #[serde(rename = "bytes-remaining")]
    bytes_remaining: Option<f64>,
}

/// Negative counts clamp to zero, fractions truncate.
fn remaining(value: Option<f64>) -> Option<u64> {
    value.filter(|v| v.is_finite()).map(|v| v.max(0.0) as u64)
}

fn checked_url(field: &str, raw: Option<String>) -> Option<String> {
    let raw = raw?;
    match Url::parse(&raw) {
        Ok(_) => Some(raw),
        Err(e) => {
            debug!("Ignoring invalid capport {}: {}", field, e);
            None
        }
    }
}

/// Parse a capport JSON document.
///
/// Returns `None` when the document is malformed, lacks `captive`, or
/// claims to be captive without a usable user portal URL.
pub fn parse_capport_json(body: &str, now: DateTime<Utc>) -> Option<CaptivePortalData> {
    let parsed: CapportJson = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) => {
            info!("Malformed capport API response: {}", e);
            return None;
        }
    };
    let user_portal_url = checked_url("user-portal-url", parsed.user_portal_url);
    if parsed.captive && user_portal_url.is_none() {
        info!("Capport API reports captive without a user portal URL");
        return None;
    }
    let expiry_time = remaining(parsed.seconds_remaining).and_then(|secs| {
        chrono::Duration::try_seconds(i64::try_from(secs).ok()?).map(|d| now + d)
    });
    Some(CaptivePortalData {
        captive: parsed.captive,
        user_portal_url,
        venue_info_url: checked_url("venue-info-url", parsed.venue_info_url),
        can_extend_session: parsed.can_extend_session,
        bytes_remaining: remaining(parsed.bytes_remaining),
        expiry_time,
    })
}

/// Only HTTPS API endpoints are accepted, except plain HTTP to localhost
/// on test networks.
pub fn is_capport_url_allowed(url: &Url, test_network: bool) -> bool {
    match url.scheme() {
        "https" => true,
        "http" => test_network && url.host_str() == Some("localhost"),
        _ => false,
    }
}

/// Fetch and parse the capport API document.
pub async fn fetch_capport(
    client: &dyn HttpClient,
    url: &Url,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Option<CaptivePortalData> {
    let request = HttpRequest::get(url.clone(), timeout)
        .header("Accept", CAPPORT_CONTENT_TYPE)
        .max_body(MAX_CAPPORT_JSON_LENGTH + 1);
    let response = match tokio::time::timeout(timeout, client.fetch(request)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            info!("Capport API {} fetch failed: {}", url, e);
            return None;
        }
        Err(_) => {
            info!("Capport API {} timed out", url);
            return None;
        }
    };
    if response.status != 200 {
        info!("Capport API {} returned {}", url, response.status);
        return None;
    }
    if let Some(charset) = response.header("content-type").and_then(extract_charset) {
        if !charset.eq_ignore_ascii_case("utf-8") {
            warn!("Capport API {} uses unsupported charset {}", url, charset);
            return None;
        }
    }
    if response.body.len() > MAX_CAPPORT_JSON_LENGTH {
        warn!("Capport API {} response exceeds {} bytes", url, MAX_CAPPORT_JSON_LENGTH);
        return None;
    }
    let Ok(body) = std::str::from_utf8(&response.body) else {
        warn!("Capport API {} response is not valid UTF-8", url);
        return None;
    };
    parse_capport_json(body, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::HttpResponse;
    use crate::test_support::{FakeHttp, json_response, response};
    use chrono::TimeZone;

    const API: &str = "https://capport.example/api";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    async fn fetch(http: &FakeHttp) -> Option<CaptivePortalData> {
        fetch_capport(http, &Url::parse(API).unwrap(), Duration::from_secs(1), now()).await
    }

    #[test]
    fn test_parse_not_captive_keeps_venue() {
        let data = parse_capport_json(
            r#"{"captive": false, "venue-info-url": "https://venue.example/info"}"#,
            now(),
        )
        .unwrap();
        assert!(!data.captive);
        assert_eq!(data.venue_info_url.as_deref(), Some("https://venue.example/info"));
        assert_eq!(data.user_portal_url, None);
    }

    #[test]
    fn test_parse_captive_with_expiry() {
        let data = parse_capport_json(
            r#"{"captive": true, "user-portal-url": "https://login.example/",
                "seconds-remaining": 600, "bytes-remaining": 1000000}"#,
            now(),
        )
        .unwrap();
        assert_eq!(data.user_portal_url.as_deref(), Some("https://login.example/"));
        assert_eq!(data.expiry_time, Some(now() + chrono::Duration::minutes(10)));
        assert_eq!(data.bytes_remaining, Some(1_000_000));
    }

    #[test]
    fn test_parse_odd_remaining_counts_keep_verdict() {
        let data = parse_capport_json(
            r#"{"captive": true, "user-portal-url": "https://login.example/",
                "seconds-remaining": 90.7, "bytes-remaining": -5}"#,
            now(),
        )
        .unwrap();
        assert!(data.captive);
        assert_eq!(data.expiry_time, Some(now() + chrono::Duration::seconds(90)));
        assert_eq!(data.bytes_remaining, Some(0));
    }

    #[test]
    fn test_parse_rejects_bad_documents() {
        assert!(parse_capport_json(r#"{"captive": true}"#, now()).is_none());
        assert!(parse_capport_json(r#"{"user-portal-url": "https://a.example/"}"#, now()).is_none());
        assert!(parse_capport_json("not json", now()).is_none());
    }

    #[test]
    fn test_url_allowed() {
        let https = Url::parse(API).unwrap();
        let http = Url::parse("http://capport.example/api").unwrap();
        let local = Url::parse("http://localhost:8080/api").unwrap();
        assert!(is_capport_url_allowed(&https, false));
        assert!(!is_capport_url_allowed(&http, true));
        assert!(!is_capport_url_allowed(&local, false));
        assert!(is_capport_url_allowed(&local, true));
    }

    #[tokio::test]
    async fn test_fetch_sends_accept_header() {
        let http = FakeHttp::new();
        http.respond(API, json_response(r#"{"captive": false}"#));
        let data = fetch(&http).await.unwrap();
        assert!(!data.captive);
        let req = &http.requests()[0];
        assert!(req.headers.contains(&("Accept".into(), CAPPORT_CONTENT_TYPE.into())));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_200_and_charset() {
        let http = FakeHttp::new();
        http.respond(API, response(404));
        assert!(fetch(&http).await.is_none());

        let mut resp = json_response(r#"{"captive": false}"#);
        resp.headers.insert(
            "content-type".into(),
            "application/captive+json; charset=ISO-8859-1".into(),
        );
        http.respond(API, resp);
        assert!(fetch(&http).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let http = FakeHttp::new();
        let padding = " ".repeat(MAX_CAPPORT_JSON_LENGTH);
        http.respond(
            API,
            HttpResponse {
                status: 200,
                body: format!("{{\"captive\": false}}{}", padding).into(),
                ..Default::default()
            },
        );
        assert!(fetch(&http).await.is_none());
    }
}
