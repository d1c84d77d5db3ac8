//! HTTP, HTTPS and fallback probes.
//!
//! Redirects are never followed: a redirect is exactly what a captive
//! portal looks like.

use crate::config::ContentPolicy;
use crate::deps::{HttpClient, HttpRequest, HttpResponse};
use crate::probe::result::PortalProbeResult;
use crate::probe::spec::FallbackSpec;
use crate::verdict::ProbeKind;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on body bytes read for content matching.
const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// Shared parameters for every HTTP-family probe of one evaluation.
#[derive(Clone, Copy)]
pub struct HttpProber<'a> {
    pub client: &'a dyn HttpClient,
    pub timeout: Duration,
    pub user_agent: Option<&'a str>,
    pub content: &'a ContentPolicy,
}

impl HttpProber<'_> {
    /// Probe `url`. With a fallback spec the response is judged by its
    /// status and location patterns instead of the usual 204 rule.
    pub async fn probe(
        &self,
        url: &Url,
        kind: ProbeKind,
        spec: Option<&FallbackSpec>,
    ) -> PortalProbeResult {
        let mut request = HttpRequest::get(url.clone(), self.timeout)
            .header("Connection", "close")
            .max_body(MAX_CONTENT_BYTES);
        if let Some(ua) = self.user_agent {
            request = request.header("User-Agent", ua);
        }

        let started = tokio::time::Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.client.fetch(request)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                info!("{} {} probe failed: {}", kind, url, e);
                return PortalProbeResult::failed(kind).with_detect_url(url.as_str());
            }
            Err(_) => {
                info!("{} {} probe timed out after {:?}", kind, url, self.timeout);
                return PortalProbeResult::failed(kind).with_detect_url(url.as_str());
            }
        };
        let location = response.header("location").map(str::to_string);
        info!(
            "{} {} time={}ms ret={} location={:?}",
            kind,
            url,
            started.elapsed().as_millis(),
            response.status,
            location
        );

        if let Some(spec) = spec {
            let mut result = if spec.matches(response.status, location.as_deref()) {
                PortalProbeResult::success(kind)
            } else {
                PortalProbeResult::portal(kind, Some(response.status), location, None)
            };
            result.detect_url = Some(url.to_string());
            result.probe_spec = Some(spec.clone());
            return result;
        }

        self.classify(url, kind, &response, location)
    }

    fn classify(
        &self,
        url: &Url,
        kind: ProbeKind,
        response: &HttpResponse,
        location: Option<String>,
    ) -> PortalProbeResult {
        let status = response.status;
        let detect = url.to_string();
        let classified = match status {
            204 => PortalProbeResult::success(kind),
            200 => match self.classify_ok(url, kind, response) {
                Some(result) => result,
                None => PortalProbeResult::portal(kind, Some(status), location, None),
            },
            // HTTPS is only trusted for a success; anything else is a failure.
            _ if kind == ProbeKind::Https => PortalProbeResult::failed(kind),
            200..=399 => PortalProbeResult::portal(kind, Some(status), location, None),
            _ => PortalProbeResult::failed(kind),
        };
        classified.with_http_status(status).with_detect_url(detect)
    }

    // None means the 200 stands and is treated as a portal page.
    fn classify_ok(
        &self,
        url: &Url,
        kind: ProbeKind,
        response: &HttpResponse,
    ) -> Option<PortalProbeResult> {
        let Some(length) = response.content_length else {
            if response.body.is_empty() {
                debug!("{} {}: empty 200 response interpreted as failure", kind, url);
                return Some(PortalProbeResult::failed(kind));
            }
            return self.https_not_portal(kind);
        };

        if self.content.length_in_window(length) {
            let take = (length as usize).min(response.body.len());
            let body = decode_body(
                &response.body[..take],
                response.header("content-type").and_then(extract_charset),
            );
            if self
                .content
                .failed_regex
                .as_ref()
                .is_some_and(|re| re.is_match(&body))
            {
                debug!("{} {}: content matches failure pattern", kind, url);
                return Some(PortalProbeResult::failed(kind));
            }
            if self
                .content
                .success_regex
                .as_ref()
                .is_some_and(|re| re.is_match(&body))
            {
                debug!("{} {}: content matches success pattern", kind, url);
                return Some(PortalProbeResult::success(kind));
            }
            return self.https_not_portal(kind);
        }

        if length <= 4 {
            debug!("{} {}: 200 with Content-Length <= 4 interpreted as failure", kind, url);
            return Some(PortalProbeResult::failed(kind));
        }
        self.https_not_portal(kind)
    }

    fn https_not_portal(&self, kind: ProbeKind) -> Option<PortalProbeResult> {
        (kind == ProbeKind::Https).then(|| PortalProbeResult::failed(kind))
    }
}

/// Charset parameter of a `Content-Type` header value.
pub fn extract_charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

fn decode_body(bytes: &[u8], charset: Option<&str>) -> String {
    match charset {
        Some(cs) if cs.eq_ignore_ascii_case("iso-8859-1") || cs.eq_ignore_ascii_case("latin1") => {
            bytes.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}
