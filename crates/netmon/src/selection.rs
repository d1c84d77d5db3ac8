//! Fallback candidate selection.
//!
//! One random draw per escalation picks both a fallback URL and a fallback
//! spec. Candidates were already filtered for validity when the
//! [`ProbeConfig`] was built, so every index lands on a usable entry.

use crate::config::ProbeConfig;
use crate::deps::RandomSource;
use crate::probe::spec::FallbackSpec;
use reqwest::Url;

/// Indices chosen for one fallback escalation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackSelection {
    pub url_index: Option<usize>,
    pub spec_index: Option<usize>,
}

/// The probe a selection resolves to.
#[derive(Debug, Clone, Copy)]
pub enum FallbackTarget<'a> {
    Spec(&'a FallbackSpec),
    Url(&'a Url),
}

impl<'a> FallbackTarget<'a> {
    pub fn url(&self) -> &'a Url {
        match self {
            FallbackTarget::Spec(spec) => spec.url(),
            FallbackTarget::Url(url) => url,
        }
    }

    pub fn spec(&self) -> Option<&'a FallbackSpec> {
        match self {
            FallbackTarget::Spec(spec) => Some(spec),
            FallbackTarget::Url(_) => None,
        }
    }
}

fn pick(draw: u32, len: usize, previous: Option<usize>) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let index = draw as usize % len;
    match previous {
        Some(prev) if prev == index && len > 1 => Some((index + 1) % len),
        _ => Some(index),
    }
}

impl FallbackSelection {
    /// Draw a new selection. Entries chosen by `previous` are skipped when
    /// an alternative exists.
    pub fn select(
        config: &ProbeConfig,
        random: &dyn RandomSource,
        previous: Option<FallbackSelection>,
    ) -> Self {
        let draw = random.next_u32();
        Self {
            url_index: pick(
                draw,
                config.fallback_urls.len(),
                previous.and_then(|p| p.url_index),
            ),
            spec_index: pick(
                draw,
                config.fallback_specs.len(),
                previous.and_then(|p| p.spec_index),
            ),
        }
    }

    /// Specs take precedence over plain URLs.
    pub fn target<'a>(&self, config: &'a ProbeConfig) -> Option<FallbackTarget<'a>> {
        if let Some(spec) = self.spec_index.and_then(|i| config.fallback_specs.get(i)) {
            return Some(FallbackTarget::Spec(spec));
        }
        self.url_index
            .and_then(|i| config.fallback_urls.get(i))
            .map(FallbackTarget::Url)
    }
}
