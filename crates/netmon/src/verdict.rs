//! Validation verdicts and probe bookkeeping bitmasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask reported to consumers. Empty means INVALID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationResult(u32);

impl ValidationResult {
    pub const INVALID: ValidationResult = ValidationResult(0);
    pub const VALID: ValidationResult = ValidationResult(0x01);
    pub const PARTIAL: ValidationResult = ValidationResult(0x02);

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: ValidationResult) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_valid(self) -> bool {
        self.contains(Self::VALID)
    }

    pub fn is_partial(self) -> bool {
        self.contains(Self::PARTIAL)
    }
}

impl BitOr for ValidationResult {
    type Output = ValidationResult;

    fn bitor(self, rhs: Self) -> Self::Output {
        ValidationResult(self.0 | rhs.0)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_valid(), self.is_partial()) {
            (true, true) => write!(f, "VALID|PARTIAL"),
            (true, false) => write!(f, "VALID"),
            (false, true) => write!(f, "PARTIAL"),
            (false, false) => write!(f, "INVALID"),
        }
    }
}

/// Individual probe kinds tracked in [`ProbeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Dns,
    Http,
    Https,
    Fallback,
    PrivateDns,
    Capport,
}

impl ProbeKind {
    const fn bit(self) -> u32 {
        match self {
            ProbeKind::Dns => 0x04,
            ProbeKind::Http => 0x08,
            ProbeKind::Https => 0x10,
            ProbeKind::Fallback => 0x20,
            ProbeKind::PrivateDns => 0x40,
            ProbeKind::Capport => 0x80,
        }
    }

    const ALL: [ProbeKind; 6] = [
        ProbeKind::Dns,
        ProbeKind::Http,
        ProbeKind::Https,
        ProbeKind::Fallback,
        ProbeKind::PrivateDns,
        ProbeKind::Capport,
    ];
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Dns => write!(f, "DNS"),
            ProbeKind::Http => write!(f, "HTTP"),
            ProbeKind::Https => write!(f, "HTTPS"),
            ProbeKind::Fallback => write!(f, "FALLBACK"),
            ProbeKind::PrivateDns => write!(f, "PRIVDNS"),
            ProbeKind::Capport => write!(f, "CAPPORT"),
        }
    }
}

/// Set of probe kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeSet(u32);

impl ProbeSet {
    pub const EMPTY: ProbeSet = ProbeSet(0);

    #[must_use]
    pub fn of(kind: ProbeKind) -> Self {
        ProbeSet(kind.bit())
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, kind: ProbeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: ProbeKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: ProbeKind) {
        self.0 &= !kind.bit();
    }

    pub fn iter(self) -> impl Iterator<Item = ProbeKind> {
        ProbeKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl From<ProbeKind> for ProbeSet {
    fn from(kind: ProbeKind) -> Self {
        ProbeSet::of(kind)
    }
}

impl BitOr<ProbeKind> for ProbeSet {
    type Output = ProbeSet;

    fn bitor(self, rhs: ProbeKind) -> Self::Output {
        ProbeSet(self.0 | rhs.bit())
    }
}

impl BitOr for ProbeKind {
    type Output = ProbeSet;

    fn bitor(self, rhs: ProbeKind) -> Self::Output {
        ProbeSet(self.bit() | rhs.bit())
    }
}

impl BitOrAssign for ProbeSet {
    fn bitor_assign(&mut self, rhs: ProbeSet) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ProbeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        let names: Vec<String> = self.iter().map(|k| k.to_string()).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Reported verdict: result bits plus the portal redirect URL, if any.
///
/// PORTAL is represented as INVALID with a redirect URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub result: ValidationResult,
    pub redirect_url: Option<String>,
}

impl Verdict {
    pub fn new(result: ValidationResult) -> Self {
        Self {
            result,
            redirect_url: None,
        }
    }

    pub fn portal(redirect_url: Option<String>) -> Self {
        Self {
            result: ValidationResult::INVALID,
            redirect_url,
        }
    }
}

/// Externally visible state of an attachment's evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    #[default]
    Unevaluated,
    Evaluating,
    Valid,
    Partial,
    Portal,
    Invalid,
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationState::Unevaluated => write!(f, "unevaluated"),
            ValidationState::Evaluating => write!(f, "evaluating"),
            ValidationState::Valid => write!(f, "valid"),
            ValidationState::Partial => write!(f, "partial"),
            ValidationState::Portal => write!(f, "portal"),
            ValidationState::Invalid => write!(f, "invalid"),
        }
    }
}

/// Payload of a network-tested notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTestResult {
    pub result: ValidationResult,
    pub probes_succeeded: ProbeSet,
    pub probes_attempted: ProbeSet,
    pub redirect_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for NetworkTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (succeeded: {}, attempted: {})",
            self.result, self.probes_succeeded, self.probes_attempted
        )?;
        if let Some(url) = &self.redirect_url {
            write!(f, " redirect={}", url)?;
        }
        Ok(())
    }
}
