/// Core data types for the river level / water quality reconciliation service.
///
/// This module defines the shared domain model imported by all other modules:
/// providers, sampling resolutions, readings, retrieval tiers, joined records,
/// and the error taxonomy that the tier and resolver boundaries recover from.
/// It performs no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Providers and sampling
// ---------------------------------------------------------------------------

/// An external telemetry network. Each one speaks its own wire format and is
/// reached through its own `ingest` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Han River Flood Control Office water-level API (JSON, `content[]`).
    Hrfco,
    /// NIER water-quality service on the public data portal
    /// (JSON, `response.body.items.item`).
    Nier,
    /// Automatic water-quality monitoring network (tag-based XML).
    #[serde(rename = "autonet")]
    AutoNet,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Hrfco, Provider::Nier, Provider::AutoNet];

    /// Stable slot index, used for per-provider arrays on `Station`.
    pub fn index(self) -> usize {
        match self {
            Provider::Hrfco => 0,
            Provider::Nier => 1,
            Provider::AutoNet => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Hrfco => "hrfco",
            Provider::Nier => "nier",
            Provider::AutoNet => "autonet",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hrfco" => Ok(Provider::Hrfco),
            "nier" => Ok(Provider::Nier),
            "autonet" => Ok(Provider::AutoNet),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Sampling resolution requested from a provider. Ordered finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sampling {
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "1h")]
    Hourly,
    #[serde(rename = "1d")]
    Daily,
}

impl Sampling {
    pub fn minutes(self) -> i64 {
        match self {
            Sampling::TenMinutes => 10,
            Sampling::Hourly => 60,
            Sampling::Daily => 1440,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sampling::TenMinutes => "10m",
            Sampling::Hourly => "1h",
            Sampling::Daily => "1d",
        }
    }
}

impl fmt::Display for Sampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// Physical interpretation of a level value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// Relative depth above the gauge zero, in metres.
    Depth,
    /// Absolute elevation above the national datum, in metres.
    Elevation,
    /// Not classified (quality readings, or levels before normalization).
    Unknown,
}

/// Which provider, tier and code produced a reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub provider: Provider,
    pub sampling: Sampling,
    /// Zero-based position of the tier in the plan that produced the reading.
    pub tier: usize,
    pub code: String,
}

/// One normalized measurement. Timestamps are always UTC; provider clocks
/// are corrected during decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: Unit,
    pub provenance: Provenance,
}

/// A sample as decoded from a provider payload, before the engine decides
/// whether the value is usable. Blank and sentinel values are kept here.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,
    pub raw_value: String,
}

impl RawSample {
    pub fn new(timestamp: DateTime<Utc>, raw_value: impl Into<String>) -> Self {
        RawSample {
            timestamp,
            raw_value: raw_value.into(),
        }
    }
}

/// Longest request window a caller may ask for, in hours.
pub const MAX_WINDOW_HOURS: i64 = 24 * 14;

/// Inclusive UTC time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Builds a range, swapping the bounds if they arrive reversed.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            TimeRange { start, end }
        } else {
            TimeRange { start: end, end: start }
        }
    }

    /// The `hours` leading up to `end`, clamped to `0..=MAX_WINDOW_HOURS`.
    pub fn trailing_hours(end: DateTime<Utc>, hours: i64) -> Self {
        TimeRange::new(end - chrono::Duration::hours(hours.clamp(0, MAX_WINDOW_HOURS)), end)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

// ---------------------------------------------------------------------------
// Retrieval tiers
// ---------------------------------------------------------------------------

/// One step of the fallback plan: which provider to ask, at what sampling,
/// how far back to look, and how long to wait.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalTier {
    pub provider: Provider,
    pub sampling: Sampling,
    pub lookback: chrono::Duration,
    pub timeout: std::time::Duration,
}

impl fmt::Display for RetrievalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} lookback {}m timeout {}s",
            self.provider,
            self.sampling,
            self.lookback.num_minutes(),
            self.timeout.as_secs_f32()
        )
    }
}

// ---------------------------------------------------------------------------
// Joined records
// ---------------------------------------------------------------------------

/// A level reading and a quality reading aligned on one timestamp. At least
/// one side is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Option<Reading>,
    pub quality: Option<Reading>,
    pub is_alert: bool,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Everything that can go wrong fetching from a provider. None of these is
/// fatal: the engine converts each one into "try the next tier", and the
/// resolver into "try the next candidate".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Network failure, timeout, or non-2xx HTTP status.
    #[error("transport error: {0}")]
    Transport(String),
    /// The payload could not be decoded, or the provider reported an error code.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Well-formed response with no usable data for the window.
    #[error("empty result: {0}")]
    EmptyResult(String),
    /// None of the candidate codes answered a probe.
    #[error("code unresolved: {0}")]
    CodeUnresolved(String),
    /// A sample is stamped beyond the plausible bound; the provider clock
    /// was not corrected.
    #[error("clock skew: sample at {sample} is later than {bound}")]
    ClockSkew {
        sample: DateTime<Utc>,
        bound: DateTime<Utc>,
    },
    /// The run was cancelled before this attempt was made.
    #[error("cancelled before request was issued")]
    Cancelled,
}

/// The reason a single tier did not produce a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct TierFailure {
    pub tier: usize,
    pub provider: Provider,
    pub sampling: Sampling,
    pub error: FetchError,
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tier {} ({}/{}): {}",
            self.tier, self.provider, self.sampling, self.error
        )
    }
}

/// Per-station failure surfaced to callers. Carries enough detail for an
/// operator to tell "no data published" apart from "endpoint unreachable".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StationFailure {
    #[error("station '{station}' is not in the directory")]
    UnknownStation { station: String },

    #[error("station '{station}': no live {provider} code among {tried:?}")]
    Unresolved {
        station: String,
        provider: Provider,
        tried: Vec<String>,
    },

    #[error("station '{station}': all {provider} tiers failed: {}", join_reasons(.reasons))]
    Exhausted {
        station: String,
        provider: Provider,
        reasons: Vec<TierFailure>,
    },

    #[error("station '{station}': {provider} request cancelled before completion")]
    Cancelled { station: String, provider: Provider },

    /// Neither side of a joined series could be fetched.
    #[error("station '{station}': level and quality both failed ({level}; {quality})")]
    Unjoinable {
        station: String,
        level: Box<StationFailure>,
        quality: Box<StationFailure>,
    },
}

impl StationFailure {
    pub fn station(&self) -> &str {
        match self {
            StationFailure::UnknownStation { station }
            | StationFailure::Unresolved { station, .. }
            | StationFailure::Exhausted { station, .. }
            | StationFailure::Cancelled { station, .. }
            | StationFailure::Unjoinable { station, .. } => station,
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            StationFailure::Unresolved { provider, .. }
            | StationFailure::Exhausted { provider, .. }
            | StationFailure::Cancelled { provider, .. } => Some(*provider),
            StationFailure::UnknownStation { .. } | StationFailure::Unjoinable { .. } => None,
        }
    }

    /// One human-readable reason per failed attempt.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            StationFailure::UnknownStation { station } => {
                vec![format!("unknown station '{}'", station)]
            }
            StationFailure::Unresolved { provider, tried, .. } => vec![format!(
                "{}",
                FetchError::CodeUnresolved(format!("{} candidates {:?}", provider, tried))
            )],
            StationFailure::Exhausted { reasons, .. } => {
                reasons.iter().map(|r| r.to_string()).collect()
            }
            StationFailure::Cancelled { provider, .. } => {
                vec![format!("{}: {}", provider, FetchError::Cancelled)]
            }
            StationFailure::Unjoinable { level, quality, .. } => {
                let mut reasons = level.reasons();
                reasons.extend(quality.reasons());
                reasons
            }
        }
    }
}

/// Serializable view of a `StationFailure`: which station, which provider,
/// and why each attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub station: String,
    pub provider: Option<Provider>,
    pub message: String,
    pub reasons: Vec<String>,
}

impl From<&StationFailure> for FailureReport {
    fn from(failure: &StationFailure) -> Self {
        FailureReport {
            station: failure.station().to_string(),
            provider: failure.provider(),
            message: failure.to_string(),
            reasons: failure.reasons(),
        }
    }
}

fn join_reasons(reasons: &[TierFailure]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
