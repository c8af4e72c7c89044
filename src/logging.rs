/// Structured logging for the reconciliation service.
///
/// Events go through `tracing`; `init` installs a `tracing-subscriber` fmt
/// layer once per process. Every event about a station carries `station`,
/// `provider` and (where relevant) `code` fields so failures can be grepped
/// per station.
///
/// Tier failures are classified before logging. An empty result usually
/// means the sensor is offline or between reporting intervals, which is
/// routine and logged at debug; a transport or decode failure means the
/// upstream service or our configuration is degraded, and is logged at
/// error.

use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::model::{FetchError, Provider, StationFailure, TierFailure};

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
/// Calling twice is harmless; the second call is ignored.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Station offline, between intervals, or nothing published yet.
    Expected,
    /// Service degradation, a changed payload, or an uncorrected clock.
    Unexpected,
    /// Cannot tell from the error alone.
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub fn classify(error: &FetchError) -> FailureType {
    match error {
        FetchError::EmptyResult(_) | FetchError::Cancelled => FailureType::Expected,
        FetchError::Transport(_)
        | FetchError::MalformedResponse(_)
        | FetchError::ClockSkew { .. } => FailureType::Unexpected,
        FetchError::CodeUnresolved(_) => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured failure logging
// ---------------------------------------------------------------------------

/// Logs one failed tier at the level its classification calls for.
pub fn log_tier_failure(code: &str, failure: &TierFailure) {
    let class = classify(&failure.error);
    match class {
        FailureType::Expected => tracing::debug!(
            provider = %failure.provider,
            code,
            tier = failure.tier,
            sampling = %failure.sampling,
            class = %class,
            "tier failed: {}", failure.error
        ),
        FailureType::Unexpected => tracing::error!(
            provider = %failure.provider,
            code,
            tier = failure.tier,
            sampling = %failure.sampling,
            class = %class,
            "tier failed: {}", failure.error
        ),
        FailureType::Unknown => tracing::warn!(
            provider = %failure.provider,
            code,
            tier = failure.tier,
            sampling = %failure.sampling,
            class = %class,
            "tier failed: {}", failure.error
        ),
    }
}

/// Logs a probe that did not confirm a candidate code.
pub fn log_probe_failure(station: &str, provider: Provider, code: &str, error: &FetchError) {
    tracing::debug!(station, provider = %provider, code, class = %classify(error), "probe failed: {}", error);
}

/// Logs a per-station failure surfaced to a caller.
pub fn log_station_failure(failure: &StationFailure) {
    match failure {
        StationFailure::UnknownStation { station } => {
            tracing::warn!(station = station.as_str(), "unknown station")
        }
        StationFailure::Unresolved { station, provider, tried } => tracing::warn!(
            station = station.as_str(),
            provider = %provider,
            tried = tried.len(),
            "no live code: {}", failure
        ),
        StationFailure::Exhausted { station, provider, reasons } => {
            let all_expected = reasons
                .iter()
                .all(|r| classify(&r.error) == FailureType::Expected);
            if all_expected {
                tracing::info!(station = station.as_str(), provider = %provider, "no data published: {}", failure)
            } else {
                tracing::warn!(station = station.as_str(), provider = %provider, "retrieval exhausted: {}", failure)
            }
        }
        StationFailure::Cancelled { station, provider } => {
            tracing::info!(station = station.as_str(), provider = %provider, "cancelled")
        }
        StationFailure::Unjoinable { level, quality, .. } => {
            log_station_failure(level);
            log_station_failure(quality);
        }
    }
}

// ---------------------------------------------------------------------------
// Batch summary
// ---------------------------------------------------------------------------

pub fn log_batch_summary(label: &str, total: usize, successful: usize, failed: usize) {
    if failed == 0 {
        tracing::info!(label, total, "batch complete: {}/{} successful", successful, total);
    } else if successful == 0 {
        tracing::error!(label, total, failed, "batch complete: every station failed");
    } else {
        tracing::warn!(label, total, failed, "batch complete: {}/{} successful, {} failed", successful, total, failed);
    }
}
