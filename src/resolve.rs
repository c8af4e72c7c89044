/// Station-code resolution.
///
/// Networks renumber gauges without notice, so the roster lists several
/// candidate codes per station and provider. The resolver probes them in
/// order with a small live-data request and caches the first that answers
/// on the station for the rest of the run. A run that finds nothing caches
/// that too, so a dead station costs its probes once, not once per request.
///
/// Optional neighborhood widening probes codes numerically adjacent to the
/// nominal one (`+1, -1, +2, -2, ...`). A hit there means the roster is
/// stale and is logged at warn.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ProviderSettings, ResolverConfig, MAX_LOOKBACK_MINUTES, MAX_PROBE_TIMEOUT_MS};
use crate::ingest::ProviderSet;
use crate::logging;
use crate::model::{FetchError, Provider, Sampling};
use crate::retrieval::{parse_value, CancelToken};
use crate::stations::{CodeState, Station};

/// Where a resolved code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFrom {
    /// Resolved earlier in this run.
    Cache,
    /// The explicit candidate at this position.
    Candidate(usize),
    /// A neighbor of the nominal code at this signed distance.
    Neighborhood(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub code: String,
    /// Probe requests issued by this call.
    pub probes: usize,
    pub from: ResolvedFrom,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no live code among {tried:?}")]
    Unresolved { tried: Vec<String>, probes: usize },
    /// The run was cancelled before every candidate was probed. Nothing is
    /// cached, so a later run probes again.
    #[error("resolution cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Resolver {
    providers: ProviderSet,
    probe_lookback: chrono::Duration,
    probe_timeout: Duration,
    probe_sampling: [Sampling; 3],
    neighborhood_radius: u32,
    neighborhood_delay: Duration,
}

impl Resolver {
    pub fn new(providers: ProviderSet, config: &ResolverConfig) -> Self {
        let probe_sampling = Provider::ALL.map(|p| ProviderSettings::defaults(p).probe_sampling);
        let probe_lookback = config.probe_lookback_minutes.clamp(1, MAX_LOOKBACK_MINUTES);
        Resolver {
            providers,
            probe_lookback: chrono::Duration::minutes(probe_lookback),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms.clamp(1, MAX_PROBE_TIMEOUT_MS)),
            probe_sampling,
            neighborhood_radius: config.neighborhood_radius,
            neighborhood_delay: Duration::from_millis(config.neighborhood_delay_ms),
        }
    }

    /// Overrides the sampling used to probe `provider`.
    pub fn with_probe_sampling(mut self, provider: Provider, sampling: Sampling) -> Self {
        self.probe_sampling[provider.index()] = sampling;
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn resolve(&self, station: &Station, provider: Provider) -> Result<Resolved, ResolveError> {
        self.resolve_at(station, provider, Utc::now(), &CancelToken::new())
    }

    /// Resolves the live code for `station` on `provider`, probing windows
    /// that end at `now`.
    pub fn resolve_at(
        &self,
        station: &Station,
        provider: Provider,
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Resolved, ResolveError> {
        let candidates = station.candidates(provider);

        match station.code_state(provider) {
            CodeState::Live(code) => {
                return Ok(Resolved {
                    code: code.to_string(),
                    probes: 0,
                    from: ResolvedFrom::Cache,
                });
            }
            CodeState::Unresolved => {
                return Err(ResolveError::Unresolved {
                    tried: candidates.to_vec(),
                    probes: 0,
                });
            }
            CodeState::Pending => {}
        }

        let mut probes = 0;
        let mut tried: Vec<String> = Vec::new();

        for (i, code) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            probes += 1;
            tried.push(code.clone());
            if self.probe(station, provider, code, now, cancel)? {
                let from = ResolvedFrom::Candidate(i);
                return self.settle(station, provider, code.clone(), tried, probes, from);
            }
        }

        for (distance, code) in self.neighbors(candidates) {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            std::thread::sleep(self.neighborhood_delay);
            probes += 1;
            tried.push(code.clone());
            if self.probe(station, provider, &code, now, cancel)? {
                tracing::warn!(
                    station = station.name.as_str(),
                    provider = %provider,
                    code = code.as_str(),
                    distance,
                    "resolved outside the roster candidates; update stations.toml"
                );
                let from = ResolvedFrom::Neighborhood(distance);
                return self.settle(station, provider, code, tried, probes, from);
            }
        }

        match station.record_resolution(provider, None) {
            CodeState::Live(code) => Ok(Resolved {
                code: code.to_string(),
                probes,
                from: ResolvedFrom::Cache,
            }),
            _ => Err(ResolveError::Unresolved { tried, probes }),
        }
    }

    /// Caches a hit. The station's cell is authoritative: if another worker
    /// settled first, its outcome is returned instead, even a negative one.
    fn settle(
        &self,
        station: &Station,
        provider: Provider,
        code: String,
        tried: Vec<String>,
        probes: usize,
        from: ResolvedFrom,
    ) -> Result<Resolved, ResolveError> {
        let code = match station.record_resolution(provider, Some(code.clone())) {
            CodeState::Live(stored) => stored.to_string(),
            CodeState::Unresolved => {
                tracing::debug!(
                    station = station.name.as_str(),
                    provider = %provider,
                    code = code.as_str(),
                    "hit discarded, station already settled as unresolved"
                );
                return Err(ResolveError::Unresolved { tried, probes });
            }
            CodeState::Pending => code,
        };
        tracing::debug!(
            station = station.name.as_str(),
            provider = %provider,
            code = code.as_str(),
            probes,
            "code resolved"
        );
        Ok(Resolved { code, probes, from })
    }

    /// One minimal live-data request. `Ok(true)` when at least one sample
    /// has a usable value.
    ///
    /// # Errors
    /// - `ResolveError::Cancelled` — `cancel` tripped before or during the
    ///   request. The miss is not evidence the code is dead.
    fn probe(
        &self,
        station: &Station,
        provider: Provider,
        code: &str,
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<bool, ResolveError> {
        let Some(source) = self.providers.get(provider) else {
            return Ok(false);
        };
        let sampling = self.probe_sampling[provider.index()];
        let start = now - self.probe_lookback;
        let result = source
            .fetch_series(code, sampling, start, now, self.probe_timeout, cancel)
            .and_then(|samples| {
                if samples.iter().any(|s| parse_value(&s.raw_value).is_some()) {
                    Ok(())
                } else {
                    Err(FetchError::EmptyResult(format!("{} samples, none usable", samples.len())))
                }
            });
        match result {
            Ok(()) => Ok(true),
            Err(FetchError::Cancelled) => Err(ResolveError::Cancelled),
            Err(_) if cancel.is_cancelled() => Err(ResolveError::Cancelled),
            Err(e) => {
                logging::log_probe_failure(&station.name, provider, code, &e);
                Ok(false)
            }
        }
    }

    /// Neighbors of the first candidate within the configured radius, in
    /// probe order, skipping codes already listed.
    fn neighbors(&self, candidates: &[String]) -> Vec<(i64, String)> {
        neighborhood(candidates, self.neighborhood_radius)
    }
}

/// `nominal ± k` for `k = 1..=radius`, ordered `+1, -1, +2, -2, ...`.
/// Zero-padding width is kept; non-numeric nominal codes have no neighbors.
pub fn neighborhood(candidates: &[String], radius: u32) -> Vec<(i64, String)> {
    let Some(nominal) = candidates.first() else {
        return Vec::new();
    };
    if nominal.is_empty() || !nominal.chars().all(|c| c.is_ascii_digit()) {
        return Vec::new();
    }
    let Ok(base) = nominal.parse::<i64>() else {
        return Vec::new();
    };
    let width = nominal.len();

    let mut out = Vec::new();
    for k in 1..=i64::from(radius) {
        for distance in [k, -k] {
            let n = base + distance;
            if n < 0 {
                continue;
            }
            let code = format!("{:0width$}", n, width = width);
            if code.len() != width || candidates.contains(&code) {
                continue;
            }
            out.push((distance, code));
        }
    }
    out
}
