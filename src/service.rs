/// The inbound surface: a station name and a time range in, a normalized
/// reading or a typed failure out.
///
/// `Monitor` wires the pipeline together:
///   Directory → Resolver → RetrievalEngine → Normalizer (level only)
///   → Reconciler → Threshold evaluator
///
/// It is `Send + Sync` and shared across batch workers behind an `Arc`.
/// The only state that changes during a run is the resolved-code cache on
/// each station.

use chrono::Duration;
use serde::Serialize;
use std::path::Path;

use crate::alert::thresholds::{self, AlertSummary};
use crate::analysis::reconcile;
use crate::config::{ConfigError, ServiceConfig, TierPlan};
use crate::ingest::{self, ProviderSet};
use crate::logging;
use crate::model::{
    FailureReport, FetchError, JoinedRecord, Provider, Reading, StationFailure, TimeRange,
};
use crate::normalize::Normalizer;
use crate::resolve::{ResolveError, Resolver};
use crate::retrieval::{CancelToken, Exhausted, RetrievalEngine};
use crate::stations::{Directory, Station};

/// A joined level/quality series for one station. When one side could not
/// be fetched the records carry only the other side, and the failure is
/// kept in `missing`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedSeries {
    pub station: String,
    pub range: TimeRange,
    pub records: Vec<JoinedRecord>,
    pub missing: Vec<StationFailure>,
}

impl JoinedSeries {
    pub fn summary(&self) -> AlertSummary {
        thresholds::summarize(&self.records)
    }

    pub fn to_response(&self) -> JoinedSeriesResponse {
        JoinedSeriesResponse {
            station: self.station.clone(),
            start: self.range.start,
            end: self.range.end,
            summary: self.summary(),
            records: self.records.clone(),
            missing: self.missing.iter().map(FailureReport::from).collect(),
        }
    }
}

/// JSON shape of a joined series.
#[derive(Debug, Serialize)]
pub struct JoinedSeriesResponse {
    pub station: String,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
    pub summary: AlertSummary,
    pub records: Vec<JoinedRecord>,
    pub missing: Vec<FailureReport>,
}

#[derive(Debug)]
pub struct Monitor {
    directory: Directory,
    resolver: Resolver,
    engine: RetrievalEngine,
    normalizer: Normalizer,
    plan: TierPlan,
    level_provider: Provider,
    quality_provider: Provider,
    tolerance: Duration,
    quality_limit: f64,
}

impl Monitor {
    /// Assembles a monitor from an already-loaded directory and provider set.
    pub fn new(
        directory: Directory,
        providers: ProviderSet,
        config: &ServiceConfig,
    ) -> Result<Self, ConfigError> {
        if config.reconcile.level_provider == config.reconcile.quality_provider {
            return Err(ConfigError::Invalid(
                "reconcile.level_provider and reconcile.quality_provider must differ".to_string(),
            ));
        }
        config.check_windows()?;

        let mut resolver = Resolver::new(providers.clone(), &config.resolver);
        for provider in Provider::ALL {
            if let Some(sampling) = config.providers.section(provider).probe_sampling {
                resolver = resolver.with_probe_sampling(provider, sampling);
            }
        }

        Ok(Monitor {
            directory,
            resolver,
            engine: RetrievalEngine::new(providers, config.future_skew()),
            normalizer: Normalizer::from_config(&config.normalizer),
            plan: config.tier_plan()?,
            level_provider: config.reconcile.level_provider,
            quality_provider: config.reconcile.quality_provider,
            tolerance: config.tolerance(),
            quality_limit: config.reconcile.quality_limit,
        })
    }

    /// Loads the roster and builds HTTP clients for every provider the
    /// roster or the reconcile settings use.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let directory = Directory::load(Path::new(&config.roster_path), &config.normalizer.datum_offsets)?;

        let mut wanted = vec![config.reconcile.level_provider, config.reconcile.quality_provider];
        for provider in Provider::ALL {
            if !wanted.contains(&provider) && !directory.names_for(provider).is_empty() {
                wanted.push(provider);
            }
        }
        let providers = ingest::build_providers(config, &wanted)?;

        tracing::info!(
            stations = directory.len(),
            providers = ?wanted,
            "monitor ready"
        );
        Self::new(directory, providers, config)
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn quality_limit(&self) -> f64 {
        self.quality_limit
    }

    pub fn level_provider(&self) -> Provider {
        self.level_provider
    }

    fn station(&self, name: &str) -> Result<&Station, StationFailure> {
        self.directory
            .find(name)
            .ok_or_else(|| StationFailure::UnknownStation {
                station: name.trim().to_string(),
            })
    }

    fn resolve(
        &self,
        station: &Station,
        provider: Provider,
        range: TimeRange,
        cancel: &CancelToken,
    ) -> Result<String, StationFailure> {
        match self.resolver.resolve_at(station, provider, range.end, cancel) {
            Ok(resolved) => Ok(resolved.code),
            Err(ResolveError::Unresolved { tried, .. }) => Err(StationFailure::Unresolved {
                station: station.name.clone(),
                provider,
                tried,
            }),
            Err(ResolveError::Cancelled) => Err(StationFailure::Cancelled {
                station: station.name.clone(),
                provider,
            }),
        }
    }

    fn exhausted(station: &Station, provider: Provider, exhausted: Exhausted) -> StationFailure {
        let all_cancelled = !exhausted.reasons.is_empty()
            && exhausted.reasons.iter().all(|r| r.error == FetchError::Cancelled);
        if all_cancelled {
            StationFailure::Cancelled {
                station: station.name.clone(),
                provider,
            }
        } else {
            StationFailure::Exhausted {
                station: station.name.clone(),
                provider,
                reasons: exhausted.reasons,
            }
        }
    }

    /// Latest reading for `station_name` from `provider`. Tier windows are
    /// anchored at `range.end`; each tier's lookback bounds how stale the
    /// reading may be.
    pub fn request_reading(
        &self,
        station_name: &str,
        provider: Provider,
        range: TimeRange,
    ) -> Result<Reading, StationFailure> {
        self.request_reading_with(station_name, provider, range, &CancelToken::new())
    }

    pub fn request_reading_with(
        &self,
        station_name: &str,
        provider: Provider,
        range: TimeRange,
        cancel: &CancelToken,
    ) -> Result<Reading, StationFailure> {
        let result = self.station(station_name).and_then(|station| {
            let code = self.resolve(station, provider, range, cancel)?;
            let reading = self
                .engine
                .fetch(&code, self.plan.tiers(provider), range.end, cancel)
                .map_err(|e| Self::exhausted(station, provider, e))?;
            Ok(self.finish(reading, station, provider))
        });

        if let Err(failure) = &result {
            logging::log_station_failure(failure);
        }
        result
    }

    fn finish(&self, reading: Reading, station: &Station, provider: Provider) -> Reading {
        if provider == self.level_provider {
            self.normalizer.normalize(reading, station)
        } else {
            reading
        }
    }

    /// Every reading of one side in `range`, normalized if it is the level side.
    fn series(
        &self,
        station: &Station,
        provider: Provider,
        range: TimeRange,
        cancel: &CancelToken,
    ) -> Result<Vec<Reading>, StationFailure> {
        let code = self.resolve(station, provider, range, cancel)?;
        let readings = self
            .engine
            .fetch_window(&code, self.plan.tiers(provider), range, cancel)
            .map_err(|e| Self::exhausted(station, provider, e))?;
        Ok(readings
            .into_iter()
            .map(|r| self.finish(r, station, provider))
            .collect())
    }

    /// Level and quality series for one station, joined on nearest
    /// timestamp and marked against `quality_threshold`.
    ///
    /// Fails only if the station is unknown or both sides fail; a single
    /// missing side is reported in `JoinedSeries::missing`.
    pub fn request_joined_series(
        &self,
        station_name: &str,
        range: TimeRange,
        quality_threshold: f64,
    ) -> Result<JoinedSeries, StationFailure> {
        self.request_joined_series_with(station_name, range, quality_threshold, &CancelToken::new())
    }

    pub fn request_joined_series_with(
        &self,
        station_name: &str,
        range: TimeRange,
        quality_threshold: f64,
        cancel: &CancelToken,
    ) -> Result<JoinedSeries, StationFailure> {
        let station = self.station(station_name).inspect_err(logging::log_station_failure)?;

        let level = self.series(station, self.level_provider, range, cancel);
        let quality = self.series(station, self.quality_provider, range, cancel);

        let (level, quality, missing) = match (level, quality) {
            (Err(level), Err(quality)) => {
                let failure = StationFailure::Unjoinable {
                    station: station.name.clone(),
                    level: Box::new(level),
                    quality: Box::new(quality),
                };
                logging::log_station_failure(&failure);
                return Err(failure);
            }
            (Ok(level), Ok(quality)) => (level, quality, Vec::new()),
            (Ok(level), Err(e)) => (level, Vec::new(), vec![e]),
            (Err(e), Ok(quality)) => (Vec::new(), quality, vec![e]),
        };
        for failure in &missing {
            logging::log_station_failure(failure);
        }

        let records: Vec<JoinedRecord> = reconcile::join(level, quality, self.tolerance)
            .map(|r| thresholds::evaluate(r, quality_threshold))
            .collect();

        tracing::info!(
            station = station.name.as_str(),
            records = records.len(),
            alerts = records.iter().filter(|r| r.is_alert).count(),
            "joined series ready"
        );

        Ok(JoinedSeries {
            station: station.name.clone(),
            range,
            records,
            missing,
        })
    }
}
