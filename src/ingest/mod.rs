/// Provider clients.
///
/// Every telemetry network is reached through the one `SeriesProvider`
/// capability. URL shape, headers, response envelope and clock convention
/// stay inside the provider's own module; nothing above this layer knows
/// that HRFCO nests rows under `content`, that NIER wraps them in
/// `response.body.items.item`, or that AutoNet answers in tag markup with a
/// UTC clock.
///
/// - `hrfco`   — HRFCO water-level API (JSON `content[]`, KST clock)
/// - `nier`    — NIER water-quality service (nested JSON, KST clock)
/// - `autonet` — automatic water-quality network (XML, UTC clock)
/// - `catalog` — full station listings used to bootstrap the roster
/// - `http`    — shared blocking client with per-host courtesy delay
/// - `markup`  — minimal tag extraction for the XML payloads
/// - `fixtures` (test only) — representative payloads

pub mod autonet;
pub mod catalog;
pub mod hrfco;
pub mod http;
pub mod markup;
pub mod nier;

#[cfg(test)]
pub(crate) mod fixtures;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ConfigError, ServiceConfig};
use crate::model::{FetchError, Provider, RawSample, Sampling};
use crate::retrieval::CancelToken;

// ---------------------------------------------------------------------------
// Provider capability
// ---------------------------------------------------------------------------

/// Uniform access to one telemetry network.
///
/// Implementations make exactly one upstream request per call and never
/// retry internally; fallback is the retrieval engine's job.
pub trait SeriesProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Samples for `code` between `start` and `end`, timestamps in UTC.
    /// Values are returned raw: blank and sentinel entries are kept.
    /// Returns `FetchError::Cancelled` without issuing the request if
    /// `cancel` trips first.
    fn fetch_series(
        &self,
        code: &str,
        sampling: Sampling,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeout: std::time::Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawSample>, FetchError>;
}

/// Sampling resolutions each network publishes.
pub fn supported_samplings(provider: Provider) -> &'static [Sampling] {
    match provider {
        Provider::Hrfco => &[Sampling::TenMinutes, Sampling::Hourly, Sampling::Daily],
        Provider::Nier => &[Sampling::Hourly],
        Provider::AutoNet => &[Sampling::Hourly, Sampling::Daily],
    }
}

/// The set of providers available to the engine and resolver.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<Provider, Arc<dyn SeriesProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: Arc<dyn SeriesProvider>) -> Self {
        self.insert(source);
        self
    }

    pub fn insert(&mut self, source: Arc<dyn SeriesProvider>) {
        self.providers.insert(source.provider(), source);
    }

    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn SeriesProvider>> {
        self.providers.get(&provider)
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.providers.contains_key(&provider)
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.providers.keys().collect();
        keys.sort();
        f.debug_struct("ProviderSet").field("providers", &keys).finish()
    }
}

/// Builds HTTP-backed clients for the given providers from configuration.
/// A provider whose key cannot be resolved is a fatal configuration error.
pub fn build_providers(
    config: &ServiceConfig,
    wanted: &[Provider],
) -> Result<ProviderSet, ConfigError> {
    let mut set = ProviderSet::new();
    for &provider in wanted {
        if set.contains(provider) {
            continue;
        }
        let settings = config.provider_settings(provider)?;
        let http = http::HttpSource::new(&settings)?;
        let source: Arc<dyn SeriesProvider> = match provider {
            Provider::Hrfco => Arc::new(hrfco::HrfcoProvider::new(settings, http)),
            Provider::Nier => Arc::new(nier::NierProvider::new(settings, http)),
            Provider::AutoNet => Arc::new(autonet::AutoNetProvider::new(settings, http)),
        };
        set.insert(source);
    }
    Ok(set)
}

// ---------------------------------------------------------------------------
// Clock helpers
// ---------------------------------------------------------------------------

fn fixed_offset(utc_offset_hours: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// Converts a UTC instant to the naive wall-clock time a provider expects.
pub fn to_provider_clock(t: DateTime<Utc>, utc_offset_hours: i32) -> NaiveDateTime {
    t.with_timezone(&fixed_offset(utc_offset_hours)).naive_local()
}

/// Parses the compact and dashed timestamp styles the networks use,
/// interpreting them on a clock `utc_offset_hours` ahead of UTC.
///
/// Accepted: `202405011400`, `2024050114`, `20240501`,
/// `2024-05-01 14:00`, `2024-05-01 14:00:00`, `2024-05-01T14:00:00`,
/// `2024.05.01 14:00`.
pub fn parse_provider_timestamp(raw: &str, utc_offset_hours: i32) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    let naive = if s.chars().all(|c| c.is_ascii_digit()) {
        match s.len() {
            12 => NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M").ok(),
            10 => NaiveDateTime::parse_from_str(&format!("{}00", s), "%Y%m%d%H%M").ok(),
            8 => NaiveDate::parse_from_str(s, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            _ => None,
        }
    } else {
        let normalized = s.replace('T', " ").replace('.', "-").replace('/', "-");
        NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M"))
            .ok()
    }?;

    fixed_offset(utc_offset_hours)
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

/// Renders a JSON scalar as the raw string the engine validates.
pub fn json_scalar_to_raw(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Rounds a window outward to whole days on the provider clock, for
/// endpoints that only accept dates.
pub fn day_bounds(start: DateTime<Utc>, end: DateTime<Utc>, utc_offset_hours: i32) -> (NaiveDate, NaiveDate) {
    let first = to_provider_clock(start, utc_offset_hours).date();
    let last = to_provider_clock(end, utc_offset_hours).date();
    (first, last.max(first))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
