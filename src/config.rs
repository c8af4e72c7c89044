/// Service configuration loader - parses riverlink.toml
///
/// Separates provider endpoints, retrieval tiers, datum offsets and alert
/// limits from code, so a new fallback tier or a corrected station offset is
/// a config edit rather than a rebuild. Every section has defaults; an empty
/// file yields a working configuration apart from API keys.
///
/// API keys are never compiled in. They resolve in this order:
///   1. the environment variable named by `api_key_env` (`.env` is loaded first)
///   2. the literal `api_key` in the config file
///   3. otherwise `ConfigError::MissingCredential` if the provider requires one

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ingest;
use crate::model::{Provider, RetrievalTier, Sampling};

pub const DEFAULT_CONFIG_PATH: &str = "riverlink.toml";

/// Browser-like client identifier. The public data portal blocks requests
/// that look automated.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Upper bound on any single provider call.
pub const MAX_CALL_TIMEOUT_SECS: f64 = 10.0;

/// Upper bound on a resolver probe.
pub const MAX_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Longest lookback a tier or a resolver probe may request.
pub const MAX_LOOKBACK_MINUTES: i64 = 31 * 24 * 60;

/// Upper bound on the clock-skew allowance and the join tolerance.
pub const MAX_SLACK_MINUTES: i64 = 24 * 60;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration problems. These are the only fatal errors in the service:
/// they are raised at startup, before any station is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("station directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("station directory is invalid: {0}")]
    InvalidRoster(String),

    #[error("no API key for {provider}: set {env} or api_key in [providers.{provider}]")]
    MissingCredential { provider: Provider, env: String },

    #[error("invalid retrieval tier plan: {0}")]
    InvalidTierPlan(String),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// TOML structures
// ---------------------------------------------------------------------------

/// Root of riverlink.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Path to the station roster, relative to the working directory.
    pub roster_path: String,
    pub providers: ProvidersSection,
    /// Ordered fallback plan. Tiers are grouped by provider, keeping file order.
    pub tiers: Vec<TierConfig>,
    pub resolver: ResolverConfig,
    pub retrieval: RetrievalConfig,
    pub normalizer: NormalizerConfig,
    pub reconcile: ReconcileConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            roster_path: "stations.toml".to_string(),
            providers: ProvidersSection::default(),
            tiers: Vec::new(),
            resolver: ResolverConfig::default(),
            retrieval: RetrievalConfig::default(),
            normalizer: NormalizerConfig::default(),
            reconcile: ReconcileConfig::default(),
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    pub hrfco: ProviderSection,
    pub nier: ProviderSection,
    pub autonet: ProviderSection,
}

impl ProvidersSection {
    pub fn section(&self, provider: Provider) -> &ProviderSection {
        match provider {
            Provider::Hrfco => &self.hrfco,
            Provider::Nier => &self.nier,
            Provider::AutoNet => &self.autonet,
        }
    }
}

/// Per-provider overrides. Anything left out falls back to the provider's
/// built-in default (see `ProviderSettings::defaults`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub api_key: Option<String>,
    pub requires_key: Option<bool>,
    pub user_agent: Option<String>,
    pub courtesy_delay_ms: Option<u64>,
    /// Offset of the provider's naive timestamps from UTC, in hours.
    pub clock_utc_offset_hours: Option<i32>,
    pub probe_sampling: Option<Sampling>,
    /// JSON field carrying the measurement (NIER).
    pub value_field: Option<String>,
    /// JSON field carrying the timestamp (NIER).
    pub time_field: Option<String>,
    /// Quantity to read from the tag-based payload (AutoNet), e.g. "ph".
    pub quantity: Option<String>,
    /// Tag-to-quantity mapping (AutoNet). Asserted, not schema-confirmed;
    /// check it with `riverlink verify-fields`.
    pub fields: Option<Vec<FieldMapping>>,
}

/// Maps one measurement tag in the AutoNet payload to a physical quantity,
/// with the range a real reading of that quantity must fall in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldMapping {
    pub quantity: String,
    pub tag: String,
    pub plausible_min: f64,
    pub plausible_max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierConfig {
    pub provider: Provider,
    pub sampling: Sampling,
    pub lookback_minutes: i64,
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub probe_lookback_minutes: i64,
    pub probe_timeout_ms: u64,
    /// Width of the numeric neighborhood searched after the explicit
    /// candidates fail. 0 disables widening.
    pub neighborhood_radius: u32,
    pub neighborhood_delay_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            probe_lookback_minutes: 60,
            probe_timeout_ms: MAX_PROBE_TIMEOUT_MS,
            neighborhood_radius: 0,
            neighborhood_delay_ms: 75,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// How far past "now" a sample may be stamped before the provider's
    /// clock is considered uncorrected.
    pub max_future_skew_minutes: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            max_future_skew_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Level values at or above this, with no datum offset known, are
    /// labelled elevations. Approximate; see `normalize`.
    pub magnitude_threshold_m: f64,
    pub datum_offsets: Vec<DatumOffset>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            magnitude_threshold_m: 20.0,
            datum_offsets: Vec::new(),
        }
    }
}

/// Datum correction applied to every station whose name contains `station_contains`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatumOffset {
    pub station_contains: String,
    pub offset_m: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub level_provider: Provider,
    pub quality_provider: Provider,
    pub tolerance_minutes: i64,
    pub quality_limit: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            level_provider: Provider::Hrfco,
            quality_provider: Provider::Nier,
            tolerance_minutes: 30,
            quality_limit: 25.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
    pub run_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            workers: 4,
            run_timeout_secs: 300,
        }
    }
}

impl BatchConfig {
    /// Worker count clamped to 1..=8 so the per-host courtesy delay stays meaningful.
    pub fn worker_count(&self) -> usize {
        self.workers.clamp(1, 8)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            with_target: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved provider settings
// ---------------------------------------------------------------------------

/// Provider settings after merging the config overrides onto the built-in
/// defaults and resolving the API key.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub courtesy_delay_ms: u64,
    pub clock_utc_offset_hours: i32,
    pub probe_sampling: Sampling,
    pub value_field: String,
    pub time_field: String,
    pub quantity: String,
    pub fields: Vec<FieldMapping>,
}

impl ProviderSettings {
    /// Built-in defaults for each network.
    pub fn defaults(provider: Provider) -> Self {
        match provider {
            Provider::Hrfco => ProviderSettings {
                provider,
                base_url: "http://api.hrfco.go.kr".to_string(),
                api_key: None,
                user_agent: BROWSER_USER_AGENT.to_string(),
                courtesy_delay_ms: 200,
                clock_utc_offset_hours: 9,
                probe_sampling: Sampling::TenMinutes,
                value_field: "wl".to_string(),
                time_field: "ymdhm".to_string(),
                quantity: "water_level".to_string(),
                fields: Vec::new(),
            },
            Provider::Nier => ProviderSettings {
                provider,
                base_url: "http://apis.data.go.kr".to_string(),
                api_key: None,
                user_agent: BROWSER_USER_AGENT.to_string(),
                courtesy_delay_ms: 300,
                clock_utc_offset_hours: 9,
                probe_sampling: Sampling::Hourly,
                value_field: "itemTemp".to_string(),
                time_field: "msrDate".to_string(),
                quantity: "water_temperature".to_string(),
                fields: Vec::new(),
            },
            Provider::AutoNet => ProviderSettings {
                provider,
                base_url: "http://apis.data.go.kr/1480523/RealTimeWaterQualityService".to_string(),
                api_key: None,
                user_agent: BROWSER_USER_AGENT.to_string(),
                courtesy_delay_ms: 300,
                // Server clock is UTC; local time is +9 from here.
                clock_utc_offset_hours: 0,
                probe_sampling: Sampling::Hourly,
                value_field: "m69".to_string(),
                time_field: "msrDate".to_string(),
                quantity: "ph".to_string(),
                fields: vec![
                    FieldMapping {
                        quantity: "ph".to_string(),
                        tag: "m69".to_string(),
                        plausible_min: 0.0,
                        plausible_max: 14.0,
                    },
                    FieldMapping {
                        quantity: "dissolved_oxygen".to_string(),
                        tag: "m70".to_string(),
                        plausible_min: 0.0,
                        plausible_max: 25.0,
                    },
                ],
            },
        }
    }

    fn default_key_env(provider: Provider) -> &'static str {
        match provider {
            Provider::Hrfco => "HRFCO_API_KEY",
            Provider::Nier | Provider::AutoNet => "DATA_GO_KR_API_KEY",
        }
    }

    /// The tag for the configured quantity, if the mapping names it.
    pub fn quantity_tag(&self) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.quantity == self.quantity)
    }
}

impl ServiceConfig {
    /// Merges overrides onto defaults and resolves the API key for `provider`.
    /// `lookup` reads secrets from the environment; tests pass a closure.
    pub fn provider_settings_with<F>(
        &self,
        provider: Provider,
        lookup: F,
    ) -> Result<ProviderSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let section = self.providers.section(provider);
        let mut settings = ProviderSettings::defaults(provider);

        if let Some(url) = &section.base_url {
            settings.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ua) = &section.user_agent {
            settings.user_agent = ua.clone();
        }
        if let Some(ms) = section.courtesy_delay_ms {
            settings.courtesy_delay_ms = ms;
        }
        if let Some(hours) = section.clock_utc_offset_hours {
            if !(-12..=14).contains(&hours) {
                return Err(ConfigError::Invalid(format!(
                    "{}: clock_utc_offset_hours {} is out of range",
                    provider, hours
                )));
            }
            settings.clock_utc_offset_hours = hours;
        }
        if let Some(sampling) = section.probe_sampling {
            settings.probe_sampling = sampling;
        }
        if let Some(field) = &section.value_field {
            settings.value_field = field.clone();
        }
        if let Some(field) = &section.time_field {
            settings.time_field = field.clone();
        }
        if let Some(fields) = &section.fields {
            settings.fields = fields.clone();
        }
        if let Some(quantity) = &section.quantity {
            settings.quantity = quantity.clone();
        }
        if provider == Provider::AutoNet {
            let tag = settings
                .quantity_tag()
                .map(|f| f.tag.clone())
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "autonet: quantity '{}' has no field mapping",
                        settings.quantity
                    ))
                })?;
            settings.value_field = tag;
        }
        if !ingest::supported_samplings(provider).contains(&settings.probe_sampling) {
            return Err(ConfigError::Invalid(format!(
                "{}: probe sampling {} is not supported",
                provider, settings.probe_sampling
            )));
        }

        let env_name = section
            .api_key_env
            .clone()
            .unwrap_or_else(|| ProviderSettings::default_key_env(provider).to_string());
        settings.api_key = lookup(&env_name)
            .filter(|k| !k.trim().is_empty())
            .or_else(|| section.api_key.clone().filter(|k| !k.trim().is_empty()));

        if settings.api_key.is_none() && section.requires_key.unwrap_or(true) {
            return Err(ConfigError::MissingCredential {
                provider,
                env: env_name,
            });
        }

        Ok(settings)
    }

    /// Resolves provider settings with secrets from the process environment,
    /// after loading `.env` if present.
    pub fn provider_settings(&self, provider: Provider) -> Result<ProviderSettings, ConfigError> {
        dotenv::dotenv().ok();
        self.provider_settings_with(provider, |name| std::env::var(name).ok())
    }

    /// Builds and validates the per-provider tier plan. Falls back to the
    /// built-in plan for any provider with no `[[tiers]]` entries.
    pub fn tier_plan(&self) -> Result<TierPlan, ConfigError> {
        let mut by_provider: BTreeMap<Provider, Vec<RetrievalTier>> = BTreeMap::new();

        for (i, tier) in self.tiers.iter().enumerate() {
            if !(1..=MAX_LOOKBACK_MINUTES).contains(&tier.lookback_minutes) {
                return Err(ConfigError::InvalidTierPlan(format!(
                    "tier {} ({}): lookback_minutes must be in 1..={}",
                    i, tier.provider, MAX_LOOKBACK_MINUTES
                )));
            }
            if !(tier.timeout_secs > 0.0 && tier.timeout_secs <= MAX_CALL_TIMEOUT_SECS) {
                return Err(ConfigError::InvalidTierPlan(format!(
                    "tier {} ({}): timeout_secs must be in (0, {}]",
                    i, tier.provider, MAX_CALL_TIMEOUT_SECS
                )));
            }
            if !ingest::supported_samplings(tier.provider).contains(&tier.sampling) {
                return Err(ConfigError::InvalidTierPlan(format!(
                    "tier {} ({}): sampling {} is not offered by this provider",
                    i, tier.provider, tier.sampling
                )));
            }
            by_provider.entry(tier.provider).or_default().push(RetrievalTier {
                provider: tier.provider,
                sampling: tier.sampling,
                lookback: chrono::Duration::minutes(tier.lookback_minutes),
                timeout: std::time::Duration::from_secs_f64(tier.timeout_secs),
            });
        }

        for provider in Provider::ALL {
            by_provider
                .entry(provider)
                .or_insert_with(|| default_tiers(provider));
        }

        for (provider, tiers) in &by_provider {
            let ordered = tiers.windows(2).all(|w| w[0].sampling <= w[1].sampling);
            if !ordered {
                return Err(ConfigError::InvalidTierPlan(format!(
                    "{} tiers must run from finest to coarsest sampling",
                    provider
                )));
            }
        }

        Ok(TierPlan { by_provider })
    }

    pub fn tolerance(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reconcile.tolerance_minutes.clamp(0, MAX_SLACK_MINUTES))
    }

    pub fn future_skew(&self) -> chrono::Duration {
        let minutes = self.retrieval.max_future_skew_minutes.clamp(0, MAX_SLACK_MINUTES);
        chrono::Duration::minutes(minutes)
    }

    /// Range checks for the minute-valued settings outside the tier plan.
    pub fn check_windows(&self) -> Result<(), ConfigError> {
        let checks = [
            (
                "resolver.probe_lookback_minutes",
                self.resolver.probe_lookback_minutes,
                1,
                MAX_LOOKBACK_MINUTES,
            ),
            (
                "retrieval.max_future_skew_minutes",
                self.retrieval.max_future_skew_minutes,
                0,
                MAX_SLACK_MINUTES,
            ),
            ("reconcile.tolerance_minutes", self.reconcile.tolerance_minutes, 0, MAX_SLACK_MINUTES),
        ];
        for (name, value, min, max) in checks {
            if !(min..=max).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be in {}..={}, got {}",
                    name, min, max, value
                )));
            }
        }
        Ok(())
    }
}

/// Validated, per-provider ordered tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPlan {
    by_provider: BTreeMap<Provider, Vec<RetrievalTier>>,
}

impl TierPlan {
    pub fn new(by_provider: BTreeMap<Provider, Vec<RetrievalTier>>) -> Self {
        TierPlan { by_provider }
    }

    pub fn tiers(&self, provider: Provider) -> &[RetrievalTier] {
        self.by_provider
            .get(&provider)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn tier(provider: Provider, sampling: Sampling, lookback_minutes: i64, timeout_secs: u64) -> RetrievalTier {
    RetrievalTier {
        provider,
        sampling,
        lookback: chrono::Duration::minutes(lookback_minutes),
        timeout: std::time::Duration::from_secs(timeout_secs),
    }
}

/// Freshest first, most reliable last.
pub fn default_tiers(provider: Provider) -> Vec<RetrievalTier> {
    match provider {
        Provider::Hrfco => vec![
            tier(provider, Sampling::TenMinutes, 120, 3),
            tier(provider, Sampling::Hourly, 6 * 60, 5),
            tier(provider, Sampling::Daily, 3 * 24 * 60, 10),
        ],
        Provider::Nier => vec![
            tier(provider, Sampling::Hourly, 6 * 60, 5),
            tier(provider, Sampling::Hourly, 48 * 60, 10),
        ],
        Provider::AutoNet => vec![
            tier(provider, Sampling::Hourly, 6 * 60, 5),
            tier(provider, Sampling::Daily, 7 * 24 * 60, 10),
        ],
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses a configuration document and range-checks its minute settings.
/// The tier plan is checked separately by `tier_plan`.
pub fn parse_config(contents: &str, path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.check_windows()?;
    Ok(config)
}

/// Loads riverlink.toml (or the given path).
///
/// A missing file is fatal: the service will not guess at provider endpoints
/// or tiers for a path the operator named explicitly.
pub fn load_config(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents, path)
}
