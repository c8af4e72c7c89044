//! Riverlink - river level / water quality reconciliation service
//!
//! Resolves station names to provider codes, pulls water level and water
//! quality series through ordered fallback tiers, normalizes levels to
//! depth, and joins the two series for threshold alerting.
//!
//! Usage:
//!   riverlink reading --station "Paldang Dam (팔당댐)"
//!   riverlink joined --station "Paldang Dam (팔당댐)" --hours 24 --limit 25
//!   riverlink batch --hours 6                  # every station in the roster
//!   riverlink catalog --provider hrfco --filter 한강 --toml
//!   riverlink verify-fields --code S01002
//!   riverlink serve --port 8080
//!
//! Environment:
//!   HRFCO_API_KEY      - HRFCO open API key
//!   DATA_GO_KR_API_KEY - public data portal key (NIER, AutoNet)
//!   RUST_LOG           - overrides [logging] level

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};

use riverlink_service::batch;
use riverlink_service::config::{self, ServiceConfig, DEFAULT_CONFIG_PATH};
use riverlink_service::endpoint;
use riverlink_service::ingest::autonet::{self, AutoNetProvider};
use riverlink_service::ingest::catalog::{self, CatalogEntry};
use riverlink_service::ingest::hrfco::HrfcoProvider;
use riverlink_service::ingest::http::HttpSource;
use riverlink_service::ingest::nier::NierProvider;
use riverlink_service::logging;
use riverlink_service::model::{FailureReport, Provider, Sampling, TimeRange, MAX_WINDOW_HOURS};
use riverlink_service::retrieval::CancelToken;
use riverlink_service::service::Monitor;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// `--hours` accepts the same range as the endpoint's `hours` parameter.
fn hours_parser() -> clap::builder::RangedI64ValueParser<i64> {
    clap::value_parser!(i64).range(1..=MAX_WINDOW_HOURS)
}

#[derive(Parser)]
#[command(name = "riverlink", version, about = "River level and water quality reconciliation")]
struct Cli {
    /// Path to the service configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Latest normalized reading for one station
    Reading {
        #[arg(long)]
        station: String,
        /// Defaults to the configured level provider
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long, default_value_t = 6, value_parser = hours_parser())]
        hours: i64,
    },
    /// Joined level/quality series with threshold alerts
    Joined {
        #[arg(long)]
        station: String,
        #[arg(long, default_value_t = 24, value_parser = hours_parser())]
        hours: i64,
        /// Defaults to reconcile.quality_limit
        #[arg(long)]
        limit: Option<f64>,
    },
    /// Runs many stations in parallel
    Batch {
        /// Station names; every roster station when omitted
        #[arg(long = "station")]
        stations: Vec<String>,
        /// Fetch latest readings from this provider instead of joined series
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long, default_value_t = 6, value_parser = hours_parser())]
        hours: i64,
    },
    /// Lists a provider's station catalog
    Catalog {
        #[arg(long)]
        provider: Provider,
        /// Case-insensitive name/address fragment
        #[arg(long)]
        filter: Option<String>,
        /// Print roster TOML instead of JSON
        #[arg(long)]
        toml: bool,
    },
    /// Checks the AutoNet tag mapping against a live payload
    VerifyFields {
        #[arg(long)]
        code: String,
        #[arg(long, default_value_t = 24, value_parser = hours_parser())]
        hours: i64,
    },
    /// Starts the HTTP endpoint
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };
    logging::init(&config.logging);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &ServiceConfig) -> Result<(), String> {
    match command {
        Command::Reading { station, provider, hours } => {
            let monitor = build_monitor(config)?;
            let provider = provider.unwrap_or(monitor.level_provider());
            let range = TimeRange::trailing_hours(Utc::now(), hours);
            match monitor.request_reading(&station, provider, range) {
                Ok(reading) => print_json(&reading),
                Err(failure) => {
                    print_json(&FailureReport::from(&failure))?;
                    Err(failure.to_string())
                }
            }
        }
        Command::Joined { station, hours, limit } => {
            let monitor = build_monitor(config)?;
            let limit = limit.unwrap_or(monitor.quality_limit());
            let range = TimeRange::trailing_hours(Utc::now(), hours);
            match monitor.request_joined_series(&station, range, limit) {
                Ok(series) => print_json(&series.to_response()),
                Err(failure) => {
                    print_json(&FailureReport::from(&failure))?;
                    Err(failure.to_string())
                }
            }
        }
        Command::Batch { stations, provider, hours } => run_batch(config, stations, provider, hours),
        Command::Catalog { provider, filter, toml } => run_catalog(config, provider, filter, toml),
        Command::VerifyFields { code, hours } => run_verify_fields(config, &code, hours),
        Command::Serve { port } => {
            let monitor = Arc::new(build_monitor(config)?);
            println!("🌊 Riverlink endpoint on port {}", port);
            endpoint::start_endpoint_server(port, monitor)
        }
    }
}

fn build_monitor(config: &ServiceConfig) -> Result<Monitor, String> {
    Monitor::from_config(config).map_err(|e| format!("Configuration error: {}", e))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn run_batch(
    config: &ServiceConfig,
    stations: Vec<String>,
    provider: Option<Provider>,
    hours: i64,
) -> Result<(), String> {
    let monitor = Arc::new(build_monitor(config)?);
    let stations = if stations.is_empty() {
        monitor.directory().names()
    } else {
        stations
    };
    let range = TimeRange::trailing_hours(Utc::now(), hours);
    let cancel = CancelToken::new();

    let (rows, failed, lost) = match provider {
        Some(provider) => {
            let report = batch::run_readings(monitor, &stations, provider, range, &config.batch, &cancel);
            let rows: Vec<serde_json::Value> = report
                .outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(reading) => serde_json::json!({ "station": o.station, "reading": reading }),
                    Err(f) => serde_json::json!({ "station": o.station, "failure": FailureReport::from(f) }),
                })
                .collect();
            (rows, report.failed(), report.lost)
        }
        None => {
            let limit = monitor.quality_limit();
            let report = batch::run_joined(monitor, &stations, range, limit, &config.batch, &cancel);
            let rows: Vec<serde_json::Value> = report
                .outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(series) => serde_json::json!({ "station": o.station, "series": series.to_response() }),
                    Err(f) => serde_json::json!({ "station": o.station, "failure": FailureReport::from(f) }),
                })
                .collect();
            (rows, report.failed(), report.lost)
        }
    };

    print_json(&rows)?;
    if lost > 0 {
        return Err(format!("{} batch jobs never reported back", lost));
    }
    if failed == stations.len() && !stations.is_empty() {
        return Err("every station failed".to_string());
    }
    Ok(())
}

fn run_catalog(
    config: &ServiceConfig,
    provider: Provider,
    filter: Option<String>,
    as_toml: bool,
) -> Result<(), String> {
    let settings = config.provider_settings(provider).map_err(|e| e.to_string())?;
    let http = HttpSource::new(&settings).map_err(|e| e.to_string())?;

    let mut entries: Vec<CatalogEntry> = match provider {
        Provider::Hrfco => catalog::fetch_hrfco_catalog(&HrfcoProvider::new(settings, http), FETCH_TIMEOUT),
        Provider::Nier => catalog::fetch_nier_catalog(&NierProvider::new(settings, http), FETCH_TIMEOUT),
        Provider::AutoNet => {
            return Err("autonet publishes no station catalog; use the NIER catalog".to_string());
        }
    }
    .map_err(|e| format!("catalog fetch failed: {}", e))?;

    if let Some(fragment) = &filter {
        entries.retain(|e| e.matches(fragment));
    }
    tracing::info!(provider = %provider, entries = entries.len(), "catalog fetched");

    if as_toml {
        let text = catalog::to_roster_toml(&entries).map_err(|e| e.to_string())?;
        print!("{}", text);
        Ok(())
    } else {
        print_json(&entries)
    }
}

fn run_verify_fields(config: &ServiceConfig, code: &str, hours: i64) -> Result<(), String> {
    let settings = config
        .provider_settings(Provider::AutoNet)
        .map_err(|e| e.to_string())?;
    let http = HttpSource::new(&settings).map_err(|e| e.to_string())?;
    let fields = settings.fields.clone();
    let provider = AutoNetProvider::new(settings, http);

    let range = TimeRange::trailing_hours(Utc::now(), hours);
    let cancel = CancelToken::new();
    let doc = provider
        .fetch_document(code, Sampling::Hourly, range.start, range.end, FETCH_TIMEOUT, &cancel)
        .map_err(|e| format!("fetch failed: {}", e))?;
    let checks = autonet::check_field_mapping(&doc, code, &fields).map_err(|e| e.to_string())?;

    print_json(&checks)?;
    let suspect = checks
        .iter()
        .filter(|c| c.verdict != autonet::FieldVerdict::Plausible)
        .count();
    if suspect > 0 {
        return Err(format!("{} of {} mapped fields look wrong", suspect, checks.len()));
    }
    Ok(())
}
