/// Integration tests for the full request pipeline and batch runs.
///
/// These tests verify:
/// 1. Joined series with both sides, one side, and neither side available
/// 2. Batch runs keep input order and stop issuing requests when cancelled
/// 3. The shipped riverlink.toml and stations.toml load and validate
///
/// Providers are scripted; no network access is needed.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{now, provider_set, regular, ScriptedProvider};
use riverlink_service::batch;
use riverlink_service::config::{load_config, BatchConfig, ConfigError, ServiceConfig};
use riverlink_service::model::{Provider, Sampling, StationFailure, TimeRange, Unit};
use riverlink_service::retrieval::CancelToken;
use riverlink_service::service::Monitor;
use riverlink_service::stations::Directory;

const ROSTER: &str = r#"
[[station]]
name = "Paldang Dam (팔당댐)"
codes.hrfco = ["1018640"]
codes.nier = ["1018A30"]

[[station]]
name = "Hangang Bridge (한강대교)"
codes.hrfco = ["1018683"]
codes.nier = ["1018A45"]

[[station]]
name = "Haengju Bridge (행주대교)"
codes.hrfco = ["1019630"]
codes.nier = ["1019A10"]
"#;

fn range() -> TimeRange {
    TimeRange::trailing_hours(now(), 5)
}

/// Levels every 10 minutes for all three stations; quality hourly for
/// Paldang only, with one hour over the default 25.0 limit.
fn sources() -> (Arc<ScriptedProvider>, Arc<ScriptedProvider>) {
    let levels = |base: f64| regular(now(), 10, 31, move |i| base + i as f64 * 0.01);
    let hrfco = Arc::new(
        ScriptedProvider::new(Provider::Hrfco)
            .with_samples("1018640", Sampling::TenMinutes, levels(2.4))
            .with_samples("1018683", Sampling::TenMinutes, levels(3.1))
            .with_samples("1019630", Sampling::TenMinutes, levels(1.2)),
    );
    let nier = Arc::new(ScriptedProvider::new(Provider::Nier).with_samples(
        "1018A30",
        Sampling::Hourly,
        regular(now(), 60, 6, |i| if i == 3 { 26.2 } else { 23.0 + i as f64 * 0.1 }),
    ));
    (hrfco, nier)
}

fn monitor(hrfco: &Arc<ScriptedProvider>, nier: &Arc<ScriptedProvider>) -> Monitor {
    let config = ServiceConfig::default();
    let directory = Directory::parse(ROSTER, &config.normalizer.datum_offsets).unwrap();
    Monitor::new(directory, provider_set(&[hrfco.clone(), nier.clone()]), &config).unwrap()
}

// ---------------------------------------------------------------------------
// Joined series
// ---------------------------------------------------------------------------

#[test]
fn test_joined_series_with_both_sides() {
    let (hrfco, nier) = sources();
    let monitor = monitor(&hrfco, &nier);

    let series = monitor
        .request_joined_series("Paldang Dam (팔당댐)", range(), monitor.quality_limit())
        .unwrap();

    assert!(series.missing.is_empty());
    // Every quality timestamp coincides with a level timestamp.
    assert_eq!(series.records.len(), 31);
    let with_both = series
        .records
        .iter()
        .filter(|r| r.level.is_some() && r.quality.is_some())
        .count();
    assert_eq!(with_both, 31);
    assert!(series.records.iter().all(|r| r.level.as_ref().unwrap().unit == Unit::Depth));

    let summary = series.summary();
    assert_eq!(summary.peak_quality, Some(26.2));
    // The 26.2 sample is nearest to itself and to the level samples within 30 minutes.
    assert_eq!(summary.alerts, 6);
}

#[test]
fn test_joined_series_with_quality_missing() {
    let (hrfco, nier) = sources();
    let monitor = monitor(&hrfco, &nier);

    let series = monitor
        .request_joined_series("Hangang Bridge (한강대교)", range(), 25.0)
        .unwrap();

    assert_eq!(series.records.len(), 31);
    assert!(series.records.iter().all(|r| r.quality.is_none() && !r.is_alert));
    assert_eq!(series.missing.len(), 1);
    assert!(matches!(
        &series.missing[0],
        StationFailure::Unresolved { provider: Provider::Nier, .. }
    ));

    let response = series.to_response();
    assert_eq!(response.missing[0].provider, Some(Provider::Nier));
}

#[test]
fn test_joined_series_with_neither_side() {
    let hrfco = Arc::new(ScriptedProvider::new(Provider::Hrfco));
    let nier = Arc::new(ScriptedProvider::new(Provider::Nier));
    let monitor = monitor(&hrfco, &nier);

    let failure = monitor
        .request_joined_series("Haengju Bridge (행주대교)", range(), 25.0)
        .unwrap_err();

    match failure {
        StationFailure::Unjoinable { station, level, quality } => {
            assert_eq!(station, "Haengju Bridge (행주대교)");
            assert_eq!(level.provider(), Some(Provider::Hrfco));
            assert_eq!(quality.provider(), Some(Provider::Nier));
        }
        other => panic!("expected Unjoinable, got {:?}", other),
    }
}

#[test]
fn test_unknown_station() {
    let (hrfco, nier) = sources();
    let monitor = monitor(&hrfco, &nier);

    let failure = monitor
        .request_reading("Seoul Forest", Provider::Hrfco, range())
        .unwrap_err();
    assert_eq!(failure, StationFailure::UnknownStation { station: "Seoul Forest".to_string() });
    assert_eq!(hrfco.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[test]
fn test_batch_readings_in_input_order() {
    let (hrfco, nier) = sources();
    let monitor = Arc::new(monitor(&hrfco, &nier));
    let stations: Vec<String> = vec![
        "Haengju Bridge (행주대교)".to_string(),
        "Nowhere".to_string(),
        "Paldang Dam (팔당댐)".to_string(),
    ];

    let report = batch::run_readings(
        monitor,
        &stations,
        Provider::Hrfco,
        range(),
        &BatchConfig { workers: 3, run_timeout_secs: 0 },
        &CancelToken::new(),
    );

    let names: Vec<&str> = report.outcomes.iter().map(|o| o.station.as_str()).collect();
    assert_eq!(names, ["Haengju Bridge (행주대교)", "Nowhere", "Paldang Dam (팔당댐)"]);
    assert_eq!(report.successful(), 2);
    assert_eq!(report.failed(), 1);
    assert!((report.outcomes[2].result.as_ref().unwrap().value - 2.7).abs() < 1e-9);
}

#[test]
fn test_cancelled_batch_makes_no_requests() {
    let (hrfco, nier) = sources();
    let monitor = Arc::new(monitor(&hrfco, &nier));
    let stations = monitor.directory().names();
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = batch::run_readings(
        monitor,
        &stations,
        Provider::Hrfco,
        range(),
        &BatchConfig::default(),
        &cancel,
    );

    assert_eq!(report.outcomes.len(), 3);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o.result, Err(StationFailure::Cancelled { .. }))));
    assert_eq!(hrfco.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Shipped configuration
// ---------------------------------------------------------------------------

#[test]
fn test_shipped_configuration_loads() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = load_config(root.join("riverlink.toml")).unwrap();
    config.tier_plan().unwrap();

    let directory = Directory::load(root.join(&config.roster_path), &config.normalizer.datum_offsets).unwrap();
    assert!(directory.len() >= 5);

    let paldang = directory.find("Paldang Dam (팔당댐)").unwrap();
    assert_eq!(paldang.datum_offset, Some(25.5));

    let hangang = directory.find("Hangang Bridge (한강대교)").unwrap();
    assert_eq!(hangang.datum_offset, None);
    assert!(hangang.candidates(Provider::Hrfco).iter().any(|c| c == "1018683"));

    for station in directory.stations() {
        for code in station.candidates(Provider::Hrfco) {
            assert!(code.len() == 7 && code.chars().all(|c| c.is_ascii_digit()), "bad code {}", code);
        }
    }
}

#[test]
fn test_monitor_rejects_out_of_range_minutes() {
    let (hrfco, nier) = sources();
    let mut config = ServiceConfig::default();
    config.resolver.probe_lookback_minutes = i64::MAX;
    let directory = Directory::parse(ROSTER, &config.normalizer.datum_offsets).unwrap();

    let result = Monitor::new(directory, provider_set(&[hrfco, nier]), &config);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}
