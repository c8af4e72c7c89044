/// Integration tests for joining level and quality series.
///
/// These tests verify:
/// 1. A 10-minute level series joined with an hourly quality series gives
///    one record per quality sample, paired with the nearest level sample
/// 2. A quality value never appears in a record further than the tolerance
///    from its own timestamp
/// 3. Output is ascending and tolerance 0 only pairs exact matches

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use riverlink_service::analysis::reconcile;
use riverlink_service::model::{JoinedRecord, Provenance, Provider, Reading, Sampling, Unit};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap()
}

fn reading(provider: Provider, sampling: Sampling, minute: i64, value: f64) -> Reading {
    Reading {
        timestamp: base() + Duration::minutes(minute),
        value,
        unit: Unit::Unknown,
        provenance: Provenance {
            provider,
            sampling,
            tier: 0,
            code: "1018640".to_string(),
        },
    }
}

fn level(minute: i64) -> Reading {
    reading(Provider::Hrfco, Sampling::TenMinutes, minute, 2.0 + minute as f64 / 1000.0)
}

fn quality(minute: i64) -> Reading {
    reading(Provider::Nier, Sampling::Hourly, minute, 20.0 + minute as f64 / 60.0)
}

fn join(level: Vec<Reading>, quality: Vec<Reading>, tolerance_minutes: i64) -> Vec<JoinedRecord> {
    reconcile::join(level, quality, Duration::minutes(tolerance_minutes)).collect()
}

#[test]
fn test_ten_minute_level_with_hourly_quality() {
    // Level every 10 minutes from 00:00 to 06:00, quality hourly at :05.
    let levels: Vec<Reading> = (0..=36).map(|i| level(i * 10)).collect();
    let qualities: Vec<Reading> = (0..6).map(|h| quality(h * 60 + 5)).collect();

    let records = join(levels, qualities.clone(), 30);

    for q in &qualities {
        let at_q: Vec<&JoinedRecord> = records.iter().filter(|r| r.timestamp == q.timestamp).collect();
        assert_eq!(at_q.len(), 1, "one record per quality sample");
        assert_eq!(at_q[0].quality.as_ref(), Some(q));
        // :05 is equidistant from :00 and :10; the earlier level wins.
        let paired = at_q[0].level.as_ref().unwrap();
        assert_eq!(paired.timestamp, q.timestamp - Duration::minutes(5));
    }

    for record in &records {
        if let Some(q) = &record.quality {
            let gap = (record.timestamp - q.timestamp).num_minutes().abs();
            assert!(gap <= 30, "quality from {} reused {} minutes away", q.timestamp, gap);
        }
    }
}

#[test]
fn test_quality_outside_tolerance_leaves_level_alone() {
    let records = join(vec![level(0), level(120)], vec![quality(60)], 30);

    assert_eq!(records.len(), 3);
    assert!(records[0].quality.is_none());
    assert!(records[1].level.is_none());
    assert_eq!(records[1].quality.as_ref().unwrap().timestamp, base() + Duration::minutes(60));
    assert!(records[2].quality.is_none());
}

#[test]
fn test_one_side_empty() {
    let records = join(Vec::new(), vec![quality(0), quality(60)], 30);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.level.is_none() && r.quality.is_some()));

    assert!(join(Vec::new(), Vec::new(), 30).is_empty());
}

proptest! {
    #[test]
    fn prop_join_is_ascending_and_within_tolerance(
        level_minutes in proptest::collection::vec(0i64..720, 0..40),
        quality_minutes in proptest::collection::vec(0i64..720, 0..15),
        tolerance in 0i64..90,
    ) {
        let levels: Vec<Reading> = level_minutes.iter().map(|m| level(*m)).collect();
        let qualities: Vec<Reading> = quality_minutes.iter().map(|m| quality(*m)).collect();
        let records = join(levels, qualities, tolerance);

        for pair in records.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
        for record in &records {
            prop_assert!(record.level.is_some() || record.quality.is_some());
            for side in [&record.level, &record.quality].into_iter().flatten() {
                let gap = (record.timestamp - side.timestamp).num_minutes().abs();
                prop_assert!(gap <= tolerance);
            }
        }

        let mut distinct: Vec<i64> = level_minutes.iter().chain(quality_minutes.iter()).copied().collect();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(records.len(), distinct.len());
    }

    #[test]
    fn prop_zero_tolerance_pairs_exact_matches_only(
        level_minutes in proptest::collection::vec(0i64..240, 1..20),
        quality_minutes in proptest::collection::vec(0i64..240, 1..10),
    ) {
        let levels: Vec<Reading> = level_minutes.iter().map(|m| level(*m)).collect();
        let qualities: Vec<Reading> = quality_minutes.iter().map(|m| quality(*m)).collect();

        for record in join(levels, qualities, 0) {
            if let Some(l) = &record.level {
                prop_assert_eq!(l.timestamp, record.timestamp);
            }
            if let Some(q) = &record.quality {
                prop_assert_eq!(q.timestamp, record.timestamp);
            }
        }
    }
}
