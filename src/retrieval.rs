/// Tiered retrieval: fetch a reading for a resolved code by escalating
/// through an ordered list of tiers until one yields a valid sample.
///
/// Per call the states are `Pending → TryTier(0) → ... → Success | Exhausted`.
/// Each tier gets exactly one provider call; there are no hidden retries or
/// sleeps. Every failure is recorded with its tier, so an exhausted fetch
/// reports why each tier failed.
///
/// The engine owns value validation. Decoders hand over raw strings; here
/// blank, unparseable and sentinel values are skipped, samples outside the
/// window are dropped, and a sample stamped implausibly far in the future
/// fails the tier as clock skew.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::ingest::ProviderSet;
use crate::logging;
use crate::model::{
    FetchError, Provenance, RawSample, Reading, RetrievalTier, TierFailure, TimeRange, Unit,
};

/// Values the networks publish in place of a missing measurement.
const NO_DATA_SENTINELS: [f64; 4] = [-999.0, -9999.0, -99999.0, 999999.0];

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared cancellation flag with an optional deadline. Cheap to clone; all
/// clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also trips once `deadline` passes.
    pub fn with_deadline(deadline: Instant) -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// A token sharing this one's flag that also trips at `deadline`, or
    /// at the existing deadline if that is sooner.
    pub fn bounded(&self, deadline: Instant) -> Self {
        CancelToken {
            flag: Arc::clone(&self.flag),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Every tier failed. One reason per tier, in plan order.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("all {} tiers failed", .reasons.len())]
pub struct Exhausted {
    pub reasons: Vec<TierFailure>,
}

// ---------------------------------------------------------------------------
// Value validation
// ---------------------------------------------------------------------------

/// Parses a raw provider value. `None` for blank, unparseable, non-finite
/// or sentinel values.
pub fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    let value: f64 = trimmed.replace(',', "").parse().ok()?;
    if !value.is_finite() || NO_DATA_SENTINELS.iter().any(|s| (value - s).abs() < 1e-9) {
        return None;
    }
    Some(value)
}

/// Validated samples inside `accept`, ascending by time.
///
/// # Errors
/// - `ClockSkew` — a valid sample is stamped after `skew_bound`
/// - `EmptyResult` — nothing valid falls inside the window
fn valid_samples(
    raw: Vec<RawSample>,
    accept: TimeRange,
    skew_bound: DateTime<Utc>,
) -> Result<Vec<(DateTime<Utc>, f64)>, FetchError> {
    let total = raw.len();
    let parsed: Vec<(DateTime<Utc>, f64)> = raw
        .into_iter()
        .filter_map(|s| parse_value(&s.raw_value).map(|v| (s.timestamp, v)))
        .collect();

    if let Some(latest) = parsed.iter().map(|(t, _)| *t).max() {
        if latest > skew_bound {
            return Err(FetchError::ClockSkew {
                sample: latest,
                bound: skew_bound,
            });
        }
    }

    let blank = total - parsed.len();
    let mut inside: Vec<(DateTime<Utc>, f64)> = parsed
        .into_iter()
        .filter(|(t, _)| accept.contains(*t))
        .collect();

    if inside.is_empty() {
        let why = if total == 0 {
            "no samples returned".to_string()
        } else if blank == total {
            format!("all {} samples blank or sentinel", total)
        } else {
            format!("no valid sample inside window ({} returned, {} blank)", total, blank)
        };
        return Err(FetchError::EmptyResult(why));
    }

    inside.sort_by_key(|(t, _)| *t);
    Ok(inside)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetrievalEngine {
    providers: ProviderSet,
    max_future_skew: chrono::Duration,
}

impl RetrievalEngine {
    pub fn new(providers: ProviderSet, max_future_skew: chrono::Duration) -> Self {
        RetrievalEngine {
            providers,
            max_future_skew,
        }
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Runs the tiers in order and returns the latest valid reading from the
    /// first tier that has one. Issues at most `tiers.len()` provider calls.
    pub fn fetch(
        &self,
        code: &str,
        tiers: &[RetrievalTier],
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Reading, Exhausted> {
        let skew_bound = now + self.max_future_skew;

        // Samples a little past `now` are accepted; beyond the bound is skew.
        let window_for = |tier: &RetrievalTier| {
            let start = now - tier.lookback;
            (TimeRange::new(start, now), TimeRange::new(start, skew_bound))
        };

        self.escalate(code, tiers, cancel, window_for, skew_bound)
            .map(|(index, tier, samples)| {
                // Latest by timestamp, not by position in the payload.
                let (timestamp, value) = samples[samples.len() - 1];
                Reading {
                    timestamp,
                    value,
                    unit: Unit::Unknown,
                    provenance: Provenance {
                        provider: tier.provider,
                        sampling: tier.sampling,
                        tier: index,
                        code: code.to_string(),
                    },
                }
            })
    }

    /// Every valid reading in `range` from the first tier that has any,
    /// ascending and de-duplicated by timestamp.
    pub fn fetch_window(
        &self,
        code: &str,
        tiers: &[RetrievalTier],
        range: TimeRange,
        cancel: &CancelToken,
    ) -> Result<Vec<Reading>, Exhausted> {
        self.fetch_window_at(code, tiers, range, Utc::now(), cancel)
    }

    pub fn fetch_window_at(
        &self,
        code: &str,
        tiers: &[RetrievalTier],
        range: TimeRange,
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Vec<Reading>, Exhausted> {
        let skew_bound = now + self.max_future_skew;

        self.escalate(code, tiers, cancel, |_| (range, range), skew_bound)
            .map(|(index, tier, samples)| {
                let mut readings: Vec<Reading> = samples
                    .into_iter()
                    .map(|(timestamp, value)| Reading {
                        timestamp,
                        value,
                        unit: Unit::Unknown,
                        provenance: Provenance {
                            provider: tier.provider,
                            sampling: tier.sampling,
                            tier: index,
                            code: code.to_string(),
                        },
                    })
                    .collect();
                readings.dedup_by_key(|r| r.timestamp);
                readings
            })
    }

    /// The tier state machine shared by `fetch` and `fetch_window_at`.
    /// `window_for` gives each tier's request window and the span its
    /// samples must fall in. Returns the winning tier's index, the tier, and
    /// its valid samples.
    fn escalate<'t, W>(
        &self,
        code: &str,
        tiers: &'t [RetrievalTier],
        cancel: &CancelToken,
        window_for: W,
        skew_bound: DateTime<Utc>,
    ) -> Result<(usize, &'t RetrievalTier, Vec<(DateTime<Utc>, f64)>), Exhausted>
    where
        W: Fn(&RetrievalTier) -> (TimeRange, TimeRange),
    {
        let mut reasons = Vec::with_capacity(tiers.len());

        for (index, tier) in tiers.iter().enumerate() {
            if cancel.is_cancelled() {
                reasons.extend(tiers[index..].iter().enumerate().map(|(offset, t)| TierFailure {
                    tier: index + offset,
                    provider: t.provider,
                    sampling: t.sampling,
                    error: FetchError::Cancelled,
                }));
                break;
            }

            let (window, accept) = window_for(tier);
            let attempt = match self.providers.get(tier.provider) {
                Some(source) => source
                    .fetch_series(code, tier.sampling, window.start, window.end, tier.timeout, cancel)
                    .and_then(|raw| valid_samples(raw, accept, skew_bound)),
                None => Err(FetchError::Transport(format!(
                    "no {} client configured",
                    tier.provider
                ))),
            };

            match attempt {
                Ok(samples) => {
                    tracing::debug!(
                        provider = %tier.provider,
                        code,
                        tier = index,
                        samples = samples.len(),
                        "tier succeeded"
                    );
                    return Ok((index, tier, samples));
                }
                Err(error) => {
                    let failure = TierFailure {
                        tier: index,
                        provider: tier.provider,
                        sampling: tier.sampling,
                        error,
                    };
                    logging::log_tier_failure(code, &failure);
                    reasons.push(failure);
                }
            }
        }

        Err(Exhausted { reasons })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SeriesProvider;
    use crate::model::{Provider, Sampling};
    use chrono::{Duration, TimeZone};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers calls from a queue and counts them.
    struct Queued {
        answers: Mutex<VecDeque<Result<Vec<RawSample>, FetchError>>>,
        calls: Mutex<Vec<Sampling>>,
    }

    impl Queued {
        fn new(answers: Vec<Result<Vec<RawSample>, FetchError>>) -> Arc<Self> {
            Arc::new(Queued {
                answers: Mutex::new(answers.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Sampling> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SeriesProvider for Queued {
        fn provider(&self) -> Provider {
            Provider::Hrfco
        }

        fn fetch_series(
            &self,
            _code: &str,
            sampling: Sampling,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _timeout: std::time::Duration,
            _cancel: &CancelToken,
        ) -> Result<Vec<RawSample>, FetchError> {
            self.calls.lock().unwrap().push(sampling);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::EmptyResult("script exhausted".into())))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 5, 0, 0).unwrap()
    }

    fn tiers() -> Vec<RetrievalTier> {
        crate::config::default_tiers(Provider::Hrfco)
    }

    fn engine(source: Arc<Queued>) -> RetrievalEngine {
        RetrievalEngine::new(ProviderSet::new().with(source), Duration::minutes(30))
    }

    #[test]
    fn test_parse_value_rejects_blank_and_sentinels() {
        assert_eq!(parse_value(" 2.45"), Some(2.45));
        assert_eq!(parse_value("1,234.5"), Some(1234.5));
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("-"), None);
        assert_eq!(parse_value("-999"), None);
        assert_eq!(parse_value("999999"), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("점검중"), None);
    }

    #[test]
    fn test_latest_timestamp_wins_not_last_element() {
        let source = Queued::new(vec![Ok(vec![
            RawSample::new(now() - Duration::minutes(10), "2.50"),
            RawSample::new(now() - Duration::minutes(30), "2.40"),
            RawSample::new(now() - Duration::minutes(20), "2.45"),
        ])]);
        let reading = engine(source).fetch("1018683", &tiers(), now(), &CancelToken::new()).unwrap();
        assert_eq!(reading.value, 2.50);
        assert_eq!(reading.timestamp, now() - Duration::minutes(10));
    }

    #[test]
    fn test_blank_latest_sample_is_skipped() {
        let source = Queued::new(vec![Ok(vec![
            RawSample::new(now() - Duration::minutes(20), "2.41"),
            RawSample::new(now() - Duration::minutes(10), ""),
        ])]);
        let reading = engine(source).fetch("1018683", &tiers(), now(), &CancelToken::new()).unwrap();
        assert_eq!(reading.value, 2.41);
    }

    #[test]
    fn test_all_blank_tier_falls_through() {
        let source = Queued::new(vec![
            Ok(vec![RawSample::new(now(), ""), RawSample::new(now(), "-999")]),
            Ok(vec![RawSample::new(now() - Duration::hours(1), "2.45")]),
        ]);
        let reading = engine(source.clone())
            .fetch("1018683", &tiers(), now(), &CancelToken::new())
            .unwrap();
        assert_eq!(reading.provenance.sampling, Sampling::Hourly);
        assert_eq!(reading.provenance.tier, 1);
        assert_eq!(source.calls().len(), 2);
    }

    #[test]
    fn test_future_sample_is_clock_skew() {
        let source = Queued::new(vec![
            Ok(vec![RawSample::new(now() + Duration::hours(9), "2.45")]),
            Err(FetchError::Transport("timed out".into())),
            Err(FetchError::EmptyResult("none".into())),
        ]);
        let err = engine(source).fetch("1018683", &tiers(), now(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.reasons.len(), 3);
        assert!(matches!(err.reasons[0].error, FetchError::ClockSkew { .. }));
        assert!(matches!(err.reasons[1].error, FetchError::Transport(_)));
    }

    #[test]
    fn test_sample_within_skew_is_accepted() {
        let source = Queued::new(vec![Ok(vec![RawSample::new(now() + Duration::minutes(10), "2.45")])]);
        assert!(engine(source).fetch("1018683", &tiers(), now(), &CancelToken::new()).is_ok());
    }

    #[test]
    fn test_stale_samples_outside_lookback_are_ignored() {
        let source = Queued::new(vec![
            Ok(vec![RawSample::new(now() - Duration::hours(5), "2.45")]),
            Ok(vec![RawSample::new(now() - Duration::hours(5), "2.45")]),
        ]);
        let reading = engine(source).fetch("1018683", &tiers(), now(), &CancelToken::new()).unwrap();
        assert_eq!(reading.provenance.tier, 1, "10m tier only looks back two hours");
    }

    #[test]
    fn test_cancelled_token_makes_no_calls() {
        let source = Queued::new(vec![Ok(vec![RawSample::new(now(), "2.45")])]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = engine(source.clone()).fetch("1018683", &tiers(), now(), &cancel).unwrap_err();
        assert!(source.calls().is_empty());
        assert_eq!(err.reasons.len(), 3);
        assert!(err.reasons.iter().all(|r| r.error == FetchError::Cancelled));
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let token = CancelToken::with_deadline(Instant::now());
        assert!(token.is_cancelled());
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn test_missing_provider_is_a_tier_failure() {
        let engine = RetrievalEngine::new(ProviderSet::new(), Duration::minutes(30));
        let err = engine.fetch("1018683", &tiers(), now(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.reasons.len(), 3);
    }

    #[test]
    fn test_fetch_window_returns_sorted_readings_in_range() {
        let range = TimeRange::new(now() - Duration::hours(2), now());
        let source = Queued::new(vec![Ok(vec![
            RawSample::new(now() - Duration::minutes(30), "2.5"),
            RawSample::new(now() - Duration::hours(3), "2.0"),
            RawSample::new(now() - Duration::minutes(90), "2.3"),
            RawSample::new(now() - Duration::minutes(90), "2.3"),
        ])]);
        let readings = engine(source)
            .fetch_window_at("1018683", &tiers(), range, now(), &CancelToken::new())
            .unwrap();
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.3, 2.5]);
    }
}
