#![allow(dead_code)]

/// Shared fakes for the integration tests.
///
/// `ScriptedProvider` answers from a table keyed by code and sampling and
/// records every call, so tests can assert exactly how many upstream
/// requests a pipeline step made. A cancelled token short-circuits before
/// the call is recorded, like a request that never left the courtesy queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use riverlink_service::ingest::{ProviderSet, SeriesProvider};
use riverlink_service::model::{FetchError, Provider, RawSample, RetrievalTier, Sampling};
use riverlink_service::retrieval::CancelToken;

/// Fixed "now" for every scenario: 2024-07-15 05:00 UTC (14:00 KST).
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 15, 5, 0, 0).unwrap()
}

pub fn minutes_ago(m: i64) -> DateTime<Utc> {
    now() - Duration::minutes(m)
}

pub fn tier(provider: Provider, sampling: Sampling, lookback_minutes: i64) -> RetrievalTier {
    RetrievalTier {
        provider,
        sampling,
        lookback: Duration::minutes(lookback_minutes),
        timeout: std::time::Duration::from_secs(1),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub code: String,
    pub sampling: Sampling,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub struct ScriptedProvider {
    provider: Provider,
    answers: HashMap<(String, Sampling), Result<Vec<RawSample>, FetchError>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    pub fn new(provider: Provider) -> Self {
        ScriptedProvider {
            provider,
            answers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Samples served for `code` at `sampling`, clipped to each request window.
    pub fn with_samples(mut self, code: &str, sampling: Sampling, samples: Vec<RawSample>) -> Self {
        self.answers.insert((code.to_string(), sampling), Ok(samples));
        self
    }

    pub fn with_error(mut self, code: &str, sampling: Sampling, error: FetchError) -> Self {
        self.answers.insert((code.to_string(), sampling), Err(error));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, code: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.code == code).count()
    }
}

impl SeriesProvider for ScriptedProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn fetch_series(
        &self,
        code: &str,
        sampling: Sampling,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _timeout: std::time::Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawSample>, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        self.calls.lock().unwrap().push(Call {
            code: code.to_string(),
            sampling,
            start,
            end,
        });
        match self.answers.get(&(code.to_string(), sampling)) {
            Some(Ok(samples)) => {
                let rows: Vec<RawSample> = samples
                    .iter()
                    .filter(|s| s.timestamp >= start && s.timestamp <= end)
                    .cloned()
                    .collect();
                if rows.is_empty() {
                    Err(FetchError::EmptyResult(format!("{} has no rows in window", code)))
                } else {
                    Ok(rows)
                }
            }
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::EmptyResult(format!("{} is not a live code", code))),
        }
    }
}

/// A provider set holding the given scripted providers.
pub fn provider_set(sources: &[Arc<ScriptedProvider>]) -> ProviderSet {
    let mut set = ProviderSet::new();
    for source in sources {
        set.insert(source.clone());
    }
    set
}

/// `count` samples every `step` minutes ending at `end`, values from `value`.
pub fn regular(end: DateTime<Utc>, step: i64, count: i64, value: impl Fn(i64) -> f64) -> Vec<RawSample> {
    (0..count)
        .map(|i| {
            let t = end - Duration::minutes(step * (count - 1 - i));
            RawSample::new(t, format!("{}", value(i)))
        })
        .collect()
}
