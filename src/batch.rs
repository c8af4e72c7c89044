/// Parallel runs across many stations.
///
/// Stations are independent, so a batch fans them out over a bounded
/// `threadpool`. Each station's own tiers still run in order on a single
/// worker, and every worker shares the per-host courtesy gates inside the
/// provider clients, so parallelism never raises the request rate to one
/// host above its configured limit.
///
/// A run-level timeout is folded into the cancel token. Once it trips no new
/// requests start; requests already in flight finish or time out on their
/// own per-call timeout. Stations that had not finished report `Cancelled`.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::BatchConfig;
use crate::logging;
use crate::model::{Provider, Reading, StationFailure, TimeRange};
use crate::retrieval::CancelToken;
use crate::service::{JoinedSeries, Monitor};

/// One station's result.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    pub station: String,
    pub result: Result<T, StationFailure>,
}

/// Results in the order the stations were given.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    pub outcomes: Vec<BatchOutcome<T>>,
    /// Jobs that never reported back (a worker panicked).
    pub lost: usize,
    pub elapsed: Duration,
}

impl<T> BatchReport<T> {
    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.successful() + self.lost
    }
}

/// Runs `task` for every station on a pool of `config.worker_count()`
/// workers.
pub fn run<T, F>(
    stations: &[String],
    config: &BatchConfig,
    cancel: &CancelToken,
    label: &str,
    task: F,
) -> BatchReport<T>
where
    T: Send + 'static,
    F: Fn(&str, &CancelToken) -> Result<T, StationFailure> + Send + Sync + 'static,
{
    let started = Instant::now();
    let cancel = if config.run_timeout_secs > 0 {
        cancel.bounded(started + Duration::from_secs(config.run_timeout_secs))
    } else {
        cancel.clone()
    };

    let workers = config.worker_count().min(stations.len().max(1));
    let pool = threadpool::ThreadPool::new(workers);
    let task = Arc::new(task);
    let (tx, rx) = mpsc::channel();

    for (index, station) in stations.iter().enumerate() {
        let tx = tx.clone();
        let task = Arc::clone(&task);
        let cancel = cancel.clone();
        let station = station.clone();
        pool.execute(move || {
            let result = task(&station, &cancel);
            // The receiver outlives every job.
            let _ = tx.send((index, BatchOutcome { station, result }));
        });
    }
    drop(tx);

    let mut slots: Vec<Option<BatchOutcome<T>>> = (0..stations.len()).map(|_| None).collect();
    for (index, outcome) in rx.iter() {
        slots[index] = Some(outcome);
    }
    pool.join();

    let outcomes: Vec<BatchOutcome<T>> = slots.into_iter().flatten().collect();
    let lost = stations.len() - outcomes.len();
    if lost > 0 {
        tracing::error!(label, lost, "batch jobs did not report back");
    }

    let report = BatchReport {
        outcomes,
        lost,
        elapsed: started.elapsed(),
    };
    logging::log_batch_summary(label, stations.len(), report.successful(), report.failed());
    report
}

/// Latest reading from `provider` for each station.
pub fn run_readings(
    monitor: Arc<Monitor>,
    stations: &[String],
    provider: Provider,
    range: TimeRange,
    config: &BatchConfig,
    cancel: &CancelToken,
) -> BatchReport<Reading> {
    let label = format!("{} readings", provider);
    run(stations, config, cancel, &label, move |name, cancel| {
        monitor.request_reading_with(name, provider, range, cancel)
    })
}

/// Joined series for each station.
pub fn run_joined(
    monitor: Arc<Monitor>,
    stations: &[String],
    range: TimeRange,
    quality_threshold: f64,
    config: &BatchConfig,
    cancel: &CancelToken,
) -> BatchReport<JoinedSeries> {
    run(stations, config, cancel, "joined series", move |name, cancel| {
        monitor.request_joined_series_with(name, range, quality_threshold, cancel)
    })
}
