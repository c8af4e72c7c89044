/// Shared blocking HTTP access for provider clients.
///
/// Each provider owns one `HttpSource`. All requests to that host pass
/// through its `CourtesyGate`, which spaces calls by a minimum interval no
/// matter how many batch workers share the source. Upstream networks block
/// clients that look like automated bursts.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{ConfigError, ProviderSettings};
use crate::model::FetchError;
use crate::retrieval::CancelToken;

// ---------------------------------------------------------------------------
// Courtesy gate
// ---------------------------------------------------------------------------

/// How often a queued caller re-checks its cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Enforces a minimum interval between consecutive requests to one host.
#[derive(Debug)]
pub struct CourtesyGate {
    interval: Duration,
    /// Earliest instant the next caller may be let through.
    next: Mutex<Option<Instant>>,
}

impl CourtesyGate {
    pub fn new(interval: Duration) -> Self {
        CourtesyGate {
            interval,
            next: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes the next free slot, one `interval` after the previous one, and
    /// sleeps until it arrives. The lock is held only to reserve the slot.
    ///
    /// # Errors
    /// - `FetchError::Cancelled` — `cancel` tripped while queued. The slot
    ///   stays spent; later callers are not moved forward.
    pub fn wait(&self, cancel: &CancelToken) -> Result<(), FetchError> {
        let slot = {
            let mut next = self.next.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let now = Instant::now();
            if now >= slot {
                return Ok(());
            }
            std::thread::sleep((slot - now).min(CANCEL_POLL));
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

/// A blocking client bound to one provider's headers and courtesy delay.
#[derive(Debug)]
pub struct HttpSource {
    client: reqwest::blocking::Client,
    gate: CourtesyGate,
}

impl HttpSource {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| {
                ConfigError::Invalid(format!("{}: cannot build HTTP client: {}", settings.provider, e))
            })?;
        Ok(HttpSource {
            client,
            gate: CourtesyGate::new(Duration::from_millis(settings.courtesy_delay_ms)),
        })
    }

    /// Issues one GET and returns the body text. Never retries.
    ///
    /// # Errors
    /// - `FetchError::Cancelled` — `cancel` tripped before the request left
    /// - `FetchError::Transport` — connect failure, timeout, non-2xx status,
    ///   or a body that could not be read.
    pub fn get_text(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<String, FetchError> {
        self.gate.wait(cancel)?;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| describe_transport(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transport(format!("HTTP {}", status.as_u16())));
        }

        response
            .text()
            .map_err(|e| describe_transport(e, timeout))
    }
}

fn describe_transport(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Transport(format!("timed out after {:.1}s", timeout.as_secs_f32()))
    } else if e.is_connect() {
        FetchError::Transport("connection failed".to_string())
    } else {
        // Strip the URL: it can carry the API key in its path.
        FetchError::Transport(e.without_url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_gate_spaces_consecutive_calls() {
        let gate = CourtesyGate::new(Duration::from_millis(40));
        let cancel = CancelToken::new();
        let start = Instant::now();
        for _ in 0..3 {
            gate.wait(&cancel).unwrap();
        }
        assert!(
            start.elapsed() >= Duration::from_millis(80),
            "three calls need two full intervals, took {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn test_gate_first_call_is_immediate() {
        let gate = CourtesyGate::new(Duration::from_secs(5));
        let start = Instant::now();
        gate.wait(&CancelToken::new()).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_gate_serializes_concurrent_workers() {
        let gate = Arc::new(CourtesyGate::new(Duration::from_millis(30)));
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.wait(&CancelToken::new()))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), Ok(()));
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn test_cancelled_caller_leaves_the_queue() {
        let gate = CourtesyGate::new(Duration::from_secs(5));
        gate.wait(&CancelToken::new()).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert_eq!(gate.wait(&cancel), Err(FetchError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1), "must not sit out the interval");
    }

    #[test]
    fn test_deadline_passing_while_queued_cancels() {
        let gate = CourtesyGate::new(Duration::from_secs(5));
        gate.wait(&CancelToken::new()).unwrap();

        let cancel = CancelToken::with_deadline(Instant::now() + Duration::from_millis(60));
        let start = Instant::now();
        assert_eq!(gate.wait(&cancel), Err(FetchError::Cancelled));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(60), "released early: {:?}", waited);
        assert!(waited < Duration::from_secs(2), "slept through the deadline: {:?}", waited);
    }

    #[test]
    fn test_queued_workers_do_not_block_on_a_sleeper() {
        // One caller waits out a long slot; a cancelled caller behind it
        // must still return at once.
        let gate = Arc::new(CourtesyGate::new(Duration::from_millis(400)));
        gate.wait(&CancelToken::new()).unwrap();

        let sleeper = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || gate.wait(&CancelToken::new()))
        };
        std::thread::sleep(Duration::from_millis(20));

        let cancel = CancelToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert_eq!(gate.wait(&cancel), Err(FetchError::Cancelled));
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(sleeper.join().unwrap(), Ok(()));
    }
}
