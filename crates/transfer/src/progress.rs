use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use lanty_pubsub::Publisher;

/// Live progress of one phase (network transfer or extraction).
///
/// Writers call [`advance`](Self::advance) and [`finish`](Self::finish);
/// every change is announced on [`events`](Self::events) so listeners can
/// re-read the counters. Readers never block writers for longer than a
/// field copy.
pub struct PhaseProgress {
    total: AtomicU64,
    done: AtomicU64,
    started_at: Instant,
    ended_at: Mutex<Option<Instant>>,
    speed: SpeedCalculator,
    events: Publisher<()>,
}

impl std::fmt::Debug for PhaseProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseProgress")
            .field("total", &self.total())
            .field("done", &self.done())
            .field("ended", &self.ended_at().is_some())
            .finish()
    }
}

impl PhaseProgress {
    /// Starts the clock for a phase of `total` bytes (0 if unknown yet).
    pub fn new(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            done: AtomicU64::new(0),
            started_at: Instant::now(),
            ended_at: Mutex::new(None),
            speed: SpeedCalculator::new(None, None),
            events: Publisher::new(),
        }
    }

    /// Records `bytes` more of progress.
    pub fn advance(&self, bytes: u64) {
        self.done.fetch_add(bytes, Ordering::Relaxed);
        self.speed.add_sample(bytes);
        self.events.notify(());
    }

    /// Stops the clock. Later calls keep the first end time.
    pub fn finish(&self) {
        {
            let mut ended = self.ended_at.lock().unwrap_or_else(PoisonError::into_inner);
            if ended.is_none() {
                *ended = Some(Instant::now());
            }
        }
        self.events.notify(());
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        *self.ended_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at().is_some()
    }

    /// Elapsed time: live while running, fixed once finished.
    pub fn duration(&self) -> Duration {
        match self.ended_at() {
            Some(end) => end.duration_since(self.started_at),
            None => self.started_at.elapsed(),
        }
    }

    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return if self.is_finished() { 1.0 } else { 0.0 };
        }
        (self.done() as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Current rate; the overall average once the phase finished.
    pub fn bytes_per_second(&self) -> f64 {
        if self.is_finished() {
            let secs = self.duration().as_secs_f64();
            return if secs > 0.0 {
                self.done() as f64 / secs
            } else {
                0.0
            };
        }
        self.speed.bytes_per_second()
    }

    /// Progress listeners for this phase.
    pub fn events(&self) -> &Publisher<()> {
        &self.events
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }
        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if s.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .samples
            .clear();
    }
}
