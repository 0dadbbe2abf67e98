//! Time sources for the poll loop
//!
//! The loop never sleeps or reads the wall clock directly. It waits on a
//! [`Ticker`] and asks a [`Clock`] for the time, so tests can drive lap
//! boundaries and grace periods without real time passing.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Monotonic and wall-clock time
pub trait Clock: Send + Sync + 'static {
    /// Monotonic time, used for grace periods
    fn now(&self) -> Instant;

    /// Wall-clock time, used for session ids and timestamps
    fn utc(&self) -> DateTime<Utc>;
}

/// The real clocks
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualTime>>,
}

#[derive(Debug)]
struct ManualTime {
    now: Instant,
    utc: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(utc: DateTime<Utc>) -> Self {
        Self { inner: Arc::new(Mutex::new(ManualTime { now: Instant::now(), utc })) }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        let mut time = self.lock();
        time.now += by;
        time.utc += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualTime> {
        // A poisoned clock is still a valid clock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.lock().now
    }

    fn utc(&self) -> DateTime<Utc> {
        self.lock().utc
    }
}

/// Paces the poll loop
#[async_trait::async_trait]
pub trait Ticker: Send + 'static {
    /// Wait for the next tick. Returns `false` once the ticker can never
    /// fire again.
    async fn tick(&mut self) -> bool;
}

/// Fixed-rate ticker on the tokio timer
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        // A slow tick delays the schedule instead of bursting to catch up.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait::async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticker released one tick at a time through a [`TickHandle`]
#[derive(Debug)]
pub struct ManualTicker {
    requests: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    in_flight: Option<oneshot::Sender<()>>,
}

/// Releases ticks of a [`ManualTicker`]
#[derive(Debug, Clone)]
pub struct TickHandle {
    requests: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

impl ManualTicker {
    pub fn new() -> (Self, TickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { requests: rx, in_flight: None }, TickHandle { requests: tx })
    }
}

#[async_trait::async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        // Asking for the next tick means the previous one is done.
        if let Some(done) = self.in_flight.take() {
            let _ = done.send(());
        }
        match self.requests.recv().await {
            Some(done) => {
                self.in_flight = Some(done);
                true
            }
            None => false,
        }
    }
}

impl TickHandle {
    /// Release one tick and wait until the loop has finished processing it.
    /// Returns `false` if the loop is gone.
    pub async fn tick(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(tx).is_err() {
            return false;
        }
        rx.await.is_ok()
    }

    /// Release `n` ticks in sequence.
    pub async fn ticks(&self, n: usize) -> bool {
        for _ in 0..n {
            if !self.tick().await {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_moves_both_clocks() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).single().unwrap_or_default();
        let clock = ManualClock::new(start);
        let before = clock.now();
        let shared = clock.clone();

        shared.advance(Duration::from_millis(1500));

        assert_eq!(clock.now() - before, Duration::from_millis(1500));
        assert_eq!(clock.utc() - start, chrono::Duration::milliseconds(1500));
    }

    #[tokio::test]
    async fn manual_ticker_acknowledges_after_next_request() {
        let (mut ticker, handle) = ManualTicker::new();

        let loop_task = tokio::spawn(async move {
            let mut count = 0;
            while ticker.tick().await {
                count += 1;
            }
            count
        });

        assert!(handle.ticks(3).await);
        drop(handle);
        assert_eq!(loop_task.await.unwrap_or_default(), 3);
    }
}
