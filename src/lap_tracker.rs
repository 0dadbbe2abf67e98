//! Lap boundary detection
//!
//! One [`LapTracker`] runs per vehicle: the session manager owns one for the
//! local driver and the opponent tracker creates one per competitor. The
//! tracker only looks at the transition between consecutive lap numbers:
//!
//! | previous → current | outcome                                     |
//! |--------------------|---------------------------------------------|
//! | unset → n          | start buffering                             |
//! | n → n              | append                                      |
//! | n → m, m > n       | lap `n` completed, new buffer starts at `m` |
//! | n → m, m < n       | counter reset, buffer discarded             |

use tracing::trace;

use crate::types::{LapBuffer, NormalizedSample};

/// Result of feeding one observation to a tracker
#[derive(Debug, PartialEq)]
pub enum Observation<T = NormalizedSample> {
    /// Sample appended to the open lap
    Appended,
    /// The lap counter increased; carries every sample recorded before the
    /// boundary. The new buffer starts with the observed sample.
    Completed(LapBuffer<T>),
    /// The lap counter went backwards; the open lap was dropped.
    Restarted {
        previous_lap: u32,
        lap: u32,
        discarded: usize,
    },
}

/// Detects lap boundaries for one vehicle and buffers the open lap
#[derive(Debug)]
pub struct LapTracker<T = NormalizedSample> {
    previous_lap: Option<u32>,
    buffer: Option<LapBuffer<T>>,
}

impl<T> Default for LapTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LapTracker<T> {
    pub fn new() -> Self {
        Self { previous_lap: None, buffer: None }
    }

    /// Feed one observation labelled with its lap number.
    pub fn observe(&mut self, lap: u32, item: T) -> Observation<T> {
        let Some(previous) = self.previous_lap else {
            self.start(lap, item);
            return Observation::Appended;
        };

        if lap == previous {
            self.buffer.get_or_insert_with(|| LapBuffer::new(lap)).push(item);
            Observation::Appended
        } else if lap > previous {
            let closed = self.start(lap, item).unwrap_or_else(|| LapBuffer::new(previous));
            trace!(lap = previous, samples = closed.len(), "lap boundary");
            Observation::Completed(closed)
        } else {
            let discarded = self.start(lap, item).map(|b| b.len()).unwrap_or(0);
            trace!(previous_lap = previous, lap, discarded, "lap counter reset");
            Observation::Restarted { previous_lap: previous, lap, discarded }
        }
    }

    /// Lap number of the open buffer
    pub fn current_lap(&self) -> Option<u32> {
        self.previous_lap
    }

    /// Samples buffered for the open lap
    pub fn buffered(&self) -> usize {
        self.buffer.as_ref().map(LapBuffer::len).unwrap_or(0)
    }

    /// Close the open lap early and hand it out, keeping the lap number so
    /// the next observation is still compared against it.
    pub fn take_open_lap(&mut self) -> Option<LapBuffer<T>> {
        self.buffer.take().filter(|b| !b.is_empty())
    }

    /// Drop the open lap. Returns how many samples were discarded.
    pub fn discard_open_lap(&mut self) -> usize {
        self.buffer.take().map(|b| b.len()).unwrap_or(0)
    }

    /// Forget everything, as if the vehicle had never been seen.
    pub fn reset(&mut self) -> usize {
        self.previous_lap = None;
        self.discard_open_lap()
    }

    fn start(&mut self, lap: u32, item: T) -> Option<LapBuffer<T>> {
        let mut fresh = LapBuffer::new(lap);
        fresh.push(item);
        self.previous_lap = Some(lap);
        self.buffer.replace(fresh)
    }
}
