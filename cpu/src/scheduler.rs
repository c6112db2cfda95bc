//! Slice scheduling: pacing a processor's simulated clock against
//! wall time.
//!
//! A processor runs in bounded slices of cycles.  After each slice
//! the timer compares the wall time the slice actually took with the
//! time the simulated machine would have taken and derives the delay
//! before the next slice that re-converges the two.  An
//! exponentially-weighted estimate of past overshoot absorbs sleep
//! jitter: a host that consistently wakes late gets correspondingly
//! shorter requested delays.

use std::time::Duration;

use tracing::{event, Level};

/// Weight of the newest overshoot sample in the drift estimate.
const DRIFT_GAIN: f64 = 0.125;

#[derive(Debug)]
pub struct SliceTimer {
    clock_hz: u64,
    slice_cycles: u64,
    /// Estimated wall-time overshoot per slice, in seconds; positive
    /// when slices have been running longer than simulated time.
    drift: f64,
}

impl SliceTimer {
    pub fn new(clock_hz: u64, slice_cycles: u64) -> SliceTimer {
        assert!(clock_hz > 0);
        SliceTimer {
            clock_hz,
            slice_cycles: slice_cycles.max(1),
            drift: 0.0,
        }
    }

    /// Cycle quota for one slice.
    pub fn slice_cycles(&self) -> u64 {
        self.slice_cycles
    }

    /// Simulated duration of `cycles` processor cycles.
    pub fn simulated(&self, cycles: u64) -> Duration {
        Duration::from_secs_f64(cycles as f64 / self.clock_hz as f64)
    }

    /// Folds one finished slice into the drift estimate and returns
    /// the delay to request before the next slice.  `cycles` is the
    /// count the slice actually consumed (it may exceed the quota
    /// when the final syllable overran) and `elapsed` the wall time
    /// the slice took.
    pub fn next_delay(&mut self, cycles: u64, elapsed: Duration) -> Duration {
        let simulated = cycles as f64 / self.clock_hz as f64;
        let overshoot = elapsed.as_secs_f64() - simulated;
        self.drift = self.drift * (1.0 - DRIFT_GAIN) + overshoot * DRIFT_GAIN;
        let wait = simulated - elapsed.as_secs_f64() - self.drift;
        if wait > 0.0 {
            Duration::from_secs_f64(wait)
        } else {
            event!(
                Level::TRACE,
                "slice ran {:.1}us behind simulated time, not delaying",
                -wait * 1e6
            );
            Duration::ZERO
        }
    }
}
