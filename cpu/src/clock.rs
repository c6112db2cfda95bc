//! Simulated elapsed time.
//!
//! Everything inside the machine is scheduled against simulated time,
//! never against the wall clock: the interval timer increments every
//! 1/60th of a simulated second whether the emulator is throttled to
//! real-time or running flat out.  The run loop decides separately how
//! much wall-clock time a slice of simulated time is allowed to take.

use std::time::Duration;

/// A source of simulated time.  The driver credits the clock with the
/// time represented by the processor cycles it just executed; anything
/// with a deadline (the interval timer, a device completion) compares
/// that deadline against [`Clock::now`].
pub trait Clock {
    /// The simulated time elapsed since power-on.
    fn now(&self) -> Duration;

    /// Credits the clock with a further `interval` of simulated time.
    fn consume(&mut self, interval: &Duration);
}

/// The ordinary simulated clock: a plain accumulator.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use cpu::BasicClock;
/// use cpu::Clock;
/// let mut clk = BasicClock::new();
/// clk.consume(&Duration::from_micros(12));
/// assert_eq!(clk.now(), Duration::from_micros(12));
/// ```
#[derive(Debug, Default)]
pub struct BasicClock {
    elapsed: Duration,
}

impl BasicClock {
    pub fn new() -> BasicClock {
        BasicClock {
            elapsed: Duration::ZERO,
        }
    }
}

impl Clock for BasicClock {
    fn now(&self) -> Duration {
        self.elapsed
    }

    fn consume(&mut self, interval: &Duration) {
        self.elapsed += *interval;
    }
}
