use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{event, Level};

/// MinimalSleeper provides a facility for periodically sleeping such
/// that on average we sleep for the requested amount of time, even
/// though we don't necessarily sleep on every call.  The idea is to
/// be efficient in the use of system calls: the run loop asks for a
/// (usually sub-millisecond) delay after every slice, and we only
/// perform a real sleep once enough debt has built up for the sleep
/// to be accurate.  Oversleeping is credited against later requests.
#[derive(Debug)]
pub struct MinimalSleeper {
    /// Minimum period for which we will try to sleep.
    min_sleep: Duration,

    /// Sleep owed, in nanoseconds; negative after an oversleep.
    owed: i128,

    total_cumulative_sleep: Duration,
}

impl MinimalSleeper {
    pub fn new(min_sleep: Duration) -> MinimalSleeper {
        MinimalSleeper {
            min_sleep,
            owed: 0,
            total_cumulative_sleep: Duration::ZERO,
        }
    }

    pub fn sleep(&mut self, duration: &Duration) {
        self.owed += duration.as_nanos() as i128;
        if self.owed > self.min_sleep.as_nanos() as i128 {
            self.really_sleep();
        }
    }

    fn really_sleep(&mut self) {
        let wanted = Duration::from_nanos(self.owed.max(0) as u64);
        let before = Instant::now();
        sleep(wanted);
        let slept = before.elapsed();
        self.total_cumulative_sleep += slept;
        self.owed -= slept.as_nanos() as i128;
        event!(
            Level::TRACE,
            "MinimalSleeper: wanted {:?} of sleep, got {:?}, debt is now {}ns",
            wanted,
            slept,
            self.owed
        );
    }
}

impl Drop for MinimalSleeper {
    fn drop(&mut self) {
        event!(
            Level::DEBUG,
            "MinimalSleeper: drop: total cumulative sleep is {:?}",
            self.total_cumulative_sleep
        );
    }
}
