//! Time source and delay utilities for the capture engine.
//!
//! The engine needs two things from the platform: a monotonic timestamp to
//! measure timeouts and a blocking delay to hit bit-cell deadlines. Both are
//! injected, so the same code runs against a hardware timer on the target and
//! against [`crate::sim`] on the host.
//!
//! Contains:
//! - [`Clock`]: monotonic nanosecond timestamp source
//! - [`Timebase`]: a `Clock` paired with an `embedded_hal::delay::DelayNs`
//! - [`capture_window`]: runs a closure with preemption masked (feature `critical-window`)
//!
//! Timing reference for the SmartPort bus:
//!
//! | Quantity       | Value  |
//! |----------------|--------|
//! | Bit cell       | 4 µs   |
//! | Sample offset  | 2 µs   |
//! | Byte           | 32 µs  |
//! | 128-byte frame | 4.1 ms |

use embedded_hal::delay::DelayNs;

mod window;
pub use window::capture_window;

/// 1,000 nanoseconds = 1 microsecond
pub const NANOS_PER_MICRO: u64 = 1_000;

/// Converts microseconds to nanoseconds.
pub const fn us_to_ns(us: u32) -> u64 {
    us as u64 * NANOS_PER_MICRO
}

/// Monotonic time source.
///
/// Any `FnMut() -> u64` returning nanoseconds implements this, so a hardware
/// timer can be wired in with a closure:
///
/// ```rust,ignore
/// let clock = || esp_timer_get_time() as u64 * 1_000;
/// ```
pub trait Clock {
    /// Current monotonic time in nanoseconds.
    fn now_ns(&mut self) -> u64;
}

impl<F> Clock for F
where
    F: FnMut() -> u64,
{
    fn now_ns(&mut self) -> u64 {
        self()
    }
}

/// A clock and a delay provider used together.
///
/// Deadlines are absolute timestamps from the clock; the delay only bridges
/// the gap to them, so overhead between waits does not accumulate.
#[derive(Debug)]
pub struct Timebase<C, D> {
    /// Monotonic time source.
    pub clock: C,
    /// Blocking delay provider.
    pub delay: D,
}

impl<C: Clock, D: DelayNs> Timebase<C, D> {
    /// Pairs a clock with a delay provider.
    pub fn new(clock: C, delay: D) -> Self {
        Self { clock, delay }
    }

    /// Current time in nanoseconds.
    pub fn now_ns(&mut self) -> u64 {
        self.clock.now_ns()
    }

    /// Nanoseconds elapsed since `start_ns`.
    pub fn elapsed_ns(&mut self, start_ns: u64) -> u64 {
        self.clock.now_ns().saturating_sub(start_ns)
    }

    /// Blocks until the clock reaches `deadline_ns`. Returns immediately if it already has.
    pub fn wait_until(&mut self, deadline_ns: u64) {
        let now = self.clock.now_ns();
        if deadline_ns > now {
            let gap = deadline_ns - now;
            self.delay.delay_ns(u32::try_from(gap).unwrap_or(u32::MAX));
        }
    }

    /// Blocks for `us` microseconds. Never call this inside a capture window.
    pub fn pause_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimClock, SimDelay, SimTime};

    #[test]
    fn test_us_to_ns() {
        assert_eq!(us_to_ns(4), 4_000);
        assert_eq!(us_to_ns(u32::MAX), u32::MAX as u64 * 1_000);
    }

    #[test]
    fn test_wait_until_is_absolute() {
        let time = SimTime::new();
        let mut tb = Timebase::new(SimClock::new(&time), SimDelay::new(&time));

        time.advance_ns(700);
        tb.wait_until(2_000);
        assert_eq!(time.now_ns(), 2_000);

        // Already past the deadline: no wait.
        tb.wait_until(1_500);
        assert_eq!(time.now_ns(), 2_000);
        assert_eq!(tb.elapsed_ns(500), 1_500);
    }

    #[test]
    fn test_closure_clock() {
        let mut ticks = 0u64;
        let mut clock = move || {
            ticks += 10;
            ticks
        };
        assert_eq!(clock.now_ns(), 10);
        assert_eq!(clock.now_ns(), 20);
    }
}
