//! Time abstractions
//!
//! The driver never sleeps on its own; every wait is a cooperative
//! poll-with-deadline built from these two traits. A platform supplies a
//! monotonic millisecond counter and a short delay primitive, and the
//! driver layers its 5-second handshake deadline on top.

/// Monotonic millisecond time source
///
/// The absolute value has no meaning; only differences are used. Must not
/// go backwards.
pub trait Clock {
    /// Milliseconds since some fixed, arbitrary point
    fn now_ms(&self) -> u64;
}

/// Cooperative delay
///
/// On an RTOS or async executor this is the natural yield point; on bare
/// metal a busy-wait is acceptable for the 1 ms granularity the driver
/// uses.
pub trait Delay {
    /// Pause for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

/// Host-side clock and delay backed by `std::time`
///
/// Counts from the moment it is created.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct StdClock {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(feature = "std")]
impl Delay for StdClock {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
