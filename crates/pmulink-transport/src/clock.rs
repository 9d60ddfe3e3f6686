use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic millisecond clock. Wraps at `u32::MAX`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Clock backed by `std::time::Instant`, starting at zero on creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation gives the same wrap-around as a 32-bit tick counter.
        self.origin.elapsed().as_millis() as u32
    }
}

/// Manually advanced clock. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    /// Move time forward by `ms`, wrapping like a hardware tick counter.
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        clock.advance(15);
        assert_eq!(other.now_ms(), 25);
    }

    #[test]
    fn manual_clock_wraps() {
        let clock = ManualClock::new(u32::MAX - 1);
        clock.advance(3);
        assert_eq!(clock.now_ms(), 1);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
