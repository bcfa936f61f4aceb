use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of frame timestamps. Read once per frame.
pub trait FrameClock: Send {
    /// Time elapsed since the clock's origin.
    fn now(&mut self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl FrameClock for MonotonicClock {
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += delta;
    }

    pub fn set(&self, value: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameClock for ManualClock {
    fn now(&mut self) -> Duration {
        self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let mut reader = clock.clone();

        clock.advance(Duration::from_millis(20));
        clock.advance(Duration::from_millis(5));

        assert_eq!(reader.now(), Duration::from_millis(25));
        clock.set(Duration::from_secs(1));
        assert_eq!(reader.now(), Duration::from_secs(1));
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let mut clock = MonotonicClock::default();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
