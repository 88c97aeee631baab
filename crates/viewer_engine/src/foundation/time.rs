//! Time management utilities

use std::time::{Duration, Instant};

/// Source of the current instant
///
/// The renderer reads time through this trait so tests can drive animation deterministically.
pub trait TimeSource {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall-clock time source backed by [`Instant::now`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock measuring elapsed time since a captured start instant
pub struct AnimationClock {
    source: Box<dyn TimeSource>,
    start: Instant,
}

impl AnimationClock {
    /// Start a clock on the system time source
    pub fn start() -> Self {
        Self::with_source(Box::new(SystemTime))
    }

    /// Start a clock on an injected time source
    pub fn with_source(source: Box<dyn TimeSource>) -> Self {
        let start = source.now();
        Self { source, start }
    }

    /// Elapsed time since the clock started
    pub fn elapsed(&self) -> Duration {
        self.source.now().saturating_duration_since(self.start)
    }

    /// Elapsed time in seconds
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }
}

impl Default for AnimationClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Manually advanced time source
    #[derive(Clone)]
    struct ManualTime {
        base: Instant,
        offset: Rc<Cell<Duration>>,
    }

    impl ManualTime {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Rc::new(Cell::new(Duration::ZERO)),
            }
        }

        fn advance(&self, by: Duration) {
            self.offset.set(self.offset.get() + by);
        }
    }

    impl TimeSource for ManualTime {
        fn now(&self) -> Instant {
            self.base + self.offset.get()
        }
    }

    #[test]
    fn test_clock_starts_at_zero() {
        let time = ManualTime::new();
        let clock = AnimationClock::with_source(Box::new(time));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_clock_follows_source() {
        let time = ManualTime::new();
        let clock = AnimationClock::with_source(Box::new(time.clone()));

        time.advance(Duration::from_millis(1500));
        assert_relative_eq!(clock.elapsed_secs(), 1.5, epsilon = 1e-6);

        time.advance(Duration::from_millis(500));
        assert_relative_eq!(clock.elapsed_secs(), 2.0, epsilon = 1e-6);
    }
}
