//! Timing wrapper for operations.
//!
//! Callers wrap whichever operation they want timed; nothing in the session
//! measures itself.

use std::time::{Duration, Instant};

use log::debug;

/// A value together with how long it took to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Timed<T> {
    /// The operation's result.
    pub value: T,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Transform the value, keeping the elapsed time.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Timed<U> {
        Timed {
            value: f(self.value),
            elapsed: self.elapsed,
        }
    }

    /// Discard the timing.
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Run `f`, log how long it took under `label`, and return the timed result.
pub fn measure<T>(label: &str, f: impl FnOnce() -> T) -> Timed<T> {
    let start = Instant::now();
    let value = f();
    let elapsed = start.elapsed();
    debug!("{} took {:.3} ms", label, elapsed.as_secs_f64() * 1000.0);
    Timed { value, elapsed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_returns_value() {
        let timed = measure("sleep", || {
            std::thread::sleep(Duration::from_millis(5));
            42
        });
        assert_eq!(timed.value, 42);
        assert!(timed.elapsed >= Duration::from_millis(5));
        assert!(timed.elapsed_ms() >= 5.0);
    }

    #[test]
    fn test_map_keeps_elapsed() {
        let timed = measure("noop", || 2).map(|v| v * 10);
        assert_eq!(timed.into_inner(), 20);
    }
}
