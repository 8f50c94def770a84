use std::time::Duration;

use membw_types::ELEMENT_BYTES;
use quanta::Clock;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Measurement {
    pub elapsed: Duration,
    pub bandwidth_mb_per_s: f64,
}

/// Bandwidth in MB/s (10^6 bytes) for `len` elements moved in `elapsed_secs`.
///
/// `elapsed_secs` must be positive; zero yields `inf`.
pub fn bandwidth_mb_per_s(len: usize, elapsed_secs: f64) -> f64 {
    (len * ELEMENT_BYTES) as f64 / 1e6 / elapsed_secs
}

pub struct Timer {
    clock: Clock,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
        }
    }

    /// Runs `kernel` between two clock reads and rates it as a pass over `len` elements.
    pub fn measure<R>(&self, len: usize, kernel: impl FnOnce() -> R) -> (R, Measurement) {
        let start = self.clock.now();
        let out = kernel();
        let end = self.clock.now();

        let elapsed = end.duration_since(start);
        let measurement = Measurement {
            elapsed,
            bandwidth_mb_per_s: bandwidth_mb_per_s(len, elapsed.as_secs_f64()),
        };
        (out, measurement)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandwidth_formula() {
        assert_eq!(bandwidth_mb_per_s(1_000_000, 1.0), 8.0);
        assert_eq!(bandwidth_mb_per_s(1_000_000_000, 2.0), 4000.0);
        assert_eq!(bandwidth_mb_per_s(0, 1.0), 0.0);
    }

    #[test]
    fn test_bandwidth_decreases_with_elapsed() {
        let len = 1_000_000_000;
        let times = [1e-6, 1e-3, 0.5, 1.0, 1.5, 10.0, 1e4];
        for pair in times.windows(2) {
            assert!(bandwidth_mb_per_s(len, pair[0]) > bandwidth_mb_per_s(len, pair[1]));
        }
    }

    #[test]
    fn test_zero_elapsed_is_infinite() {
        assert!(bandwidth_mb_per_s(16, 0.0).is_infinite());
    }

    #[test]
    fn test_measure_wraps_kernel() {
        let timer = Timer::new();
        let (out, m) = timer.measure(1_000, || {
            std::thread::sleep(Duration::from_millis(5));
            42
        });
        assert_eq!(out, 42);
        assert!(m.elapsed >= Duration::from_millis(4));
        assert!(m.bandwidth_mb_per_s > 0.0);
        assert!(m.bandwidth_mb_per_s.is_finite());
    }
}
