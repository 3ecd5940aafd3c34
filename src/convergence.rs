//! Binary-search convergence driver (component I).
//!
//! Shared by RFC 2544 throughput/back-to-back, RFC 2889 cache-capacity/
//! learning-rate, and Y.1564 step tests: repeatedly call a pass
//! predicate `P(rate)` to find the largest rate in `[low, high]` for
//! which `P` holds, assuming `P` is monotone (true below some threshold,
//! false above it).

pub const DEFAULT_RESOLUTION_PCT: f64 = 0.1;
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceResult {
    pub best: f64,
    pub iterations: u32,
}

pub struct ConvergenceDriver {
    pub resolution: f64,
    pub max_iterations: u32,
}

impl Default for ConvergenceDriver {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION_PCT,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl ConvergenceDriver {
    pub fn new(resolution: f64, max_iterations: u32) -> Self {
        Self {
            resolution: resolution.max(0.01),
            max_iterations,
        }
    }

    /// Binary search `[low, high]` for the largest rate satisfying
    /// `predicate`. `should_cancel` is polled once per iteration.
    pub fn search<P, C>(&self, mut low: f64, mut high: f64, mut predicate: P, mut should_cancel: C) -> ConvergenceResult
    where
        P: FnMut(f64) -> bool,
        C: FnMut() -> bool,
    {
        let mut best = 0.0;
        let mut found_pass = false;
        let mut iterations = 0;

        while high - low > self.resolution && iterations < self.max_iterations {
            if should_cancel() {
                break;
            }
            let mid = (low + high) / 2.0;
            iterations += 1;
            if predicate(mid) {
                best = mid;
                found_pass = true;
                low = mid;
            } else {
                high = mid;
            }
        }

        ConvergenceResult {
            best: if found_pass { best } else { 0.0 },
            iterations,
        }
    }

    /// One step of the update rule, exposed so callers whose predicate
    /// must run an async trial (the common case here — `P(rate)` drives
    /// the trial executor against a `PlatformIo` backend) can drive
    /// their own loop without fighting closure-capture lifetimes around
    /// `&mut dyn PlatformIo`. See `dispatch::mod` for the async callers.
    pub fn step(&self, low: f64, high: f64, mid_passed: bool, mid: f64) -> (f64, f64) {
        if mid_passed {
            (mid, high)
        } else {
            (low, mid)
        }
    }

    pub fn should_continue(&self, low: f64, high: f64, iterations: u32) -> bool {
        high - low > self.resolution && iterations < self.max_iterations
    }

    pub fn midpoint(low: f64, high: f64) -> f64 {
        (low + high) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_to_threshold_within_resolution() {
        let driver = ConvergenceDriver::new(0.1, 20);
        let threshold = 73.4;
        let result = driver.search(0.0, 100.0, |rate| rate <= threshold, || false);
        assert!(result.best <= threshold);
        assert!(result.best >= threshold - 0.1);
    }

    #[test]
    fn never_passing_predicate_yields_zero() {
        let driver = ConvergenceDriver::new(0.1, 20);
        let result = driver.search(0.0, 100.0, |_| false, || false);
        assert_eq!(result.best, 0.0);
    }

    #[test]
    fn terminates_within_expected_iteration_bound() {
        let driver = ConvergenceDriver::new(0.1, 20);
        let result = driver.search(0.0, 100.0, |rate| rate <= 50.0, || false);
        let bound = (100.0f64 / 0.1).log2().ceil() as u32;
        assert!(result.iterations <= bound);
    }

    #[test]
    fn cancellation_stops_the_search_early() {
        let driver = ConvergenceDriver::new(0.1, 20);
        let mut calls = 0;
        let result = driver.search(
            0.0,
            100.0,
            |rate| rate <= 50.0,
            || {
                calls += 1;
                calls > 2
            },
        );
        assert!(result.iterations <= 3);
    }
}
