//! Latency reservoir & statistics (component E).
//!
//! Spec §4.E calls explicitly for the sorted exact percentile
//! computation, not the HDR-histogram approximation the teacher uses
//! elsewhere in the codebase (kept separately in `metrics.rs` for
//! ambient, human-facing formatting only).

pub const DEFAULT_RESERVOIR_CAPACITY: usize = 100_000;

/// Bounded buffer of nanosecond RTT samples. First-N sampling: once
/// `capacity` samples have been collected, further samples are dropped.
#[derive(Debug, Clone)]
pub struct LatencyReservoir {
    capacity: usize,
    samples: Vec<u64>,
}

impl LatencyReservoir {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Vec::with_capacity(capacity.min(4096)),
        }
    }

    /// Append a sample if there's room; returns whether it was kept.
    pub fn push(&mut self, sample_ns: u64) -> bool {
        if self.samples.len() >= self.capacity {
            return false;
        }
        self.samples.push(sample_ns);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Compute stats at the given percentiles (e.g. `[50.0, 95.0, 99.0]`).
    pub fn stats(&self, percentiles: &[f64]) -> LatencyStats {
        LatencyStats::from_samples(&self.samples, percentiles)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ns: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub min_ns: u64,
    pub avg_ns: u64,
    pub max_ns: u64,
    pub jitter_ns: u64,
    pub percentiles: Vec<PercentileValue>,
}

impl LatencyStats {
    pub fn empty() -> Self {
        Self {
            count: 0,
            min_ns: 0,
            avg_ns: 0,
            max_ns: 0,
            jitter_ns: 0,
            percentiles: Vec::new(),
        }
    }

    /// Sort a copy of `samples` and compute exact min/avg/max/jitter and
    /// percentiles, per spec §4.E.
    pub fn from_samples(samples: &[u64], percentiles: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::empty();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        let sum: u128 = sorted.iter().map(|&v| v as u128).sum();
        let avg = (sum / n as u128) as u64;
        let min_ns = sorted[0];
        let max_ns = sorted[n - 1];
        let abs_dev_sum: u128 = sorted
            .iter()
            .map(|&v| (v as i128 - avg as i128).unsigned_abs())
            .sum();
        let jitter_ns = (abs_dev_sum / n as u128) as u64;

        let pct_values = percentiles
            .iter()
            .map(|&p| {
                let idx = ((p / 100.0) * n as f64).floor() as usize;
                let idx = idx.min(n - 1);
                PercentileValue {
                    percentile: p,
                    value_ns: sorted[idx],
                }
            })
            .collect();

        Self {
            count: n as u64,
            min_ns,
            avg_ns: avg,
            max_ns,
            jitter_ns,
            percentiles: pct_values,
        }
    }

    pub fn percentile(&self, p: f64) -> Option<u64> {
        self.percentiles
            .iter()
            .find(|pv| (pv.percentile - p).abs() < f64::EPSILON)
            .map(|pv| pv.value_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reservoir_yields_zeroed_stats() {
        let reservoir = LatencyReservoir::new(10);
        let stats = reservoir.stats(&[50.0, 95.0, 99.0]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.min_ns, 0);
        assert_eq!(stats.avg_ns, 0);
        assert_eq!(stats.max_ns, 0);
        assert_eq!(stats.jitter_ns, 0);
    }

    #[test]
    fn first_n_sampling_drops_excess() {
        let mut reservoir = LatencyReservoir::new(3);
        assert!(reservoir.push(1));
        assert!(reservoir.push(2));
        assert!(reservoir.push(3));
        assert!(!reservoir.push(4));
        assert_eq!(reservoir.len(), 3);
    }

    #[test]
    fn stats_invariants_hold() {
        let samples = vec![100, 50, 200, 150, 75, 300, 125];
        let stats = LatencyStats::from_samples(&samples, &[50.0, 95.0, 99.0]);
        assert!(stats.min_ns <= stats.avg_ns);
        assert!(stats.avg_ns <= stats.max_ns);
        assert!(stats.jitter_ns < u64::MAX);
        let p50 = stats.percentile(50.0).unwrap();
        let p95 = stats.percentile(95.0).unwrap();
        let p99 = stats.percentile(99.0).unwrap();
        assert!(p50 <= p95);
        assert!(p95 <= p99);
        assert!(p99 <= stats.max_ns);
    }

    #[test]
    fn percentile_uses_sorted_floor_index() {
        let samples: Vec<u64> = (1..=100).collect();
        let stats = LatencyStats::from_samples(&samples, &[50.0]);
        // floor(0.5 * 100) = 50 -> sorted[50] = 51 (0-indexed sample #51).
        assert_eq!(stats.percentile(50.0), Some(51));
    }

    #[test]
    fn single_sample_has_zero_jitter() {
        let stats = LatencyStats::from_samples(&[42], &[50.0]);
        assert_eq!(stats.jitter_ns, 0);
        assert_eq!(stats.min_ns, 42);
        assert_eq!(stats.max_ns, 42);
    }
}
