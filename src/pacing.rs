//! Pacing governor (component F).
//!
//! Ported from `original_source/src/dataplane/common/pacing.c`:
//! `pacing_create`, `pacing_wait`, `pacing_wait_batch`, `pacing_set_rate`,
//! `pacing_set_batch_size`, `pacing_set_busy_wait`, and the two-tier
//! sleep-then-spin wait strategy.

use std::thread;
use std::time::{Duration, Instant};

const NS_PER_SEC: u64 = 1_000_000_000;
const SLEEP_THRESHOLD_NS: u64 = 50_000;
const SLEEP_MARGIN_NS: u64 = 10_000;

/// 8-byte preamble + 12-byte interframe gap.
const WIRE_OVERHEAD_BYTES: u64 = 20;

pub struct PacingGovernor {
    line_rate_bps: u64,
    frame_size: u64,
    target_bps: f64,
    target_pps: f64,
    interval_ns: u64,
    batch_size: u64,
    batch_interval_ns: u64,
    next_tx_ns: u64,
    start: Instant,
    pub enabled: bool,
    pub use_busy_wait: bool,
    pub pacing_delays: u64,
    pub overruns: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
}

fn now_ns(start: Instant) -> u64 {
    start.elapsed().as_nanos() as u64
}

fn busy_wait_until(start: Instant, target_ns: u64) {
    while now_ns(start) < target_ns {
        std::hint::spin_loop();
    }
}

fn sleep_wait_until(start: Instant, target_ns: u64) {
    let now = now_ns(start);
    if target_ns > now {
        let delta = target_ns - now;
        if delta > SLEEP_THRESHOLD_NS {
            thread::sleep(Duration::from_nanos(delta - SLEEP_MARGIN_NS));
        }
    }
    busy_wait_until(start, target_ns);
}

impl PacingGovernor {
    pub fn new(line_rate_bps: u64, frame_size: u64, rate_pct: f64) -> Self {
        let mut governor = Self {
            line_rate_bps,
            frame_size,
            target_bps: 0.0,
            target_pps: 0.0,
            interval_ns: NS_PER_SEC,
            batch_size: 1,
            batch_interval_ns: 0,
            next_tx_ns: 0,
            start: Instant::now(),
            enabled: true,
            use_busy_wait: false,
            pacing_delays: 0,
            overruns: 0,
            packets_sent: 0,
            bytes_sent: 0,
        };
        governor.recompute(rate_pct);
        governor.batch_interval_ns = governor.interval_ns;
        governor.next_tx_ns = now_ns(governor.start);
        governor
    }

    fn recompute(&mut self, rate_pct: f64) {
        let wire_size = self.frame_size + WIRE_OVERHEAD_BYTES;
        self.target_bps = self.line_rate_bps as f64 * rate_pct / 100.0;
        self.target_pps = self.target_bps / (wire_size as f64 * 8.0);
        self.interval_ns = if self.target_pps > 0.0 {
            (NS_PER_SEC as f64 / self.target_pps) as u64
        } else {
            NS_PER_SEC
        };
    }

    /// Recomputes `target_pps`/`interval_ns` from the stored line rate
    /// without touching `next_tx_ns`.
    pub fn set_rate(&mut self, rate_pct: f64) {
        let rate_pct = rate_pct.clamp(f64::MIN_POSITIVE, 100.0);
        self.recompute(rate_pct);
        self.batch_interval_ns = self.interval_ns * self.batch_size;
    }

    pub fn set_batch_size(&mut self, batch_size: u64) {
        self.batch_size = batch_size.max(1);
        self.batch_interval_ns = self.interval_ns * self.batch_size;
    }

    pub fn set_busy_wait(&mut self, enable: bool) {
        self.use_busy_wait = enable;
    }

    pub fn target_pps(&self) -> f64 {
        self.target_pps
    }

    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }

    /// Resets the epoch so measurement statistics exclude warmup.
    pub fn reset_epoch(&mut self) {
        self.next_tx_ns = now_ns(self.start);
        self.packets_sent = 0;
        self.bytes_sent = 0;
        self.pacing_delays = 0;
        self.overruns = 0;
    }

    pub fn wait(&mut self) -> u64 {
        self.wait_interval(self.interval_ns)
    }

    pub fn wait_batch(&mut self) -> u64 {
        self.wait_interval(self.batch_interval_ns)
    }

    fn wait_interval(&mut self, interval: u64) -> u64 {
        if !self.enabled {
            return now_ns(self.start);
        }
        let now = now_ns(self.start);
        if now < self.next_tx_ns {
            self.pacing_delays += 1;
            if self.use_busy_wait {
                busy_wait_until(self.start, self.next_tx_ns);
            } else {
                sleep_wait_until(self.start, self.next_tx_ns);
            }
        } else if now > self.next_tx_ns + interval.saturating_mul(10) {
            self.overruns += 1;
            self.next_tx_ns = now;
        }
        self.next_tx_ns += interval;
        now_ns(self.start)
    }

    pub fn record(&mut self, bytes: u64) {
        self.packets_sent += 1;
        self.bytes_sent += bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_fields_match_formula() {
        let governor = PacingGovernor::new(10_000_000_000, 64, 100.0);
        let wire_size = 84.0;
        let expected_pps = 10_000_000_000.0 / (wire_size * 8.0);
        assert!((governor.target_pps - expected_pps).abs() / expected_pps < 1e-9);
    }

    #[test]
    fn zero_rate_floors_to_one_pps() {
        let mut governor = PacingGovernor::new(1_000_000, 1000, 100.0);
        governor.set_rate(f64::MIN_POSITIVE);
        assert!(governor.target_pps >= 0.0);
        assert!(governor.interval_ns <= NS_PER_SEC);
    }

    #[test]
    fn set_rate_does_not_reset_next_tx() {
        let mut governor = PacingGovernor::new(1_000_000_000, 512, 50.0);
        governor.next_tx_ns = 123_456;
        governor.set_rate(10.0);
        assert_eq!(governor.next_tx_ns, 123_456);
    }

    #[test]
    fn batch_interval_scales_with_batch_size() {
        let mut governor = PacingGovernor::new(1_000_000_000, 512, 50.0);
        let single = governor.interval_ns;
        governor.set_batch_size(4);
        assert_eq!(governor.batch_interval_ns, single * 4);
    }

    #[test]
    fn wait_always_advances_next_tx_by_interval() {
        let mut governor = PacingGovernor::new(1_000_000_000, 64, 100.0);
        governor.set_busy_wait(true);
        let interval = governor.interval_ns;
        let before = governor.next_tx_ns;
        governor.wait();
        assert_eq!(governor.next_tx_ns, before + interval);
    }
}
