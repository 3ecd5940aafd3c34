//! Trial timer (component G) and trial executor (component H).
//!
//! The executor's hot loop shape — warmup/measurement transition resets
//! counters and pacer, send-then-drain-receive per iteration, a
//! settling window after expiry — is grounded on the teacher's
//! `BenchmarkRunner::run_single_threaded_one_way`/`run_round_trip_test`
//! loop in `benchmark.rs`, re-purposed to drive raw frames through the
//! packet codec and sequence tracker instead of bincode messages.
//!
//! Pacing precision demands a synchronous hot loop (spec §5/§9); this
//! executor still awaits the (async) `PlatformIo` batch calls because
//! that's the trait shape the platform backends share with the
//! teacher's `IpcTransport`, but `PacingGovernor::wait` itself blocks
//! the calling OS thread rather than yielding, exactly as the source's
//! synchronous pacing loop does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::codec::{self, IpEndpoint, ParsedFrame, TemplateParams};
use crate::error::{EngineError, EngineResult};
use crate::latency::{LatencyReservoir, LatencyStats};
use crate::pacing::PacingGovernor;
use crate::platform::PlatformIo;
use crate::platform_info::max_pps;
use crate::sequence::SequenceTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    Warmup,
    Measurement,
    Expired,
}

pub struct TrialTimer {
    warmup: Duration,
    duration: Duration,
    start: Instant,
}

impl TrialTimer {
    pub fn new(warmup: Duration, duration: Duration) -> Self {
        Self {
            warmup,
            duration,
            start: Instant::now(),
        }
    }

    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    pub fn phase(&self) -> TrialPhase {
        let elapsed = self.start.elapsed();
        if elapsed < self.warmup {
            TrialPhase::Warmup
        } else if elapsed < self.warmup + self.duration {
            TrialPhase::Measurement
        } else {
            TrialPhase::Expired
        }
    }

    pub fn expired(&self) -> bool {
        self.phase() == TrialPhase::Expired
    }

    /// Measurement-only elapsed seconds; 0 while still in warmup.
    pub fn elapsed(&self) -> f64 {
        match self.phase() {
            TrialPhase::Warmup => 0.0,
            TrialPhase::Measurement => (self.start.elapsed() - self.warmup).as_secs_f64(),
            TrialPhase::Expired => self.duration.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrialResult {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub elapsed_secs: f64,
    pub achieved_pps: f64,
    pub achieved_mbps: f64,
    pub loss_pct: f64,
    pub latency: LatencyStats,
}

#[derive(Debug, Clone)]
pub struct TrialInputs {
    pub frame_size: usize,
    pub rate_pct: f64,
    pub duration: Duration,
    pub warmup: Duration,
    pub line_rate_bps: u64,
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub src_ip: IpEndpoint,
    pub dst_ip: IpEndpoint,
    pub src_port: u16,
    pub dst_port: u16,
    pub stream_id: u32,
    pub signature: &'static [u8; 7],
    pub measure_latency: bool,
    pub dscp: Option<u8>,
    /// Percentiles to compute alongside the standard p50/p95/p99 trio
    /// (spec's `--percentiles` CLI flag); deduplicated with the trio at
    /// collection time so a custom request never drops the defaults.
    pub percentiles: Vec<f64>,
}

const RECV_DRAIN_BATCH: usize = 64;
const SETTLING_ITERATIONS: u32 = 10;
const SETTLING_SLEEP_MS: u64 = 10;

fn wall_clock_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

pub struct TrialExecutor;

impl TrialExecutor {
    /// Runs a single-rate measurement trial (spec §4.H), combining the
    /// codec, sequence tracker, latency reservoir, pacer and timer over
    /// a platform backend, and returns the aggregated result.
    pub async fn run(
        inputs: &TrialInputs,
        platform: &mut dyn PlatformIo,
        cancel: &AtomicBool,
    ) -> EngineResult<TrialResult> {
        if inputs.duration.is_zero() {
            return Err(EngineError::InvalidArgument("trial duration must be positive".into()));
        }

        let mut template = Vec::new();
        let params = TemplateParams {
            frame_size: inputs.frame_size,
            src_mac: inputs.src_mac,
            dst_mac: inputs.dst_mac,
            src_ip: inputs.src_ip,
            dst_ip: inputs.dst_ip,
            src_port: inputs.src_port,
            dst_port: inputs.dst_port,
            stream_id: inputs.stream_id,
            signature: inputs.signature,
            dscp: inputs.dscp,
        };
        let sig_off = codec::build_template(&mut template, &params)?;

        let expected_pps = max_pps(inputs.line_rate_bps, inputs.frame_size as u64) * inputs.rate_pct / 100.0;
        let expected_count = (expected_pps * inputs.duration.as_secs_f64()).max(1.0) as u64;

        let mut pacer = PacingGovernor::new(inputs.line_rate_bps, inputs.frame_size as u64, inputs.rate_pct);
        let mut timer = TrialTimer::new(inputs.warmup, inputs.duration);
        let mut tracker = SequenceTracker::for_expected_count(0, expected_count);
        let mut reservoir = inputs
            .measure_latency
            .then(|| LatencyReservoir::new(crate::latency::DEFAULT_RESERVOIR_CAPACITY));

        let mut seq_num: u32 = 0;
        let mut packets_sent: u64 = 0;
        let mut packets_received: u64 = 0;
        let mut bytes_sent: u64 = 0;
        let mut in_measurement = matches!(timer.phase(), TrialPhase::Measurement);

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(EngineError::Cancelled);
            }

            let phase = timer.phase();
            if phase == TrialPhase::Expired {
                break;
            }
            if phase == TrialPhase::Measurement && !in_measurement {
                in_measurement = true;
                packets_sent = 0;
                packets_received = 0;
                bytes_sent = 0;
                tracker = SequenceTracker::for_expected_count(0, expected_count);
                if let Some(reservoir) = reservoir.as_mut() {
                    reservoir.clear();
                }
                pacer.reset_epoch();
            }

            // `pacer.wait()` governs send timing (its own return value is
            // trial-relative, per `PacingGovernor`'s monotonic `Instant`
            // origin); the timestamp stamped into the wire frame is taken
            // separately on the wall clock so it lands in the same domain
            // `drain_receive`'s RX timestamp does, and `codec::calc_latency`
            // isn't differencing a relative duration against an epoch time.
            pacer.wait();
            let tx_ts = wall_clock_ns();
            codec::stamp(&mut template, sig_off, seq_num, tx_ts);
            seq_num = seq_num.wrapping_add(1);

            let sent = platform.send_batch(std::slice::from_ref(&template)).await?;
            if sent > 0 {
                pacer.record(template.len() as u64);
                if in_measurement {
                    packets_sent += sent as u64;
                    bytes_sent += template.len() as u64 * sent as u64;
                }
            }

            Self::drain_receive(
                platform,
                inputs,
                sig_off,
                in_measurement,
                &mut packets_received,
                &mut tracker,
                reservoir.as_mut(),
            )
            .await?;
        }

        // Settling window to collect stragglers after expiry.
        for _ in 0..SETTLING_ITERATIONS {
            Self::drain_receive(
                platform,
                inputs,
                sig_off,
                true,
                &mut packets_received,
                &mut tracker,
                reservoir.as_mut(),
            )
            .await?;
            tokio::time::sleep(Duration::from_millis(SETTLING_SLEEP_MS)).await;
        }

        let elapsed = inputs.duration.as_secs_f64();
        let loss_pct = if packets_sent == 0 {
            0.0
        } else {
            100.0 * (packets_sent.saturating_sub(packets_received)) as f64 / packets_sent as f64
        };
        let achieved_pps = if elapsed > 0.0 { packets_sent as f64 / elapsed } else { 0.0 };
        let achieved_mbps = if elapsed > 0.0 {
            (bytes_sent as f64 * 8.0) / elapsed / 1_000_000.0
        } else {
            0.0
        };
        let mut percentile_set = vec![50.0, 95.0, 99.0];
        for p in &inputs.percentiles {
            if !percentile_set.iter().any(|existing: &f64| (existing - p).abs() < f64::EPSILON) {
                percentile_set.push(*p);
            }
        }
        let latency = reservoir.as_ref().map(|r| r.stats(&percentile_set)).unwrap_or_else(LatencyStats::empty);

        Ok(TrialResult {
            packets_sent,
            packets_received,
            bytes_sent,
            elapsed_secs: elapsed,
            achieved_pps,
            achieved_mbps,
            loss_pct,
            latency,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn drain_receive(
        platform: &mut dyn PlatformIo,
        inputs: &TrialInputs,
        sig_off: usize,
        count: bool,
        packets_received: &mut u64,
        tracker: &mut SequenceTracker,
        mut reservoir: Option<&mut LatencyReservoir>,
    ) -> EngineResult<()> {
        let frames = platform.recv_batch(RECV_DRAIN_BATCH).await?;
        if frames.is_empty() {
            return Ok(());
        }
        let rx_ts_fallback = wall_clock_ns();
        for frame in &frames {
            let ParsedFrame {
                seq_num,
                tx_timestamp_ns,
                stream_id,
            } = codec::parse(&frame.data, sig_off);
            if !codec::is_valid_response(&frame.data, sig_off) || stream_id != inputs.stream_id {
                continue;
            }
            if count {
                *packets_received += 1;
                tracker.record(seq_num);
                if let Some(reservoir) = reservoir.as_mut() {
                    let rx_ts = if frame.timestamp_ns > 0 { frame.timestamp_ns } else { rx_ts_fallback };
                    reservoir.push(codec::calc_latency(tx_timestamp_ns, rx_ts));
                }
            }
        }
        platform.release_batch(frames).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{KernelBypassIo, PlatformConfig, PlatformIo};
    use std::net::Ipv4Addr;

    fn sample_inputs() -> TrialInputs {
        TrialInputs {
            frame_size: 128,
            rate_pct: 100.0,
            duration: Duration::from_millis(50),
            warmup: Duration::from_millis(0),
            line_rate_bps: 1_000_000_000,
            src_mac: [2, 0, 0, 0, 0, 1],
            dst_mac: [2, 0, 0, 0, 0, 2],
            src_ip: IpEndpoint::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpEndpoint::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 5000,
            dst_port: 5001,
            stream_id: 1,
            signature: codec::signature::RFC2544,
            measure_latency: true,
            dscp: None,
            percentiles: vec![50.0, 95.0, 99.0],
        }
    }

    #[tokio::test]
    async fn trial_over_loopback_kernel_bypass_sees_no_loss() {
        let mut platform = KernelBypassIo::new();
        platform.init(&PlatformConfig::default()).await.unwrap();
        let cancel = AtomicBool::new(false);
        let result = TrialExecutor::run(&sample_inputs(), &mut platform, &cancel).await.unwrap();
        assert!(result.packets_sent > 0);
        assert!(result.packets_received <= result.packets_sent);
        assert!(result.loss_pct >= 0.0 && result.loss_pct <= 100.0);
        // TX and RX timestamps must come from the same clock domain: a
        // loopback round trip within a 50ms trial should read back as at
        // most a few seconds, never the ~1.75e18ns an epoch-minus-relative
        // bug would produce.
        assert!(result.latency.count > 0);
        assert!(result.latency.avg_ns < Duration::from_secs(5).as_nanos() as u64);
        assert!(result.latency.max_ns < Duration::from_secs(5).as_nanos() as u64);
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let mut platform = KernelBypassIo::new();
        platform.init(&PlatformConfig::default()).await.unwrap();
        let mut inputs = sample_inputs();
        inputs.duration = Duration::from_secs(0);
        let cancel = AtomicBool::new(false);
        assert!(TrialExecutor::run(&inputs, &mut platform, &cancel).await.is_err());
    }

    #[tokio::test]
    async fn cancellation_flag_aborts_the_trial() {
        let mut platform = KernelBypassIo::new();
        platform.init(&PlatformConfig::default()).await.unwrap();
        let mut inputs = sample_inputs();
        inputs.duration = Duration::from_secs(60);
        let cancel = AtomicBool::new(true);
        let result = TrialExecutor::run(&inputs, &mut platform, &cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
