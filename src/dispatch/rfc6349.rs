//! RFC 6349 TCP throughput test: Mathis-formula estimate from measured
//! RTT, loss and MSS.
//!
//! Only the estimate is implemented here; a full RFC 6349 run drives an
//! actual TCP socket through window-scaling/slow-start and measures
//! achieved throughput directly. That path isn't implemented — the
//! `measured_alternative_note` field flags it rather than silently
//! reporting only the formula estimate as if it were a real transfer.

use crate::engine::EngineConfig;
use crate::error::EngineResult;
use crate::platform::PlatformIo;
use crate::results::{Rfc6349Result, TestResult};
use crate::trial::TrialExecutor;

use super::{build_inputs, DispatchContext};

const MSS_BYTES: f64 = 1460.0;

/// Mathis constant `C = sqrt(3/2) ≈ 1.22`.
const MATHIS_CONSTANT: f64 = 1.22;

/// Mathis formula: `throughput ≈ (MSS * 8 / RTT) * (C / sqrt(loss))`,
/// in bits/sec. Boundary cases (spec §8): zero loss, zero RTT or zero
/// MSS all return the supplied line rate rather than dividing by zero
/// or infinity.
fn mathis_throughput_bps(line_rate_bps: u64, rtt_secs: f64, loss_fraction: f64) -> f64 {
    if loss_fraction <= 0.0 || rtt_secs <= 0.0 {
        return line_rate_bps as f64;
    }
    let mss_bits = MSS_BYTES * 8.0;
    ((mss_bits / rtt_secs) * (MATHIS_CONSTANT / loss_fraction.sqrt())).min(line_rate_bps as f64)
}

pub async fn throughput(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let inputs = build_inputs(ctx, frame_size, 50.0, config.duration, config.warmup, stream_id, signature, true, None);
    let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;

    let rtt_secs = (trial.latency.avg_ns as f64 / 1_000_000_000.0) * 2.0;
    let loss_fraction = trial.loss_pct / 100.0;

    let theoretical_mbps = mathis_throughput_bps(ctx.line_rate_bps, rtt_secs, loss_fraction) / 1_000_000.0;

    Ok(TestResult::Rfc6349(Rfc6349Result {
        theoretical_mbps,
        measured_alternative_note:
            "estimated via the Mathis formula from UDP-probe RTT/loss; a live TCP-socket measurement is a documented follow-up, not implemented here".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_loss_returns_line_rate() {
        let bps = mathis_throughput_bps(10_000_000_000, 0.001, 0.0);
        assert_eq!(bps, 10_000_000_000.0);
    }

    #[test]
    fn zero_rtt_returns_line_rate() {
        let bps = mathis_throughput_bps(10_000_000_000, 0.0, 0.01);
        assert_eq!(bps, 10_000_000_000.0);
    }

    #[test]
    fn one_percent_loss_matches_reference_mathis_estimate() {
        // MSS 1460, RTT 10ms, 1% loss: (1460*8/0.01)*(1.22/sqrt(0.01)) ≈ 14.25 Mbps.
        let bps = mathis_throughput_bps(1_000_000_000_000, 0.01, 0.01);
        let mbps = bps / 1_000_000.0;
        assert!((mbps - 14.25).abs() < 0.5, "expected ~14.25 Mbps, got {mbps}");
    }
}
