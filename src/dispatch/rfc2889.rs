//! RFC 2889 forwarding rate, broadcast forwarding and congestion tests.
//!
//! Address-caching and learning-rate characterization (RFC 2889 §5.3,
//! §5.5) stay open here: that requires verifying the DUT's forwarding
//! table against known source addresses, which these trials don't
//! model — the same open question as noted for the core test family.

use std::sync::atomic::Ordering;

use crate::convergence::ConvergenceDriver;
use crate::engine::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::platform::PlatformIo;
use crate::results::{Rfc2889Result, TestResult};
use crate::trial::TrialExecutor;

use super::{build_inputs, DispatchContext};

async fn converge_rate(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
    frame_size: usize,
) -> EngineResult<(f64, u32)> {
    let driver = ConvergenceDriver::new(ctx.resolution_pct, ctx.max_iterations);
    let (mut low, mut high) = (0.0, 100.0);
    let mut best = 0.0;
    let mut iterations = 0;

    while driver.should_continue(low, high, iterations) {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        let mid = ConvergenceDriver::midpoint(low, high);
        iterations += 1;
        let inputs = build_inputs(ctx, frame_size, mid, config.duration, config.warmup, stream_id, signature, false, None);
        let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;
        let passed = trial.loss_pct <= config.acceptable_loss_pct;
        let (new_low, new_high) = driver.step(low, high, passed, mid);
        low = new_low;
        high = new_high;
        if passed {
            best = mid;
        }
    }

    Ok((best, iterations))
}

pub async fn forwarding_rate(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let (best, _iterations) = converge_rate(ctx, config, platform, stream_id, signature, frame_size).await?;
    Ok(TestResult::Rfc2889(Rfc2889Result {
        forwarding_rate_pct: Some(best),
        replication_factor: None,
        dropped: None,
        backpressure_observed: None,
    }))
}

pub async fn broadcast_forwarding(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let (best, _iterations) = converge_rate(ctx, config, platform, stream_id, signature, frame_size).await?;

    let inputs = build_inputs(ctx, frame_size, best.max(1.0), config.duration, config.warmup, stream_id, signature, false, None);
    let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;
    let replication_factor = if trial.packets_sent > 0 {
        trial.packets_received as f64 / trial.packets_sent as f64
    } else {
        0.0
    };

    Ok(TestResult::Rfc2889(Rfc2889Result {
        forwarding_rate_pct: Some(best),
        replication_factor: Some(replication_factor),
        dropped: None,
        backpressure_observed: None,
    }))
}

pub async fn congestion(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let inputs = build_inputs(ctx, frame_size, 100.0, config.duration, config.warmup, stream_id, signature, false, None);
    let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;

    let dropped = trial.packets_sent.saturating_sub(trial.packets_received);
    let backpressure_observed = trial.loss_pct > 0.1 && trial.loss_pct < 10.0;

    Ok(TestResult::Rfc2889(Rfc2889Result {
        forwarding_rate_pct: None,
        replication_factor: None,
        dropped: Some(dropped),
        backpressure_observed: Some(backpressure_observed),
    }))
}
