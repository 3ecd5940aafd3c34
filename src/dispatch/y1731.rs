//! Y.1731 delay measurement (DMM/DMR), loss measurement (LMM/LMR),
//! synthetic loss measurement (SLM/SLR) and loopback (LBM/LBR).
//!
//! These are all low-rate probe exchanges rather than throughput
//! trials, so each maps to one short `TrialExecutor::run` call with
//! `measure_latency` set and a rate derived from the requested probe
//! interval, grounded on the same trial shape as the RFC 2544 latency
//! dispatcher.

use crate::engine::EngineConfig;
use crate::error::EngineResult;
use crate::platform::PlatformIo;
use crate::platform_info::max_pps;
use crate::results::{TestResult, Y1731ProbeResult};
use crate::trial::TrialExecutor;

use super::{build_inputs, DispatchContext};

fn probe_rate_pct(ctx: &DispatchContext, frame_size: usize, probes_per_sec: f64) -> f64 {
    let line_pps = max_pps(ctx.line_rate_bps, frame_size as u64);
    if line_pps <= 0.0 {
        return 0.001;
    }
    (probes_per_sec / line_pps * 100.0).clamp(0.001, 100.0)
}

async fn run_probe(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
    rate_pct: f64,
) -> EngineResult<Y1731ProbeResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let inputs = build_inputs(ctx, frame_size, rate_pct, config.duration, config.warmup, stream_id, signature, true, None);
    let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;

    let delay_variation_ns = trial.latency.max_ns.saturating_sub(trial.latency.min_ns);
    let near_end_loss = trial.packets_sent.saturating_sub(trial.packets_received);

    Ok(Y1731ProbeResult {
        probes_sent: trial.packets_sent,
        probes_received: trial.packets_received,
        latency: (&trial.latency).into(),
        delay_variation_ns,
        near_end_loss,
        // Loopback model: reflector path is symmetric, so far-end loss
        // is indistinguishable from near-end loss without a second
        // measurement point.
        far_end_loss: near_end_loss,
    })
}

pub async fn delay_measurement(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let rate_pct = probe_rate_pct(ctx, frame_size, 10.0);
    let result = run_probe(ctx, config, platform, stream_id, signature, rate_pct).await?;
    Ok(TestResult::Y1731(result))
}

pub async fn loss_measurement(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let rate_pct = probe_rate_pct(ctx, frame_size, 50.0);
    let result = run_probe(ctx, config, platform, stream_id, signature, rate_pct).await?;
    Ok(TestResult::Y1731(result))
}

pub async fn synthetic_loss(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let rate_pct = probe_rate_pct(ctx, frame_size, 10.0);
    let result = run_probe(ctx, config, platform, stream_id, signature, rate_pct).await?;
    Ok(TestResult::Y1731(result))
}

pub async fn loopback(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let rate_pct = probe_rate_pct(ctx, frame_size, 1.0);
    let result = run_probe(ctx, config, platform, stream_id, signature, rate_pct).await?;
    Ok(TestResult::Y1731(result))
}
