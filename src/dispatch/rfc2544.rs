//! RFC 2544 throughput, latency, frame loss, back-to-back, system
//! recovery and reset tests.
//!
//! `throughput`/`back_to_back` drive the binary-search update rule from
//! `ConvergenceDriver` by hand rather than through a higher-order async
//! predicate: a predicate closure would need to reborrow `platform:
//! &mut dyn PlatformIo` across calls, which is exactly the shape the
//! driver's `step`/`should_continue`/`midpoint` helpers were split out
//! to avoid fighting.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::convergence::ConvergenceDriver;
use crate::engine::EngineConfig;
use crate::error::EngineResult;
use crate::latency::LatencyStats;
use crate::platform::PlatformIo;
use crate::results::{
    BackToBackResult, FrameLossStepResult, LatencyLoadPointResult, ResetResult, SystemRecoveryResult, TestResult,
    ThroughputResult,
};
use crate::trial::TrialExecutor;

use super::{build_inputs, DispatchContext};

pub async fn throughput(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let driver = ConvergenceDriver::new(ctx.resolution_pct, ctx.max_iterations);
    let mut points = Vec::with_capacity(config.frame_sizes.len());

    for &frame_size in &config.frame_sizes {
        let (mut low, mut high) = (0.0, 100.0);
        let mut best = 0.0;
        let mut best_result = None;
        let mut iterations = 0;
        let mut frames_tested = 0u64;

        while driver.should_continue(low, high, iterations) {
            if ctx.cancel.load(Ordering::Relaxed) {
                return Err(crate::error::EngineError::Cancelled);
            }
            let mid = ConvergenceDriver::midpoint(low, high);
            iterations += 1;
            let inputs = build_inputs(ctx, frame_size, mid, config.duration, config.warmup, stream_id, signature, false, None);
            let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;
            frames_tested += trial.packets_sent;
            let passed = trial.loss_pct <= config.acceptable_loss_pct;
            let (new_low, new_high) = driver.step(low, high, passed, mid);
            low = new_low;
            high = new_high;
            if passed {
                best = mid;
                best_result = Some(trial);
            }
        }

        let latency = best_result.as_ref().map(|t| t.latency.clone()).unwrap_or_else(LatencyStats::empty);
        let (best_mbps, best_pps) = best_result
            .as_ref()
            .map(|t| (t.achieved_mbps, t.achieved_pps))
            .unwrap_or((0.0, 0.0));

        points.push(ThroughputResult {
            frame_size,
            best_rate_pct: best,
            best_mbps,
            best_pps,
            iterations,
            frames_tested,
            latency: (&latency).into(),
        });
    }

    Ok(TestResult::Throughput(points))
}

pub async fn latency(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let mut points = Vec::new();
    for &frame_size in &config.frame_sizes {
        for &rate_pct in &config.latency_load_levels_pct {
            let inputs = build_inputs(ctx, frame_size, rate_pct, config.duration, config.warmup, stream_id, signature, true, None);
            let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;
            points.push(LatencyLoadPointResult {
                frame_size,
                offered_rate_pct: rate_pct,
                latency: (&trial.latency).into(),
            });
        }
    }
    Ok(TestResult::Latency(points))
}

pub async fn frame_loss(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let mut steps = Vec::new();
    let descending = config.loss_start_pct >= config.loss_end_pct;
    let step = config.loss_step_pct.abs().max(0.01);
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);

    let mut rate = config.loss_start_pct;
    loop {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(crate::error::EngineError::Cancelled);
        }
        let inputs = build_inputs(ctx, frame_size, rate.clamp(0.0, 100.0), config.duration, config.warmup, stream_id, signature, false, None);
        let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;
        steps.push(FrameLossStepResult {
            offered_rate_pct: rate,
            sent: trial.packets_sent,
            received: trial.packets_received,
            loss_pct: trial.loss_pct,
        });

        let reached_end = if descending { rate <= config.loss_end_pct } else { rate >= config.loss_end_pct };
        if reached_end {
            break;
        }
        rate = if descending { rate - step } else { rate + step };
    }

    Ok(TestResult::FrameLoss(steps))
}

pub async fn back_to_back(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let mut burst = config.initial_burst.max(1);
    let mut max_burst = 0u64;
    let mut trials_passed = 0u32;
    let mut trials_run = 0u32;

    for _ in 0..config.burst_trials {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(crate::error::EngineError::Cancelled);
        }
        trials_run += 1;

        let pps = crate::platform_info::max_pps(ctx.line_rate_bps, frame_size as u64);
        let burst_duration = if pps > 0.0 { burst as f64 / pps } else { 0.001 };
        let duration = Duration::from_secs_f64(burst_duration.max(0.001));

        let inputs = build_inputs(ctx, frame_size, 100.0, duration, Duration::from_millis(0), stream_id, signature, false, None);
        let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;

        if trial.loss_pct <= 0.0 {
            max_burst = max_burst.max(burst);
            trials_passed += 1;
            burst = burst.saturating_mul(2);
        } else {
            break;
        }
    }

    let burst_duration_us = if max_burst > 0 {
        let pps = crate::platform_info::max_pps(ctx.line_rate_bps, frame_size as u64);
        if pps > 0.0 {
            max_burst as f64 / pps * 1_000_000.0
        } else {
            0.0
        }
    } else {
        0.0
    };

    Ok(TestResult::BackToBack(BackToBackResult {
        max_burst,
        burst_duration_us,
        trials_passed,
        trials_run,
    }))
}

pub async fn system_recovery(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);

    let overload_inputs = build_inputs(ctx, frame_size, 110.0, config.duration, config.warmup, stream_id, signature, false, None);
    TrialExecutor::run(&overload_inputs, platform, ctx.cancel).await?;

    let recovery_start = std::time::Instant::now();
    for _ in 0..config.max_iterations.max(1) {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(crate::error::EngineError::Cancelled);
        }
        let probe_inputs = build_inputs(
            ctx,
            frame_size,
            50.0,
            Duration::from_millis(200),
            Duration::from_millis(0),
            stream_id,
            signature,
            false,
            None,
        );
        let trial = TrialExecutor::run(&probe_inputs, platform, ctx.cancel).await?;
        if trial.loss_pct <= 0.001 {
            break;
        }
    }

    let recovery_time_secs = recovery_start.elapsed().as_secs_f64();

    Ok(TestResult::SystemRecovery(SystemRecoveryResult { recovery_time_secs }))
}

pub async fn reset(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let start = std::time::Instant::now();
    let mut loss_onset_secs = None;
    let mut recovery_secs = None;
    let mut seen_loss = false;

    for _ in 0..config.max_iterations.max(1) {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(crate::error::EngineError::Cancelled);
        }
        let inputs = build_inputs(
            ctx,
            frame_size,
            100.0,
            Duration::from_millis(200),
            Duration::from_millis(0),
            stream_id,
            signature,
            false,
            None,
        );
        let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;

        if trial.loss_pct > 0.0 && !seen_loss {
            seen_loss = true;
            loss_onset_secs = Some(start.elapsed().as_secs_f64());
        } else if trial.loss_pct <= 0.0 && seen_loss && recovery_secs.is_none() {
            recovery_secs = Some(start.elapsed().as_secs_f64());
            break;
        }
    }

    Ok(TestResult::Reset(ResetResult { loss_onset_secs, recovery_secs }))
}
