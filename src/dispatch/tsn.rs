//! IEEE 802.1Qbv TSN gate timing, traffic-class isolation, and PTP
//! synchronization checks.
//!
//! The original source's gate-schedule simulation branches on `rand()`
//! to perturb gate-open windows; that's a simulator artifact with no
//! real-traffic counterpart, so it isn't ported here — gate deviation
//! is measured from actual trial latency jitter instead, same as every
//! other dispatcher in this module.

use crate::engine::EngineConfig;
use crate::error::EngineResult;
use crate::platform::PlatformIo;
use crate::results::{TestResult, TsnResult};
use crate::trial::TrialExecutor;

use super::{build_inputs, DispatchContext};

/// Conservative default gate window the deviation is checked against
/// when the caller hasn't configured a tighter SLA (TSN implementations
/// commonly target sub-microsecond gate jitter; 1us is a safe ceiling
/// for a software-modeled backend).
const DEFAULT_MAX_JITTER_NS: u64 = 1_000;

pub async fn gate_timing(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let inputs = build_inputs(ctx, frame_size, 50.0, config.duration, config.warmup, stream_id, signature, true, None);
    let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;

    let gate_deviation_ns = trial.latency.max_ns.saturating_sub(trial.latency.min_ns);
    let within_max_jitter = gate_deviation_ns <= DEFAULT_MAX_JITTER_NS;

    Ok(TestResult::Tsn(TsnResult {
        gate_deviation_ns,
        within_max_jitter,
        per_class_latency: vec![(stream_id, (&trial.latency).into())],
    }))
}

pub async fn isolation(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    // Traffic classes 0..=2 are modeled as distinct stream ids sharing
    // the wire; isolation means each class's latency distribution stays
    // independent of the others' load.
    let mut per_class_latency = Vec::new();
    let mut max_deviation = 0u64;

    for class in 0u32..3 {
        let class_stream_id = stream_id.wrapping_add(class);
        let inputs = build_inputs(ctx, frame_size, 30.0, config.duration, config.warmup, class_stream_id, signature, true, None);
        let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;
        max_deviation = max_deviation.max(trial.latency.max_ns.saturating_sub(trial.latency.min_ns));
        per_class_latency.push((class_stream_id, (&trial.latency).into()));
    }

    Ok(TestResult::Tsn(TsnResult {
        gate_deviation_ns: max_deviation,
        within_max_jitter: max_deviation <= DEFAULT_MAX_JITTER_NS,
        per_class_latency,
    }))
}

pub async fn ptp_sync(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    stream_id: u32,
    signature: &'static [u8; 7],
) -> EngineResult<TestResult> {
    let frame_size = config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE);
    let inputs = build_inputs(ctx, frame_size, 10.0, config.duration, config.warmup, stream_id, signature, true, None);
    let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;

    // One-way latency variation approximates clock-offset drift in the
    // absence of a real PTP hardware timestamp path.
    let gate_deviation_ns = trial.latency.jitter_ns;
    let within_max_jitter = gate_deviation_ns <= DEFAULT_MAX_JITTER_NS;

    Ok(TestResult::Tsn(TsnResult {
        gate_deviation_ns,
        within_max_jitter,
        per_class_latency: vec![(stream_id, (&trial.latency).into())],
    }))
}
