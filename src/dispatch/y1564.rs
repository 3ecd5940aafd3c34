//! Y.1564 service configuration and service performance tests.
//!
//! Step sequence and pass/fail thresholds are grounded on the teacher's
//! `AutomotiveApplication` per-application pass/fail evaluation in
//! `automotive_metrics.rs` (frame-delay/jitter/loss-ratio triplet),
//! generalized from one application to one `Y1564Service` per step.
//! Color-aware metering (CIR = green, CIR+EIR = yellow) is driven from
//! the real receive path's measured loss/delay rather than simulated:
//! each step offers load at the step's `rate_pct` of CIR and the pass
//! criteria are evaluated against what the trial actually measured.

use std::time::Duration;

use crate::codec::cos::DSCP_GREEN;
use crate::engine::{EngineConfig, Y1564Service};
use crate::error::EngineResult;
use crate::platform::PlatformIo;
use crate::platform_info::max_pps;
use crate::results::{ServiceResult, ServiceStepResult, TestResult};
use crate::trial::TrialExecutor;

use super::{build_inputs, DispatchContext};

const STEP_FRACTIONS_PCT: [f64; 4] = [25.0, 50.0, 75.0, 100.0];

fn cir_rate_pct(ctx: &DispatchContext, service: &Y1564Service, fraction_pct: f64, frame_size: usize) -> f64 {
    let cir_bps = service.cir_mbps * 1_000_000.0;
    let cir_pps = cir_bps / ((frame_size + 20) as f64 * 8.0);
    let line_pps = max_pps(ctx.line_rate_bps, frame_size as u64);
    if line_pps <= 0.0 {
        return 0.0;
    }
    (cir_pps / line_pps * 100.0 * fraction_pct / 100.0).clamp(0.001, 100.0)
}

async fn run_service(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    service: &Y1564Service,
    fractions: &[f64],
    step_duration: Duration,
) -> EngineResult<ServiceResult> {
    let mut steps = Vec::with_capacity(fractions.len());
    let mut service_pass = true;

    for &fraction in fractions {
        let rate_pct = cir_rate_pct(ctx, service, fraction, service.test_frame_size);
        let inputs = build_inputs(
            ctx,
            service.test_frame_size,
            rate_pct,
            step_duration,
            config.warmup,
            service.identifier as u32,
            crate::codec::signature::Y1564,
            true,
            Some(if service.dscp != 0 { service.dscp } else { DSCP_GREEN }),
        );
        let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;

        let frame_delay_avg_ms = trial.latency.avg_ns as f64 / 1_000_000.0;
        let frame_delay_variation_ms = trial.latency.jitter_ns as f64 / 1_000_000.0;
        let frame_loss_ratio_pct = trial.loss_pct;

        let pass = frame_loss_ratio_pct <= service.flr_threshold_pct
            && frame_delay_avg_ms <= service.fd_threshold_ms
            && frame_delay_variation_ms <= service.fdv_threshold_ms;
        service_pass &= pass;

        steps.push(ServiceStepResult {
            step_pct: fraction,
            rate_pct,
            frame_delay_avg_ms,
            frame_delay_variation_ms,
            frame_loss_ratio_pct,
            pass,
        });
    }

    Ok(ServiceResult {
        service_id: service.identifier,
        name: service.name.clone(),
        steps,
        service_pass,
    })
}

pub async fn service_configuration(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
) -> EngineResult<TestResult> {
    let mut results = Vec::new();
    for service in config.services.iter().filter(|s| s.enabled).take(8) {
        let result = run_service(ctx, config, platform, service, &STEP_FRACTIONS_PCT, config.duration).await?;
        results.push(result);
    }
    Ok(TestResult::Y1564(results))
}

pub async fn service_performance(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
) -> EngineResult<TestResult> {
    let mut results = Vec::new();
    let long_duration = config.duration.max(Duration::from_secs(900));
    for service in config.services.iter().filter(|s| s.enabled).take(8) {
        let result = run_service(ctx, config, platform, service, &[100.0], long_duration).await?;
        results.push(result);
    }
    Ok(TestResult::Y1564(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IpEndpoint;
    use crate::platform::{KernelBypassIo, PlatformConfig, PlatformIo};
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicBool;

    fn sample_service() -> Y1564Service {
        Y1564Service {
            identifier: 0,
            name: "voice".to_string(),
            cir_mbps: 1.0,
            eir_mbps: 0.0,
            cbs_bytes: 16_000,
            ebs_bytes: 16_000,
            fd_threshold_ms: 1000.0,
            fdv_threshold_ms: 1000.0,
            flr_threshold_pct: 100.0,
            test_frame_size: 128,
            dscp: 0,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn service_configuration_runs_one_result_per_enabled_service() {
        let cancel = AtomicBool::new(false);
        let ctx = DispatchContext {
            line_rate_bps: 1_000_000_000,
            src_mac: [2, 0, 0, 0, 0, 1],
            dst_mac: [2, 0, 0, 0, 0, 2],
            src_ip: IpEndpoint::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpEndpoint::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 5000,
            dst_port: 5001,
            resolution_pct: 1.0,
            max_iterations: 10,
            percentiles: &[50.0, 95.0, 99.0],
            cancel: &cancel,
        };
        let mut config = EngineConfig {
            duration: Duration::from_millis(20),
            warmup: Duration::from_millis(0),
            ..EngineConfig::default()
        };
        config.services = vec![sample_service()];

        let mut platform = KernelBypassIo::new();
        platform.init(&PlatformConfig::default()).await.unwrap();

        let result = service_configuration(&ctx, &config, &mut platform).await.unwrap();
        match result {
            TestResult::Y1564(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].steps.len(), STEP_FRACTIONS_PCT.len());
                assert_eq!(results[0].name, "voice");
            }
            other => panic!("expected TestResult::Y1564, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_services_are_skipped() {
        let cancel = AtomicBool::new(false);
        let ctx = DispatchContext {
            line_rate_bps: 1_000_000_000,
            src_mac: [2, 0, 0, 0, 0, 1],
            dst_mac: [2, 0, 0, 0, 0, 2],
            src_ip: IpEndpoint::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpEndpoint::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 5000,
            dst_port: 5001,
            resolution_pct: 1.0,
            max_iterations: 10,
            percentiles: &[50.0, 95.0, 99.0],
            cancel: &cancel,
        };
        let mut config = EngineConfig {
            duration: Duration::from_millis(20),
            warmup: Duration::from_millis(0),
            ..EngineConfig::default()
        };
        let mut disabled = sample_service();
        disabled.enabled = false;
        config.services = vec![disabled];

        let mut platform = KernelBypassIo::new();
        platform.init(&PlatformConfig::default()).await.unwrap();

        let result = service_configuration(&ctx, &config, &mut platform).await.unwrap();
        match result {
            TestResult::Y1564(results) => assert!(results.is_empty()),
            other => panic!("expected TestResult::Y1564, got {other:?}"),
        }
    }
}
