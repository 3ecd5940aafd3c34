//! MEF 48/49 service configuration and performance tests.
//!
//! Shares the Y.1564 step structure (MEF CE 2.0 service attributes are
//! a superset of the Y.1564 SLA triplet) and the same millisecond SLA
//! thresholds on `Y1564Service`; throughput is reported in kb/s rather
//! than Y.1564's Mbps.

use std::time::Duration;

use crate::engine::{EngineConfig, Y1564Service};
use crate::error::EngineResult;
use crate::platform::PlatformIo;
use crate::results::{MefResult, ServiceResult, ServiceStepResult, TestResult};
use crate::trial::TrialExecutor;

use super::{build_inputs, DispatchContext};

const STEP_FRACTIONS_PCT: [f64; 4] = [25.0, 50.0, 75.0, 100.0];

async fn run_service(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
    service: &Y1564Service,
    fractions: &[f64],
    step_duration: Duration,
) -> EngineResult<MefResult> {
    let mut steps = Vec::with_capacity(fractions.len());
    let mut service_pass = true;
    let mut last_mbps = 0.0;

    for &fraction in fractions {
        let rate_pct = fraction.clamp(0.001, 100.0);
        let inputs = build_inputs(
            ctx,
            service.test_frame_size,
            rate_pct,
            step_duration,
            config.warmup,
            service.identifier as u32,
            crate::codec::signature::MEF48,
            true,
            Some(service.dscp),
        );
        let trial = TrialExecutor::run(&inputs, platform, ctx.cancel).await?;
        last_mbps = trial.achieved_mbps;

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

    Ok(MefResult {
        service: ServiceResult {
            service_id: service.identifier,
            name: service.name.clone(),
            steps,
            service_pass,
        },
        throughput_kbps: last_mbps * 1000.0,
    })
}

pub async fn configuration(
    ctx: &DispatchContext<'_>,
    config: &EngineConfig,
    platform: &mut dyn PlatformIo,
) -> EngineResult<TestResult> {
    let mut results = Vec::new();
    for service in config.services.iter().filter(|s| s.enabled).take(8) {
        let result = run_service(ctx, config, platform, service, &STEP_FRACTIONS_PCT, config.duration).await?;
        results.push(result);
    }
    Ok(TestResult::Mef(results))
}

pub async fn performance(
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
    Ok(TestResult::Mef(results))
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
            name: "evpl".to_string(),
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
    async fn configuration_reports_throughput_kbps_per_service() {
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

        let result = configuration(&ctx, &config, &mut platform).await.unwrap();
        match result {
            TestResult::Mef(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].service.steps.len(), STEP_FRACTIONS_PCT.len());
                assert!(results[0].throughput_kbps >= 0.0);
            }
            other => panic!("expected TestResult::Mef, got {other:?}"),
        }
    }
}
