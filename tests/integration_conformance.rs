//! End-to-end conformance scenarios against the kernel-bypass loopback
//! backend.
//!
//! `KernelBypassIo` reflects every frame instantaneously with no loss,
//! so these scenarios are scaled down from the line-rate, multi-second
//! runs the standards describe (no real 10GbE hardware is available
//! here) while still exercising the same dispatch code paths a real
//! run would use: convergence search, the frame-loss sweep, the
//! Y.1564 step test, and cooperative cancellation.

use std::sync::atomic::Ordering;
use std::time::Duration;

use netbench_engine::engine::{EngineConfig, EngineContext, Y1564Service};
use netbench_engine::error::EngineError;
use netbench_engine::platform::PlatformBackend;
use netbench_engine::results::TestResult;
use netbench_engine::{EngineState, TestType};

fn base_config() -> EngineConfig {
    EngineConfig {
        backend: PlatformBackend::KernelBypass,
        warmup: Duration::from_millis(0),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn throughput_converges_near_line_rate_with_zero_loss_backend() {
    let mut engine = EngineContext::init("lo").expect("loopback info falls back to defaults");
    let config = EngineConfig {
        test_type: TestType::Rfc2544Throughput,
        frame_sizes: vec![64],
        duration: Duration::from_millis(20),
        max_iterations: 8,
        resolution_pct: 5.0,
        ..base_config()
    };
    engine.configure(config).expect("valid config");

    let results = engine.run().await.expect("kernel-bypass loopback never drops frames");
    match results.result {
        TestResult::Throughput(points) => {
            assert_eq!(points.len(), 1);
            let point = &points[0];
            assert_eq!(point.frame_size, 64);
            assert!(point.best_rate_pct > 90.0, "expected near-line-rate convergence, got {}", point.best_rate_pct);
            assert!(point.frames_tested > 0);
            assert!(point.iterations <= 8);
        }
        other => panic!("expected TestResult::Throughput, got {other:?}"),
    }
}

#[tokio::test]
async fn latency_reports_one_load_point_per_configured_level() {
    let mut engine = EngineContext::init("lo").expect("loopback info falls back to defaults");
    let config = EngineConfig {
        test_type: TestType::Rfc2544Latency,
        frame_sizes: vec![64],
        duration: Duration::from_millis(20),
        latency_load_levels_pct: vec![50.0, 100.0],
        ..base_config()
    };
    engine.configure(config).expect("valid config");

    let results = engine.run().await.expect("kernel-bypass loopback never drops frames");
    match results.result {
        TestResult::Latency(points) => {
            assert_eq!(points.len(), 2);
            for point in &points {
                assert_eq!(point.frame_size, 64);
                assert!(point.latency.count > 0, "expected latency samples at {}% load", point.offered_rate_pct);
            }
        }
        other => panic!("expected TestResult::Latency, got {other:?}"),
    }
}

#[tokio::test]
async fn frame_loss_sweep_reports_zero_loss_against_the_loopback_backend() {
    let mut engine = EngineContext::init("lo").expect("loopback info falls back to defaults");
    let config = EngineConfig {
        test_type: TestType::Rfc2544FrameLoss,
        frame_sizes: vec![64],
        duration: Duration::from_millis(20),
        loss_start_pct: 100.0,
        loss_end_pct: 10.0,
        loss_step_pct: 10.0,
        ..base_config()
    };
    engine.configure(config).expect("valid config");

    let results = engine.run().await.expect("kernel-bypass loopback never drops frames");
    match results.result {
        TestResult::FrameLoss(steps) => {
            assert_eq!(steps.len(), 10, "100 down to 10 in steps of 10 is 10 offered-rate points");
            for step in &steps {
                assert_eq!(step.loss_pct, 0.0, "loopback backend never drops frames at {}% offered rate", step.offered_rate_pct);
            }
        }
        other => panic!("expected TestResult::FrameLoss, got {other:?}"),
    }
}

#[tokio::test]
async fn y1564_service_configuration_passes_with_headroom_thresholds() {
    let mut engine = EngineContext::init("lo").expect("loopback info falls back to defaults");
    let service = Y1564Service {
        identifier: 0,
        name: "voice".to_string(),
        cir_mbps: 100.0,
        eir_mbps: 0.0,
        cbs_bytes: 16_000,
        ebs_bytes: 16_000,
        fd_threshold_ms: 10.0,
        fdv_threshold_ms: 5.0,
        flr_threshold_pct: 0.1,
        test_frame_size: 512,
        dscp: 46,
        enabled: true,
    };
    let config = EngineConfig {
        test_type: TestType::Y1564ServiceConfiguration,
        duration: Duration::from_millis(20),
        services: vec![service],
        ..base_config()
    };
    engine.configure(config).expect("valid config");

    let results = engine.run().await.expect("kernel-bypass loopback never drops frames");
    match results.result {
        TestResult::Y1564(services) => {
            assert_eq!(services.len(), 1);
            assert_eq!(services[0].name, "voice");
            assert_eq!(services[0].steps.len(), 4, "Y.1564 steps at 25/50/75/100% CIR");
            assert!(services[0].service_pass, "zero-loss, near-zero-latency loopback should clear headroom thresholds");
        }
        other => panic!("expected TestResult::Y1564, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_during_throughput_stops_the_run_and_reports_cancelled() {
    let mut engine = EngineContext::init("lo").expect("loopback info falls back to defaults");
    let config = EngineConfig {
        test_type: TestType::Rfc2544Throughput,
        frame_sizes: vec![64],
        duration: Duration::from_millis(100),
        max_iterations: 20,
        resolution_pct: 1.0,
        ..base_config()
    };
    engine.configure(config).expect("valid config");

    let cancel_handle = engine.cancel_flag();
    let run_handle = tokio::spawn(async move {
        let outcome = engine.run().await;
        (engine.state(), outcome)
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel_handle.store(true, Ordering::SeqCst);

    let (state, outcome) = tokio::time::timeout(Duration::from_secs(5), run_handle)
        .await
        .expect("cancellation should unwind well within the binary search's full duration")
        .expect("run task should not panic");

    assert!(matches!(outcome, Err(EngineError::Cancelled)));
    assert_eq!(state, EngineState::Cancelled);
}
