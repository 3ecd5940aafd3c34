//! Engine context (component K).
//!
//! Lifecycle, configuration, per-worker state, result tables, and
//! cancellation, grounded on the teacher's `BenchmarkRunner`/
//! `ResultsManager` orchestration shape (`benchmark.rs`) and
//! `coordination.rs`'s `HostCoordinator` for the multi-port worker-pool
//! pattern (spec §5/§9: "a task-based runtime can implement them as
//! async tasks").

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::codec::{signature, IpEndpoint, IpMode};
use crate::dispatch;
use crate::error::{EngineError, EngineResult};
use crate::platform::{PlatformBackend, PlatformConfig, PlatformFactory, PlatformIo};
use crate::platform_info::{PlatformInfoService, SysfsPlatformInfoService};
use crate::results::{EngineResults, TestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    Rfc2544Throughput,
    Rfc2544Latency,
    Rfc2544FrameLoss,
    Rfc2544BackToBack,
    Rfc2544SystemRecovery,
    Rfc2544Reset,
    Y1564ServiceConfiguration,
    Y1564ServicePerformance,
    Y1731DelayMeasurement,
    Y1731LossMeasurement,
    Y1731SyntheticLoss,
    Y1731Loopback,
    Rfc2889ForwardingRate,
    Rfc2889BroadcastForwarding,
    Rfc2889Congestion,
    Mef48Configuration,
    Mef48Performance,
    Rfc6349Throughput,
    TsnGateTiming,
    TsnIsolation,
    TsnPtpSync,
}

/// Y.1564 Service (spec §3 data model).
#[derive(Debug, Clone)]
pub struct Y1564Service {
    pub identifier: u8,
    pub name: String,
    pub cir_mbps: f64,
    pub eir_mbps: f64,
    pub cbs_bytes: u32,
    pub ebs_bytes: u32,
    pub fd_threshold_ms: f64,
    pub fdv_threshold_ms: f64,
    pub flr_threshold_pct: f64,
    pub test_frame_size: usize,
    pub dscp: u8,
    pub enabled: bool,
}

impl Y1564Service {
    pub fn validate(&self) -> EngineResult<()> {
        if self.cir_mbps <= 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "service {} has non-positive CIR",
                self.identifier
            )));
        }
        if self.fd_threshold_ms < 0.0 || self.fdv_threshold_ms < 0.0 || self.flr_threshold_pct < 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "service {} has a negative threshold",
                self.identifier
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub test_type: TestType,
    pub frame_sizes: Vec<usize>,
    pub duration: Duration,
    pub warmup: Duration,
    pub resolution_pct: f64,
    pub max_iterations: u32,
    pub acceptable_loss_pct: f64,
    pub percentiles: Vec<f64>,
    pub backend: PlatformBackend,
    pub ip_mode: IpMode,
    pub src_port: u16,
    pub dst_port: u16,
    pub port_count: usize,
    pub bidirectional: bool,
    pub services: Vec<Y1564Service>,
    /// Loop load levels for the RFC 2544 latency dispatcher, percent of
    /// line rate (spec default 10, 20, ..., 100).
    pub latency_load_levels_pct: Vec<f64>,
    /// Start/end/step for the RFC 2544 frame-loss sweep, percent.
    pub loss_start_pct: f64,
    pub loss_end_pct: f64,
    pub loss_step_pct: f64,
    pub initial_burst: u64,
    pub burst_trials: u32,
}

impl EngineConfig {
    pub fn clamp(&mut self) {
        if self.duration < Duration::from_secs(1) {
            self.duration = Duration::from_secs(1);
        }
        if self.resolution_pct < 0.01 {
            self.resolution_pct = 0.01;
        }
        if self.port_count == 0 {
            self.port_count = 1;
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            test_type: TestType::Rfc2544Throughput,
            frame_sizes: vec![64, 128, 256, 512, 1024, 1280, 1518],
            duration: Duration::from_secs(1),
            warmup: Duration::from_millis(500),
            resolution_pct: crate::convergence::DEFAULT_RESOLUTION_PCT,
            max_iterations: crate::convergence::DEFAULT_MAX_ITERATIONS,
            acceptable_loss_pct: 0.0,
            percentiles: vec![50.0, 95.0, 99.0],
            backend: PlatformBackend::RawSocket,
            ip_mode: IpMode::V4,
            src_port: 50000,
            dst_port: 50001,
            port_count: 1,
            bidirectional: false,
            services: Vec::new(),
            latency_load_levels_pct: (1..=10).map(|i| i as f64 * 10.0).collect(),
            loss_start_pct: 100.0,
            loss_end_pct: 10.0,
            loss_step_pct: 10.0,
            initial_burst: 1000,
            burst_trials: 10,
        }
    }
}

pub struct Worker {
    pub index: usize,
    pub platform: Box<dyn PlatformIo>,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub tx_errors: u64,
    pub rx_errors: u64,
}

pub struct Interface {
    pub name: String,
    pub mac: [u8; 6],
    pub line_rate_bps: u64,
    pub local_ip: IpEndpoint,
    pub remote_ip: IpEndpoint,
}

pub struct EngineContext {
    pub interface: Interface,
    config: Option<EngineConfig>,
    state: EngineState,
    cancel_flag: Arc<AtomicBool>,
    sequence_counter: AtomicU32,
    platform_info_service: Box<dyn PlatformInfoService>,
    progress: Option<Box<dyn Fn(&str, f64) + Send + Sync>>,
}

impl EngineContext {
    /// Allocate, set defaults, query line rate, set state = Idle.
    pub fn init(interface_name: &str) -> EngineResult<Self> {
        let service = SysfsPlatformInfoService;
        let info = service.query(interface_name).unwrap_or(crate::platform_info::PlatformInfo {
            speed_bps: 10_000_000_000,
            mac: [0x02, 0, 0, 0, 0, 1],
            mtu: 1500,
            link_state: crate::platform_info::LinkState::Down,
            hw_timestamp_support: false,
            xdp_support: false,
        });

        Ok(Self {
            interface: Interface {
                name: interface_name.to_string(),
                mac: info.mac,
                line_rate_bps: info.speed_bps,
                local_ip: IpEndpoint::V4(std::net::Ipv4Addr::new(192, 168, 1, 1)),
                remote_ip: IpEndpoint::V4(std::net::Ipv4Addr::new(192, 168, 1, 2)),
            },
            config: None,
            state: EngineState::Idle,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            sequence_counter: AtomicU32::new(0),
            platform_info_service: Box::new(service),
            progress: None,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
    }

    fn report_progress(&self, message: &str, percent: f64) {
        if let Some(cb) = &self.progress {
            cb(message, percent);
        }
    }

    /// Reject when state = Running; copy config; clamp nonsensical values.
    pub fn configure(&mut self, mut config: EngineConfig) -> EngineResult<()> {
        if self.state == EngineState::Running {
            return Err(EngineError::InvalidState("configure() called while Running".into()));
        }
        config.clamp();
        for service in &config.services {
            if service.enabled {
                service.validate()?;
            }
        }
        self.config = Some(config);
        Ok(())
    }

    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    fn next_stream_id(&self) -> u32 {
        self.sequence_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Select backend; allocate workers; mark Running; dispatch by
    /// `test_type`; on completion set Completed/Failed/Cancelled.
    pub async fn run(&mut self) -> EngineResult<EngineResults> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| EngineError::InvalidState("run() called before configure()".into()))?;

        self.state = EngineState::Running;
        self.cancel_flag.store(false, Ordering::SeqCst);
        let started_at = Utc::now();

        self.report_progress("starting test", 0.0);

        let stream_id = self.next_stream_id();
        let outcome = if config.port_count > 1 {
            dispatch::multi_port(self, &config, config.backend, stream_id).await
        } else if config.bidirectional {
            dispatch::bidirectional(self, &config, config.backend, stream_id).await
        } else {
            let mut platform = PlatformFactory::create(config.backend)?;
            let platform_config = PlatformConfig {
                interface_name: self.interface.name.clone(),
                queue_id: 0,
                frame_pool_capacity: crate::frame::DEFAULT_FRAME_POOL_CAPACITY,
                frame_size: config.frame_sizes.first().copied().unwrap_or(crate::frame::DEFAULT_FRAME_SIZE),
                promiscuous: true,
            };
            if let Err(err) = platform.init(&platform_config).await {
                self.state = EngineState::Failed;
                return Err(err);
            }
            let outcome = dispatch::run(self, &config, platform.as_mut(), stream_id).await;
            platform.cleanup().await.ok();
            outcome
        };

        let result = match outcome {
            Ok(result) => {
                self.state = EngineState::Completed;
                result
            }
            Err(EngineError::Cancelled) => {
                self.state = EngineState::Cancelled;
                return Err(EngineError::Cancelled);
            }
            Err(err) => {
                self.state = EngineState::Failed;
                return Err(err);
            }
        };

        self.report_progress("test complete", 100.0);

        Ok(EngineResults {
            run_id: uuid::Uuid::new_v4(),
            interface_name: self.interface.name.clone(),
            test_type: format!("{:?}", config.test_type),
            started_at,
            finished_at: Utc::now(),
            result,
        })
    }

    /// If still Running, signal cancel and wait up to 10s; tear down.
    pub async fn cleanup(&mut self) -> EngineResult<()> {
        if self.state == EngineState::Running {
            self.cancel();
            let deadline = Duration::from_secs(10);
            let start = std::time::Instant::now();
            while self.state == EngineState::Running && start.elapsed() < deadline {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        Ok(())
    }

    /// A cloneable handle to the same cancellation flag `run()` polls,
    /// so a caller can request cancellation from another task (e.g. a
    /// Ctrl+C listener) without needing a second borrow of this context.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    pub(crate) fn platform_info(&self) -> &dyn PlatformInfoService {
        self.platform_info_service.as_ref()
    }
}

/// Default signature used when a dispatcher doesn't override it.
pub fn default_signature_for(test_type: TestType) -> &'static [u8; 7] {
    use TestType::*;
    match test_type {
        Rfc2544Throughput | Rfc2544Latency | Rfc2544FrameLoss | Rfc2544BackToBack | Rfc2544SystemRecovery | Rfc2544Reset => {
            signature::RFC2544
        }
        Y1564ServiceConfiguration | Y1564ServicePerformance => signature::Y1564,
        Y1731DelayMeasurement | Y1731LossMeasurement | Y1731SyntheticLoss | Y1731Loopback => signature::Y1731,
        Rfc2889ForwardingRate | Rfc2889BroadcastForwarding | Rfc2889Congestion => signature::RFC2889,
        Mef48Configuration | Mef48Performance => signature::MEF48,
        Rfc6349Throughput => signature::RFC6349,
        TsnGateTiming | TsnIsolation | TsnPtpSync => signature::TSN_802QBV,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_enforces_minimum_duration_and_resolution() {
        let mut config = EngineConfig {
            duration: Duration::from_millis(10),
            resolution_pct: 0.0,
            ..EngineConfig::default()
        };
        config.clamp();
        assert_eq!(config.duration, Duration::from_secs(1));
        assert_eq!(config.resolution_pct, 0.01);
    }

    #[tokio::test]
    async fn configure_while_running_is_rejected() {
        let mut ctx = EngineContext::init("lo").unwrap();
        ctx.state = EngineState::Running;
        let result = ctx.configure(EngineConfig::default());
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
    }
}
