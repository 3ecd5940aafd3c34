//! # Command-Line Interface Module
//!
//! Argument parsing and configuration for the netbench engine, using
//! `clap`'s derive API the same way the original CLI module did:
//! value-enum test selection, human-readable duration parsing, and a
//! `From<&Args>` conversion into the engine's own configuration type.

use std::path::PathBuf;
use std::time::Duration;

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser, ValueEnum,
};

use crate::codec::IpMode as CodecIpMode;
use crate::engine::{EngineConfig, TestType, Y1564Service};
use crate::platform::PlatformBackend;

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// netbench - RFC 2544 / RFC 2889 / RFC 6349 / Y.1564 / Y.1731 / MEF 48
/// / TSN network benchmark generator and analyzer.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Network interface to drive the test over (e.g. "eth0").
    pub interface: String,

    /// Which conformance test to run.
    #[arg(short = 't', long, value_enum, default_value_t = TestKind::Rfc2544Throughput)]
    pub test: TestKind,

    /// Frame sizes to test, in bytes (space-separated).
    #[arg(short = 'f', long, num_args = 1.., default_values_t = vec![64, 128, 256, 512, 1024, 1280, 1518])]
    pub frame_sizes: Vec<usize>,

    /// Duration of each measurement trial.
    #[arg(short = 'd', long, value_parser = parse_duration, default_value = "1s")]
    pub duration: Duration,

    /// Warmup period before measurement begins for each trial.
    #[arg(short = 'w', long, value_parser = parse_duration, default_value = "500ms")]
    pub warmup: Duration,

    /// Binary-search resolution for throughput/forwarding-rate tests, in percent of line rate.
    #[arg(long, default_value_t = crate::convergence::DEFAULT_RESOLUTION_PCT)]
    pub resolution_pct: f64,

    /// Maximum binary-search iterations.
    #[arg(long, default_value_t = crate::convergence::DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: u32,

    /// Acceptable frame loss, in percent, for a throughput trial to pass.
    #[arg(long, default_value_t = 0.0)]
    pub acceptable_loss_pct: f64,

    /// Latency percentiles to report.
    #[arg(long, num_args = 1.., default_values_t = vec![50.0, 95.0, 99.0])]
    pub percentiles: Vec<f64>,

    /// Packet I/O backend.
    #[arg(long, value_enum, default_value_t = BackendKind::RawSocket)]
    pub backend: BackendKind,

    /// IP version to use for test frames.
    #[arg(long, value_enum, default_value_t = IpModeKind::V4)]
    pub ip_mode: IpModeKind,

    /// UDP source port for test frames.
    #[arg(long, default_value_t = 50000)]
    pub src_port: u16,

    /// UDP destination port for test frames.
    #[arg(long, default_value_t = 50001)]
    pub dst_port: u16,

    /// Number of interface identities to drive the test across concurrently.
    /// A value above 1 runs one worker task per port, joined before results
    /// are reported (mutually exclusive with --bidirectional).
    #[arg(long, default_value_t = 1)]
    pub port_count: usize,

    /// Run the trial in both directions concurrently on a joined auxiliary
    /// task instead of one direction only.
    #[arg(long)]
    pub bidirectional: bool,

    /// CIR (Mbps) for each Y.1564/MEF service under test. One
    /// `Y1564Service` is built per entry; this is also what switches
    /// Y.1564/MEF configuration/performance tests on at all (an empty
    /// list measures nothing for those test types).
    #[arg(long, num_args = 1.., help_heading = "Y.1564 / MEF Service Table")]
    pub service_cir_mbps: Vec<f64>,

    /// EIR (Mbps) for each service, paired positionally with
    /// `--service-cir-mbps`. Shorter than the CIR list defaults to 0.
    #[arg(long, num_args = 1.., help_heading = "Y.1564 / MEF Service Table")]
    pub service_eir_mbps: Vec<f64>,

    /// Display name for each service, paired positionally with
    /// `--service-cir-mbps`. Shorter than the CIR list defaults to
    /// "service-<index>".
    #[arg(long, num_args = 1.., help_heading = "Y.1564 / MEF Service Table")]
    pub service_name: Vec<String>,

    /// Test frame size (bytes) for each service, paired positionally
    /// with `--service-cir-mbps`. Shorter than the CIR list defaults
    /// to 512.
    #[arg(long, num_args = 1.., help_heading = "Y.1564 / MEF Service Table")]
    pub service_frame_size: Vec<usize>,

    /// Output file for results (JSON format); defaults to stdout if omitted.
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Silence all user-facing informational output on stdout.
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    pub quiet: bool,

    /// Increase diagnostic log verbosity on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TestKind {
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

impl From<TestKind> for TestType {
    fn from(kind: TestKind) -> Self {
        match kind {
            TestKind::Rfc2544Throughput => TestType::Rfc2544Throughput,
            TestKind::Rfc2544Latency => TestType::Rfc2544Latency,
            TestKind::Rfc2544FrameLoss => TestType::Rfc2544FrameLoss,
            TestKind::Rfc2544BackToBack => TestType::Rfc2544BackToBack,
            TestKind::Rfc2544SystemRecovery => TestType::Rfc2544SystemRecovery,
            TestKind::Rfc2544Reset => TestType::Rfc2544Reset,
            TestKind::Y1564ServiceConfiguration => TestType::Y1564ServiceConfiguration,
            TestKind::Y1564ServicePerformance => TestType::Y1564ServicePerformance,
            TestKind::Y1731DelayMeasurement => TestType::Y1731DelayMeasurement,
            TestKind::Y1731LossMeasurement => TestType::Y1731LossMeasurement,
            TestKind::Y1731SyntheticLoss => TestType::Y1731SyntheticLoss,
            TestKind::Y1731Loopback => TestType::Y1731Loopback,
            TestKind::Rfc2889ForwardingRate => TestType::Rfc2889ForwardingRate,
            TestKind::Rfc2889BroadcastForwarding => TestType::Rfc2889BroadcastForwarding,
            TestKind::Rfc2889Congestion => TestType::Rfc2889Congestion,
            TestKind::Mef48Configuration => TestType::Mef48Configuration,
            TestKind::Mef48Performance => TestType::Mef48Performance,
            TestKind::Rfc6349Throughput => TestType::Rfc6349Throughput,
            TestKind::TsnGateTiming => TestType::TsnGateTiming,
            TestKind::TsnIsolation => TestType::TsnIsolation,
            TestKind::TsnPtpSync => TestType::TsnPtpSync,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    #[value(name = "raw-socket")]
    RawSocket,
    #[value(name = "kernel-bypass")]
    KernelBypass,
    #[value(name = "line-rate")]
    LineRate,
}

impl From<BackendKind> for PlatformBackend {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::RawSocket => PlatformBackend::RawSocket,
            BackendKind::KernelBypass => PlatformBackend::KernelBypass,
            BackendKind::LineRate => PlatformBackend::LineRate,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum IpModeKind {
    V4,
    V6,
}

impl From<IpModeKind> for CodecIpMode {
    fn from(kind: IpModeKind) -> Self {
        match kind {
            IpModeKind::V4 => CodecIpMode::V4,
            IpModeKind::V6 => CodecIpMode::V6,
        }
    }
}

/// Default Y.1564 committed-information thresholds for services whose
/// CLI entry doesn't spell them out; these are CIR/EIR table entries, not
/// pass/fail policy, so a single sensible default column is enough.
const DEFAULT_CBS_BYTES: u32 = 16_000;
const DEFAULT_EBS_BYTES: u32 = 16_000;
const DEFAULT_FD_THRESHOLD_MS: f64 = 10.0;
const DEFAULT_FDV_THRESHOLD_MS: f64 = 5.0;
const DEFAULT_FLR_THRESHOLD_PCT: f64 = 0.1;
const DEFAULT_SERVICE_FRAME_SIZE: usize = 512;

fn services_from_args(args: &Args) -> Vec<Y1564Service> {
    args.service_cir_mbps
        .iter()
        .enumerate()
        .map(|(index, &cir_mbps)| Y1564Service {
            identifier: index as u8,
            name: args.service_name.get(index).cloned().unwrap_or_else(|| format!("service-{index}")),
            cir_mbps,
            eir_mbps: args.service_eir_mbps.get(index).copied().unwrap_or(0.0),
            cbs_bytes: DEFAULT_CBS_BYTES,
            ebs_bytes: DEFAULT_EBS_BYTES,
            fd_threshold_ms: DEFAULT_FD_THRESHOLD_MS,
            fdv_threshold_ms: DEFAULT_FDV_THRESHOLD_MS,
            flr_threshold_pct: DEFAULT_FLR_THRESHOLD_PCT,
            test_frame_size: args.service_frame_size.get(index).copied().unwrap_or(DEFAULT_SERVICE_FRAME_SIZE),
            dscp: 0,
            enabled: true,
        })
        .collect()
}

impl From<&Args> for EngineConfig {
    fn from(args: &Args) -> Self {
        let mut config = EngineConfig {
            test_type: args.test.into(),
            frame_sizes: args.frame_sizes.clone(),
            duration: args.duration,
            warmup: args.warmup,
            resolution_pct: args.resolution_pct,
            max_iterations: args.max_iterations,
            acceptable_loss_pct: args.acceptable_loss_pct,
            percentiles: args.percentiles.clone(),
            backend: args.backend.into(),
            ip_mode: args.ip_mode.into(),
            src_port: args.src_port,
            dst_port: args.dst_port,
            port_count: args.port_count,
            bidirectional: args.bidirectional,
            services: services_from_args(args),
            ..EngineConfig::default()
        };
        config.clamp();
        config
    }
}

/// Parse duration from string (e.g., "10s", "5m", "1h").
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str.parse().map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    if num < 0.0 {
        return Err("Duration cannot be negative".to_string());
    }

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs(num as u64),
        "m" => Duration::from_secs((num * 60.0) as u64),
        "h" => Duration::from_secs((num * 3600.0) as u64),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn args_convert_into_a_clamped_engine_config() {
        let args = Args {
            interface: "eth0".to_string(),
            test: TestKind::Rfc2544Throughput,
            frame_sizes: vec![64, 1518],
            duration: Duration::from_millis(10),
            warmup: Duration::from_millis(100),
            resolution_pct: 0.0,
            max_iterations: 10,
            acceptable_loss_pct: 0.0,
            percentiles: vec![50.0, 99.0],
            backend: BackendKind::RawSocket,
            ip_mode: IpModeKind::V4,
            src_port: 1000,
            dst_port: 1001,
            port_count: 1,
            bidirectional: false,
            service_cir_mbps: vec![100.0],
            service_eir_mbps: vec![],
            service_name: vec![],
            service_frame_size: vec![],
            output_file: None,
            quiet: false,
            verbose: 0,
        };
        let config: EngineConfig = (&args).into();
        assert_eq!(config.duration, Duration::from_secs(1));
        assert_eq!(config.resolution_pct, 0.01);
        assert_eq!(config.frame_sizes, vec![64, 1518]);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].cir_mbps, 100.0);
        assert_eq!(config.services[0].name, "service-0");
        assert_eq!(config.services[0].test_frame_size, DEFAULT_SERVICE_FRAME_SIZE);
        assert!(config.services[0].enabled);
    }

    #[test]
    fn services_from_args_pairs_positionally_and_fills_defaults() {
        let mut args_template = Args {
            interface: "eth0".to_string(),
            test: TestKind::Y1564ServiceConfiguration,
            frame_sizes: vec![64],
            duration: Duration::from_secs(1),
            warmup: Duration::from_millis(0),
            resolution_pct: 1.0,
            max_iterations: 10,
            acceptable_loss_pct: 0.0,
            percentiles: vec![50.0],
            backend: BackendKind::RawSocket,
            ip_mode: IpModeKind::V4,
            src_port: 1000,
            dst_port: 1001,
            port_count: 1,
            bidirectional: false,
            service_cir_mbps: vec![100.0, 50.0],
            service_eir_mbps: vec![150.0],
            service_name: vec!["voice".to_string()],
            service_frame_size: vec![],
            output_file: None,
            quiet: false,
            verbose: 0,
        };
        let services = services_from_args(&args_template);
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "voice");
        assert_eq!(services[0].eir_mbps, 150.0);
        assert_eq!(services[1].name, "service-1");
        assert_eq!(services[1].eir_mbps, 0.0);
        assert_eq!(services[1].cir_mbps, 50.0);

        args_template.service_cir_mbps.clear();
        assert!(services_from_args(&args_template).is_empty());
    }
}
