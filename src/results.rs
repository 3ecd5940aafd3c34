//! Result tables (component K data model), trimmed to the typed,
//! serializable envelope the spec actually calls for — rendering to
//! text/JSON/CSV is an external consumer's job (spec §1), so the
//! teacher's elaborate streaming/per-message/CSV machinery in its own
//! `results.rs` has no counterpart here and is dropped in the final
//! trim pass (see DESIGN.md).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::latency::LatencyStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableLatencyStats {
    pub count: u64,
    pub min_ns: u64,
    pub avg_ns: u64,
    pub max_ns: u64,
    pub jitter_ns: u64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
}

impl From<&LatencyStats> for SerializableLatencyStats {
    fn from(stats: &LatencyStats) -> Self {
        Self {
            count: stats.count,
            min_ns: stats.min_ns,
            avg_ns: stats.avg_ns,
            max_ns: stats.max_ns,
            jitter_ns: stats.jitter_ns,
            p50_ns: stats.percentile(50.0).unwrap_or(0),
            p95_ns: stats.percentile(95.0).unwrap_or(0),
            p99_ns: stats.percentile(99.0).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub frame_size: usize,
    pub best_rate_pct: f64,
    pub best_mbps: f64,
    pub best_pps: f64,
    pub iterations: u32,
    pub frames_tested: u64,
    pub latency: SerializableLatencyStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyLoadPointResult {
    pub frame_size: usize,
    pub offered_rate_pct: f64,
    pub latency: SerializableLatencyStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameLossStepResult {
    pub offered_rate_pct: f64,
    pub sent: u64,
    pub received: u64,
    pub loss_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackToBackResult {
    pub max_burst: u64,
    pub burst_duration_us: f64,
    pub trials_passed: u32,
    pub trials_run: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRecoveryResult {
    pub recovery_time_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResult {
    pub loss_onset_secs: Option<f64>,
    pub recovery_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStepResult {
    pub step_pct: f64,
    pub rate_pct: f64,
    pub frame_delay_avg_ms: f64,
    pub frame_delay_variation_ms: f64,
    pub frame_loss_ratio_pct: f64,
    pub pass: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResult {
    pub service_id: u8,
    pub name: String,
    pub steps: Vec<ServiceStepResult>,
    pub service_pass: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Y1731ProbeResult {
    pub probes_sent: u64,
    pub probes_received: u64,
    pub latency: SerializableLatencyStats,
    pub delay_variation_ns: u64,
    pub near_end_loss: u64,
    pub far_end_loss: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rfc2889Result {
    pub forwarding_rate_pct: Option<f64>,
    pub replication_factor: Option<f64>,
    pub dropped: Option<u64>,
    pub backpressure_observed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MefResult {
    pub service: ServiceResult,
    pub throughput_kbps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsnResult {
    pub gate_deviation_ns: u64,
    pub within_max_jitter: bool,
    pub per_class_latency: Vec<(u32, SerializableLatencyStats)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rfc6349Result {
    pub theoretical_mbps: f64,
    pub measured_alternative_note: String,
}

/// One port's result within a multi-port run (spec §5/§9's concurrency note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortResult {
    pub port_index: usize,
    pub result: TestResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TestResult {
    Throughput(Vec<ThroughputResult>),
    Latency(Vec<LatencyLoadPointResult>),
    FrameLoss(Vec<FrameLossStepResult>),
    BackToBack(BackToBackResult),
    SystemRecovery(SystemRecoveryResult),
    Reset(ResetResult),
    Y1564(Vec<ServiceResult>),
    Y1731(Y1731ProbeResult),
    Rfc2889(Rfc2889Result),
    Mef(Vec<MefResult>),
    Tsn(TsnResult),
    Rfc6349(Rfc6349Result),
    /// Same test run concurrently across `port_count` interface identities,
    /// one worker task per port, joined before returning.
    MultiPort(Vec<PortResult>),
    /// Same test run concurrently in both directions on a joined auxiliary
    /// task (spec §5/§9's bidirectional concurrency pattern).
    Bidirectional { forward: Box<TestResult>, reverse: Box<TestResult> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResults {
    pub run_id: Uuid,
    pub interface_name: String,
    pub test_type: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: TestResult,
}
