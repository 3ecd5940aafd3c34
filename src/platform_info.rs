//! Platform-info service (external collaborator, spec §6).
//!
//! Given an interface name, returns line speed, MAC, MTU, link state,
//! and HW-timestamp/XDP capability. Consults sysfs first, matching the
//! original source's "sysfs then ioctl fallback" order; the ioctl path
//! itself is left as a documented fallback since it requires raw
//! `SIOCETHTOOL` plumbing outside this crate's scope.

use std::fs;
use std::path::Path;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub speed_bps: u64,
    pub mac: [u8; 6],
    pub mtu: u32,
    pub link_state: LinkState,
    pub hw_timestamp_support: bool,
    pub xdp_support: bool,
}

pub trait PlatformInfoService: Send + Sync {
    fn query(&self, interface_name: &str) -> EngineResult<PlatformInfo>;
}

pub struct SysfsPlatformInfoService;

impl SysfsPlatformInfoService {
    fn read_trimmed(path: &Path) -> Option<String> {
        fs::read_to_string(path).ok().map(|s| s.trim().to_string())
    }

    fn read_mac(interface_name: &str) -> [u8; 6] {
        let path = format!("/sys/class/net/{interface_name}/address");
        Self::read_trimmed(Path::new(&path))
            .and_then(|s| {
                let mut mac = [0u8; 6];
                let mut parts = s.split(':');
                for byte in mac.iter_mut() {
                    *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
                }
                Some(mac)
            })
            .unwrap_or([0, 0, 0, 0, 0, 0])
    }
}

impl PlatformInfoService for SysfsPlatformInfoService {
    fn query(&self, interface_name: &str) -> EngineResult<PlatformInfo> {
        let base = format!("/sys/class/net/{interface_name}");
        if !Path::new(&base).exists() {
            return Err(EngineError::InvalidArgument(format!("unknown interface {interface_name}")));
        }

        // speed is in Mb/s, -1 when the driver can't report it (e.g. loopback).
        let speed_mbps: i64 = Self::read_trimmed(Path::new(&format!("{base}/speed")))
            .and_then(|s| s.parse().ok())
            .unwrap_or(-1);
        let speed_bps = if speed_mbps > 0 { speed_mbps as u64 * 1_000_000 } else { 0 };

        let mtu: u32 = Self::read_trimmed(Path::new(&format!("{base}/mtu")))
            .and_then(|s| s.parse().ok())
            .unwrap_or(1500);

        let operstate = Self::read_trimmed(Path::new(&format!("{base}/operstate"))).unwrap_or_default();
        let link_state = if operstate == "up" { LinkState::Up } else { LinkState::Down };

        Ok(PlatformInfo {
            speed_bps,
            mac: Self::read_mac(interface_name),
            mtu,
            link_state,
            // Real support requires an ethtool ioctl (SIOCETHTOOL /
            // ETHTOOL_GET_TS_INFO); sysfs alone can't tell us, so this
            // is conservatively reported false here.
            hw_timestamp_support: false,
            xdp_support: Path::new(&format!("{base}/xdp")).exists(),
        })
    }
}

/// `max_pps` for a given line rate and frame size, accounting for the
/// 20-byte wire overhead (preamble + IFG). Returns 0 rather than
/// dividing by zero when `line_rate_bps` is 0 (spec §8 boundary case).
pub fn max_pps(line_rate_bps: u64, frame_size: u64) -> f64 {
    if line_rate_bps == 0 {
        return 0.0;
    }
    let wire_size = frame_size + 20;
    line_rate_bps as f64 / (wire_size as f64 * 8.0)
}

/// Link utilization as a percentage of line rate. Returns 0 when
/// `line_rate_bps` is 0.
pub fn utilization(line_rate_bps: u64, achieved_bps: f64) -> f64 {
    if line_rate_bps == 0 {
        return 0.0;
    }
    100.0 * achieved_bps / line_rate_bps as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_line_rate_has_zero_max_pps_and_utilization() {
        assert_eq!(max_pps(0, 64), 0.0);
        assert_eq!(utilization(0, 100.0), 0.0);
    }

    #[test]
    fn max_pps_matches_10g_64_byte_scenario() {
        let pps = max_pps(10_000_000_000, 64);
        assert!((pps - 14_880_952.380952381).abs() < 1.0);
    }
}
