//! Platform I/O abstraction (component A).
//!
//! A uniform batch send/recv API over three backends. Trait shape is
//! modeled on the teacher's `ipc::IpcTransport` (`async_trait`, a small
//! set of capability queries with sensible defaults, a static factory);
//! see DESIGN.md for per-backend grounding.

mod kernel_bypass;
mod line_rate;
mod raw_socket;

pub use kernel_bypass::KernelBypassIo;
pub use line_rate::LineRateIo;
pub use raw_socket::RawSocketIo;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub interface_name: String,
    pub queue_id: u32,
    pub frame_pool_capacity: usize,
    pub frame_size: usize,
    pub promiscuous: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            interface_name: "lo".to_string(),
            queue_id: 0,
            frame_pool_capacity: crate::frame::DEFAULT_FRAME_POOL_CAPACITY,
            frame_size: crate::frame::DEFAULT_FRAME_SIZE,
            promiscuous: true,
        }
    }
}

/// A received frame: payload bytes, an ingress timestamp, and an opaque
/// handle the backend needs back when the frame is released.
#[derive(Debug, Clone)]
pub struct RxFrame {
    pub data: Vec<u8>,
    pub timestamp_ns: u64,
    pub handle: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformBackend {
    RawSocket,
    KernelBypass,
    LineRate,
}

impl std::fmt::Display for PlatformBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlatformBackend::RawSocket => "raw-socket",
            PlatformBackend::KernelBypass => "kernel-bypass",
            PlatformBackend::LineRate => "line-rate",
        };
        write!(f, "{s}")
    }
}

#[async_trait]
pub trait PlatformIo: Send + Sync {
    /// Bind to the configured interface/queue, allocate rings/buffers,
    /// and read the interface MAC.
    async fn init(&mut self, config: &PlatformConfig) -> EngineResult<()>;

    /// Attempt to transmit each packet; returns the authoritative count
    /// of packets actually transmitted. Partial success is allowed.
    async fn send_batch(&mut self, packets: &[Vec<u8>]) -> EngineResult<usize>;

    /// Non-blocking; returns up to `max` received frames.
    async fn recv_batch(&mut self, max: usize) -> EngineResult<Vec<RxFrame>>;

    /// Return previously-received frames' ring slots to the backend.
    async fn release_batch(&mut self, frames: Vec<RxFrame>) -> EngineResult<()>;

    /// Quiescent teardown; idempotent.
    async fn cleanup(&mut self) -> EngineResult<()>;

    fn name(&self) -> &'static str;

    fn local_mac(&self) -> [u8; 6] {
        [0x02, 0x00, 0x00, 0x00, 0x00, 0x01]
    }

    fn supports_hw_timestamp(&self) -> bool {
        false
    }
}

pub struct PlatformFactory;

impl PlatformFactory {
    pub fn create(backend: PlatformBackend) -> EngineResult<Box<dyn PlatformIo>> {
        match backend {
            PlatformBackend::RawSocket => Ok(Box::new(RawSocketIo::new())),
            PlatformBackend::KernelBypass => Ok(Box::new(KernelBypassIo::new())),
            PlatformBackend::LineRate => Ok(Box::new(LineRateIo::new())),
        }
    }

    /// Create `count` independent backend instances, one per worker,
    /// mirroring the teacher's `TransportFactory::create_multiple`.
    pub fn create_multiple(backend: PlatformBackend, count: usize) -> EngineResult<Vec<Box<dyn PlatformIo>>> {
        if count == 0 {
            return Err(EngineError::InvalidArgument("worker count must be at least 1".into()));
        }
        (0..count).map(|_| Self::create(backend)).collect()
    }
}
