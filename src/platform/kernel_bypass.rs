//! Kernel-bypass backend (software UMEM ring model).
//!
//! No AF_XDP crate exists anywhere in this project's dependency corpus
//! (see DESIGN.md), so this backend models the fill/completion/RX/TX
//! ring *ownership contract* faithfully — frame indices moving between
//! allocator, "NIC", and user — over an in-process loopback queue,
//! rather than touching a real NIC. Ring semantics are grounded on
//! `original_source/src/dataplane/linux_xdp/xdp_platform.c`.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::frame::FrameAllocator;
use crate::platform::{PlatformConfig, PlatformIo, RxFrame};

fn monotonic_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

pub struct KernelBypassIo {
    allocator: Option<FrameAllocator>,
    /// Frames the "NIC" has made available for receive (the completion
    /// ring, in loopback mode fed directly by our own TX path).
    rx_ring: VecDeque<(u64, Vec<u8>)>,
    /// Frames currently on loan to the consumer (index -> None once put
    /// back via release_batch).
    outstanding_handles: u64,
}

impl KernelBypassIo {
    pub fn new() -> Self {
        Self {
            allocator: None,
            rx_ring: VecDeque::new(),
            outstanding_handles: 0,
        }
    }
}

impl Default for KernelBypassIo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformIo for KernelBypassIo {
    async fn init(&mut self, config: &PlatformConfig) -> EngineResult<()> {
        if config.frame_pool_capacity == 0 {
            return Err(EngineError::ResourceExhaustion("frame pool capacity must be positive".into()));
        }
        // Fill ring pre-populated with half the pool at init (spec §4.A).
        self.allocator = Some(FrameAllocator::prefill_half(config.frame_pool_capacity, config.frame_size));
        self.rx_ring.clear();
        self.outstanding_handles = 0;
        Ok(())
    }

    async fn send_batch(&mut self, packets: &[Vec<u8>]) -> EngineResult<usize> {
        let allocator = self
            .allocator
            .as_mut()
            .ok_or_else(|| EngineError::InvalidState("send_batch before init".into()))?;
        let mut sent = 0;
        for packet in packets {
            let frame_addr = allocator.get();
            if frame_addr == crate::frame::FRAME_NONE {
                // No TX descriptor available; matches spec's partial-success rule.
                break;
            }
            // Loopback NIC: publish straight onto the RX ring, as a
            // local reflector would after an instantaneous round trip.
            self.rx_ring.push_back((frame_addr, packet.clone()));
            sent += 1;
        }
        Ok(sent)
    }

    async fn recv_batch(&mut self, max: usize) -> EngineResult<Vec<RxFrame>> {
        let mut out = Vec::new();
        for _ in 0..max {
            match self.rx_ring.pop_front() {
                Some((handle, data)) => {
                    self.outstanding_handles += 1;
                    out.push(RxFrame {
                        data,
                        timestamp_ns: monotonic_ns(),
                        handle,
                    });
                }
                None => break,
            }
        }
        Ok(out)
    }

    async fn release_batch(&mut self, frames: Vec<RxFrame>) -> EngineResult<()> {
        let allocator = self
            .allocator
            .as_mut()
            .ok_or_else(|| EngineError::InvalidState("release_batch before init".into()))?;
        for frame in frames {
            allocator.put(frame.handle);
            self.outstanding_handles = self.outstanding_handles.saturating_sub(1);
        }
        Ok(())
    }

    async fn cleanup(&mut self) -> EngineResult<()> {
        self.allocator = None;
        self.rx_ring.clear();
        self.outstanding_handles = 0;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "kernel-bypass"
    }

    fn supports_hw_timestamp(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame_through_the_loopback_rings() {
        let mut io = KernelBypassIo::new();
        io.init(&PlatformConfig::default()).await.unwrap();
        let sent = io.send_batch(&[vec![1, 2, 3]]).await.unwrap();
        assert_eq!(sent, 1);
        let received = io.recv_batch(8).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].data, vec![1, 2, 3]);
        io.release_batch(received).await.unwrap();
    }
}
