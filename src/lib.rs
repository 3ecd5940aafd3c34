//! # netbench-engine
//!
//! A standards-compliant network benchmark generator and analyzer:
//! RFC 2544, RFC 2889, RFC 6349, ITU-T Y.1564, ITU-T Y.1731, MEF 48/49
//! and IEEE 802.1Qbv TSN conformance tests over a pluggable raw-socket,
//! kernel-bypass or line-rate packet backend.

pub mod cli;
pub mod codec;
pub mod convergence;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod frame;
pub mod latency;
pub mod pacing;
pub mod platform;
pub mod platform_info;
pub mod results;
pub mod sequence;
pub mod trial;

pub use cli::Args;
pub use engine::{EngineConfig, EngineContext, EngineState, TestType};
pub use error::{EngineError, EngineResult};
pub use results::{EngineResults, TestResult};

/// The current version of the benchmark engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
