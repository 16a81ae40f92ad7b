//! Stream-test engine: request model, tester trait, and the iperf3 runner.

pub mod iperf;

use std::time::Duration;

use serde::Serialize;

use crate::error::MeasureError;
use crate::record::Metric;

pub use iperf::Iperf3Runner;

/// Which side sends the bulk data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Client sends to the target.
    Forward,
    /// Target sends to the client (`-R`).
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// TCP.
    Stream,
    /// UDP (`-u`).
    Datagram,
}

/// One stream-test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRequest {
    pub direction: Direction,
    pub protocol: Protocol,
    pub duration_secs: u64,
    pub parallelism: u32,
    /// Wall-clock budget after which the tool is killed.
    pub timeout: Duration,
}

impl TestRequest {
    /// Build a request whose timeout is `duration + grace`.
    pub fn new(
        direction: Direction,
        protocol: Protocol,
        duration_secs: u64,
        parallelism: u32,
        grace_secs: u64,
    ) -> Self {
        Self {
            direction,
            protocol,
            duration_secs,
            parallelism: parallelism.max(1),
            timeout: Duration::from_secs(duration_secs.saturating_add(grace_secs)),
        }
    }

    /// Override the timeout, keeping everything else.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Figures extracted from one stream test.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StreamOutput {
    /// Sender-side bits per second of the first reported stream.
    pub bits_per_second: Option<f64>,
    /// Datagram jitter, only present in UDP runs.
    pub jitter_ms: Option<f64>,
}

impl StreamOutput {
    pub fn throughput_gbps(&self) -> Metric {
        Metric::from_option(self.bits_per_second.map(bps_to_gbps))
    }

    pub fn jitter_us(&self) -> Metric {
        Metric::from_option(self.jitter_ms.map(|ms| ms * 1000.0))
    }
}

/// Anything that can run a stream test against a target.
#[async_trait::async_trait]
pub trait StreamTester: Send + Sync {
    async fn run(&self, target: &str, request: &TestRequest) -> Result<StreamOutput, MeasureError>;
}

pub fn bps_to_gbps(bps: f64) -> f64 {
    bps / 1_000_000_000.0
}

/// Reject targets that could be mistaken for flags or carry shell noise.
pub fn validate_target(target: &str) -> Result<(), String> {
    if target.is_empty() {
        return Err("target cannot be empty".to_string());
    }
    if target.starts_with('-') {
        return Err("target cannot start with a hyphen".to_string());
    }
    // Alphanumeric, dot, hyphen, colon (IPv6)
    if target
        .chars()
        .any(|c| !c.is_alphanumeric() && c != '.' && c != '-' && c != ':')
    {
        return Err(format!("target '{}' contains invalid characters", target));
    }
    Ok(())
}
