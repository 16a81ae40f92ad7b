//! iperf3 process wrapper -- spawn, parse JSON output, enforce timeouts.

use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{validate_target, Direction, Protocol, StreamOutput, StreamTester, TestRequest};
use crate::config::Iperf3Config;
use crate::error::MeasureError;

const TOOL: &str = "iperf3";

/// Parsed iperf3 JSON result (subset of fields we care about).
///
/// Every field is optional: iperf3 omits sections depending on protocol and
/// on how far the test got before failing.
#[derive(Debug, Deserialize)]
pub struct Iperf3Report {
    pub start: Option<Iperf3Start>,
    pub end: Option<Iperf3End>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3Start {
    pub test_start: Option<Iperf3TestStart>,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3TestStart {
    pub protocol: Option<String>,
    pub num_streams: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3End {
    #[serde(default)]
    pub streams: Vec<Iperf3Stream>,
    pub sum_sent: Option<Iperf3Sum>,
    /// UDP runs report a single `sum` instead of sent/received.
    pub sum: Option<Iperf3Sum>,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3Stream {
    pub sender: Option<Iperf3Sum>,
    pub udp: Option<Iperf3Sum>,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3Sum {
    pub bits_per_second: Option<f64>,
    pub jitter_ms: Option<f64>,
}

/// Parse an iperf3 JSON output string into a structured result.
pub fn parse_output(json_str: &str) -> Result<Iperf3Report, MeasureError> {
    serde_json::from_str(json_str).map_err(|e| MeasureError::DecodeFailure {
        tool: TOOL.to_string(),
        reason: e.to_string(),
    })
}

impl Iperf3Report {
    /// Reduce the report to the figures a record needs.
    ///
    /// Throughput is the first stream's sender-side rate, not an average over
    /// all parallel streams. The end-of-test sums are used only when no
    /// per-stream section exists.
    pub fn extract(&self) -> Result<StreamOutput, MeasureError> {
        let end = self.end.as_ref().ok_or_else(|| MeasureError::DecodeFailure {
            tool: TOOL.to_string(),
            reason: "missing 'end' section".to_string(),
        })?;

        let first = end.streams.first();

        let bits_per_second = first
            .and_then(|s| s.sender.as_ref().or(s.udp.as_ref()))
            .and_then(|s| s.bits_per_second)
            .or_else(|| end.sum_sent.as_ref().and_then(|s| s.bits_per_second))
            .or_else(|| end.sum.as_ref().and_then(|s| s.bits_per_second));

        let jitter_ms = first
            .and_then(|s| s.udp.as_ref())
            .and_then(|u| u.jitter_ms)
            .or_else(|| end.sum.as_ref().and_then(|s| s.jitter_ms));

        if bits_per_second.is_none() && jitter_ms.is_none() {
            return Err(MeasureError::DecodeFailure {
                tool: TOOL.to_string(),
                reason: "no bits_per_second or jitter_ms in 'end' section".to_string(),
            });
        }

        Ok(StreamOutput {
            bits_per_second,
            jitter_ms,
        })
    }
}

/// Runs the real iperf3 binary in client mode.
#[derive(Debug, Clone)]
pub struct Iperf3Runner {
    path: String,
    pin_cores: Option<String>,
}

impl Iperf3Runner {
    pub fn new(config: &Iperf3Config) -> Self {
        Self {
            path: config.path.clone(),
            pin_cores: config.pin_cores.clone(),
        }
    }

    /// Client arguments for one request, excluding the binary itself.
    pub fn build_args(target: &str, request: &TestRequest) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            target.to_string(),
            "-t".to_string(),
            request.duration_secs.to_string(),
            "-J".to_string(),
            "-P".to_string(),
            request.parallelism.to_string(),
        ];
        if request.protocol == Protocol::Datagram {
            args.push("-u".to_string());
        }
        if request.direction == Direction::Reverse {
            args.push("-R".to_string());
        }
        args
    }

    fn command(&self, target: &str, request: &TestRequest) -> Command {
        let iperf_args = Self::build_args(target, request);
        let mut cmd = match &self.pin_cores {
            Some(cores) => {
                let mut cmd = Command::new("taskset");
                cmd.arg("-c").arg(cores).arg(&self.path);
                cmd
            }
            None => Command::new(&self.path),
        };
        cmd.args(&iperf_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl StreamTester for Iperf3Runner {
    async fn run(&self, target: &str, request: &TestRequest) -> Result<StreamOutput, MeasureError> {
        validate_target(target).map_err(|detail| MeasureError::ToolFailure {
            tool: TOOL.to_string(),
            code: None,
            detail,
        })?;

        debug!(
            %target,
            direction = ?request.direction,
            protocol = ?request.protocol,
            duration_secs = request.duration_secs,
            parallelism = request.parallelism,
            timeout_secs = request.timeout.as_secs(),
            "starting iperf3"
        );

        // Dropping the output future on timeout kills the child (kill_on_drop).
        let output = match tokio::time::timeout(
            request.timeout,
            self.command(target, request).output(),
        )
        .await
        {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                warn!(%target, error = %e, "failed to launch iperf3");
                return Err(MeasureError::ToolFailure {
                    tool: TOOL.to_string(),
                    code: None,
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    %target,
                    timeout_secs = request.timeout.as_secs(),
                    "iperf3 timed out, terminated"
                );
                return Err(MeasureError::Timeout {
                    tool: TOOL.to_string(),
                    after_secs: request.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            // With -J iperf3 reports its own error inside the JSON document.
            let detail = parse_output(&stdout)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| String::from_utf8_lossy(&output.stderr).trim().to_string());
            warn!(%target, code = ?output.status.code(), %detail, "iperf3 exited with failure");
            return Err(MeasureError::ToolFailure {
                tool: TOOL.to_string(),
                code: output.status.code(),
                detail,
            });
        }

        let result = parse_output(&stdout)?.extract()?;
        info!(
            %target,
            direction = ?request.direction,
            protocol = ?request.protocol,
            bits_per_second = ?result.bits_per_second,
            jitter_ms = ?result.jitter_ms,
            "iperf3 finished"
        );
        Ok(result)
    }
}
