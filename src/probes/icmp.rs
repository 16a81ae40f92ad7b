use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use super::{ProbeRequest, RttProber, RttReading};
use crate::config::PingConfig;
use crate::error::MeasureError;
use crate::throughput::validate_target;

/// ICMP echo probe wrapping the system `ping`.
#[derive(Debug, Clone)]
pub struct PingProbe {
    path: String,
}

impl PingProbe {
    pub fn new(config: &PingConfig) -> Self {
        Self {
            path: config.path.clone(),
        }
    }

    async fn run_ping(&self, target: &str, request: &ProbeRequest) -> Result<String, MeasureError> {
        validate_target(target).map_err(|detail| MeasureError::ToolFailure {
            tool: "ping".to_string(),
            code: None,
            detail,
        })?;

        let timeout = request.timeout();
        let output = Command::new(&self.path)
            .arg("-c")
            .arg(request.count.to_string())
            .arg("-i")
            .arg(format!("{:.3}", request.interval.as_secs_f64()))
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, output).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(MeasureError::ToolFailure {
                    tool: "ping".to_string(),
                    code: None,
                    detail: e.to_string(),
                })
            }
            Err(_) => {
                return Err(MeasureError::Timeout {
                    tool: "ping".to_string(),
                    after_secs: timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(MeasureError::ToolFailure {
                tool: "ping".to_string(),
                code: output.status.code(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl RttProber for PingProbe {
    async fn probe(&self, target: &str, request: &ProbeRequest) -> RttReading {
        let stdout = match self.run_ping(target, request).await {
            Ok(s) => s,
            Err(e) => {
                warn!(%target, kind = e.kind(), error = %e, "rtt probe unavailable");
                return RttReading::Unavailable;
            }
        };

        match parse_rtt_summary(&stdout) {
            Some(reading) => {
                debug!(%target, ?reading, "rtt probe finished");
                reading
            }
            None => {
                warn!(%target, "ping succeeded but no rtt summary line found");
                RttReading::Unavailable
            }
        }
    }
}

/// Parse the summary line printed at the end of a ping run.
///
/// Linux: `rtt min/avg/max/mdev = 0.041/0.052/0.077/0.008 ms`
/// BSD/macOS: `round-trip min/avg/max/stddev = 0.041/0.052/0.077/0.008 ms`
///
/// Values are converted from milliseconds to microseconds.
pub fn parse_rtt_summary(output: &str) -> Option<RttReading> {
    let line = output.lines().find(|l| {
        let l = l.trim_start();
        (l.starts_with("rtt ") || l.starts_with("round-trip ")) && l.contains(" = ")
    })?;

    let (_, rest) = line.split_once(" = ")?;
    let values = rest.split_whitespace().next()?;
    let mut parts = values.split('/').map(|p| p.parse::<f64>().ok());

    let min_ms = parts.next()??;
    let avg_ms = parts.next()??;
    let max_ms = parts.next()??;

    Some(RttReading::Available {
        min_us: min_ms * 1000.0,
        avg_us: avg_ms * 1000.0,
        max_us: max_ms * 1000.0,
    })
}
