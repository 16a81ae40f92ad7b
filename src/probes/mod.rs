use std::time::Duration;

use serde::Serialize;

use crate::record::Metric;

pub mod icmp;

pub use icmp::PingProbe;

/// Round-trip summary of one probe run, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RttReading {
    Available { min_us: f64, avg_us: f64, max_us: f64 },
    /// The probe could not run or its summary line was missing.
    Unavailable,
}

impl RttReading {
    pub fn avg_us(&self) -> Metric {
        match self {
            RttReading::Available { avg_us, .. } => Metric::measured(*avg_us),
            RttReading::Unavailable => Metric::Unmeasured,
        }
    }

}

/// Probe parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeRequest {
    pub count: u32,
    pub interval: Duration,
}

impl Default for ProbeRequest {
    fn default() -> Self {
        Self {
            count: 100,
            interval: Duration::from_millis(100),
        }
    }
}

impl ProbeRequest {
    /// Time the probe is allowed to run: the full echo train plus slack.
    pub fn timeout(&self) -> Duration {
        self.interval
            .checked_mul(self.count)
            .unwrap_or(Duration::MAX)
            .saturating_add(Duration::from_secs(10))
    }
}

/// Trait for round-trip-time probes.
///
/// Probes never fail: anything that prevents a measurement is reported as
/// [`RttReading::Unavailable`].
#[async_trait::async_trait]
pub trait RttProber: Send + Sync {
    async fn probe(&self, target: &str, request: &ProbeRequest) -> RttReading;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_not_zero() {
        assert_eq!(RttReading::Unavailable.avg_us(), Metric::Unmeasured);
        let r = RttReading::Available {
            min_us: 0.0,
            avg_us: 0.0,
            max_us: 0.0,
        };
        assert_eq!(r.avg_us(), Metric::Measured(0.0));
    }

    #[test]
    fn test_default_timeout() {
        assert_eq!(ProbeRequest::default().timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_timeout_saturates_on_huge_interval() {
        let req = ProbeRequest {
            count: 100,
            interval: Duration::MAX,
        };
        assert_eq!(req.timeout(), Duration::MAX);
    }
}
