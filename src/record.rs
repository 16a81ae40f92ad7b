//! Uniform benchmark record and the append-only log that owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A figure that was either measured or could not be obtained.
///
/// `Unmeasured` serialises as JSON `null` so consumers can tell "no data"
/// apart from a measured zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Measured(f64),
    #[default]
    Unmeasured,
}

impl Metric {
    /// Wrap a raw figure. Negative and non-finite values are treated as
    /// unmeasured, since no counter we read can legitimately produce them.
    pub fn measured(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            Metric::Measured(value)
        } else {
            Metric::Unmeasured
        }
    }

    pub fn from_option(value: Option<f64>) -> Self {
        value.map(Self::measured).unwrap_or(Metric::Unmeasured)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Measured(v) => Some(*v),
            Metric::Unmeasured => None,
        }
    }

    /// Legacy view where "not measured" reads as zero.
    pub fn or_zero(&self) -> f64 {
        self.value().unwrap_or(0.0)
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, Metric::Measured(_))
    }

    /// Sum two figures. Unmeasured contributes nothing; the result is only
    /// unmeasured when both sides are.
    pub fn combine(self, other: Metric) -> Metric {
        match (self, other) {
            (Metric::Measured(a), Metric::Measured(b)) => Metric::Measured(a + b),
            (Metric::Measured(a), Metric::Unmeasured) => Metric::Measured(a),
            (Metric::Unmeasured, Metric::Measured(b)) => Metric::Measured(b),
            (Metric::Unmeasured, Metric::Unmeasured) => Metric::Unmeasured,
        }
    }

    /// First measured figure of the two.
    pub fn or(self, fallback: Metric) -> Metric {
        if self.is_measured() {
            self
        } else {
            fallback
        }
    }
}

/// One measurement outcome.
///
/// Records are built once with the `with_*` methods and never mutated after
/// they are appended to a [`RecordLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub scenario_name: String,
    pub throughput_gbps: Metric,
    pub latency_us: Metric,
    pub latency_p99_us: Metric,
    pub jitter_us: Metric,
    pub cpu_usage_percent: Metric,
    /// Best-effort endpoint/topology tag, not a verified hardware mapping.
    pub node_index: u32,
    pub parallelism: u32,
    pub captured_at: DateTime<Utc>,
}

impl BenchmarkRecord {
    pub fn new(scenario_name: impl Into<String>, parallelism: u32) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            throughput_gbps: Metric::Unmeasured,
            latency_us: Metric::Unmeasured,
            latency_p99_us: Metric::Unmeasured,
            jitter_us: Metric::Unmeasured,
            cpu_usage_percent: Metric::Unmeasured,
            node_index: 0,
            parallelism,
            captured_at: Utc::now(),
        }
    }

    pub fn with_throughput(mut self, gbps: Metric) -> Self {
        self.throughput_gbps = gbps;
        self
    }

    pub fn with_latency(mut self, latency_us: Metric) -> Self {
        self.latency_us = latency_us;
        self
    }

    pub fn with_jitter(mut self, jitter_us: Metric) -> Self {
        self.jitter_us = jitter_us;
        self
    }

    /// CPU usage is clamped into [0, 100].
    pub fn with_cpu(mut self, cpu_percent: Metric) -> Self {
        self.cpu_usage_percent = match cpu_percent {
            Metric::Measured(v) => Metric::Measured(v.clamp(0.0, 100.0)),
            Metric::Unmeasured => Metric::Unmeasured,
        };
        self
    }

    pub fn with_node_index(mut self, node_index: u32) -> Self {
        self.node_index = node_index;
        self
    }
}

/// Ordered, append-only collection of records for one process run.
#[derive(Debug, Default)]
pub struct RecordLog {
    records: Vec<BenchmarkRecord>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: BenchmarkRecord) {
        tracing::debug!(
            scenario = %record.scenario_name,
            throughput_gbps = ?record.throughput_gbps.value(),
            latency_us = ?record.latency_us.value(),
            "record appended"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[BenchmarkRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
