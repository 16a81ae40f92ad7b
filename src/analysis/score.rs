use serde::{Deserialize, Serialize};

use crate::record::BenchmarkRecord;

/// Fixed performance targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    pub min_throughput_gbps: f64,
    pub max_latency_us: f64,
    pub max_avg_cpu_percent: f64,
    pub min_parallelism: u32,
}

pub const TARGETS: Targets = Targets {
    min_throughput_gbps: 20.0,
    max_latency_us: 5.0,
    max_avg_cpu_percent: 80.0,
    min_parallelism: 32,
};

// Weights in tenths so the total sums exactly to 1.0.
const THROUGHPUT_WEIGHT: u32 = 4;
const LATENCY_WEIGHT: u32 = 3;
const CPU_WEIGHT: u32 = 2;
const SCALING_WEIGHT: u32 = 1;

/// Aggregate comparison of a record set against [`TARGETS`].
///
/// Derived fresh on every call, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub targets: Targets,
    /// Max throughput over all records (0 when empty).
    pub best_throughput_gbps: f64,
    /// Min latency over records with a latency above zero; `None` when no
    /// record qualifies.
    pub best_latency_us: Option<f64>,
    /// Mean CPU over all records, unmeasured counted as 0 (0 when empty).
    pub avg_cpu_percent: f64,
    pub max_parallelism: u32,
    pub throughput_met: bool,
    pub latency_met: bool,
    pub cpu_efficient: bool,
    pub scaling_met: bool,
    /// Weighted score in [0, 1].
    pub overall_score: f64,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        self.throughput_met && self.latency_met && self.cpu_efficient && self.scaling_met
    }
}

/// Score records against the fixed targets.
pub fn score(records: &[BenchmarkRecord]) -> ValidationOutcome {
    let best_throughput_gbps = records
        .iter()
        .map(|r| r.throughput_gbps.or_zero())
        .fold(0.0_f64, f64::max);

    let best_latency_us = records
        .iter()
        .filter_map(|r| r.latency_us.value())
        .filter(|&l| l > 0.0)
        .fold(None, |best: Option<f64>, l| {
            Some(best.map_or(l, |b| b.min(l)))
        });

    let avg_cpu_percent = if records.is_empty() {
        0.0
    } else {
        records
            .iter()
            .map(|r| r.cpu_usage_percent.or_zero())
            .sum::<f64>()
            / records.len() as f64
    };

    let max_parallelism = records.iter().map(|r| r.parallelism).max().unwrap_or(0);

    let throughput_met = best_throughput_gbps >= TARGETS.min_throughput_gbps;
    let latency_met = best_latency_us
        .map(|l| l <= TARGETS.max_latency_us)
        .unwrap_or(false);
    let cpu_efficient = avg_cpu_percent <= TARGETS.max_avg_cpu_percent;
    let scaling_met = max_parallelism >= TARGETS.min_parallelism;

    let tenths = [
        (throughput_met, THROUGHPUT_WEIGHT),
        (latency_met, LATENCY_WEIGHT),
        (cpu_efficient, CPU_WEIGHT),
        (scaling_met, SCALING_WEIGHT),
    ]
    .iter()
    .filter(|(met, _)| *met)
    .map(|(_, w)| w)
    .sum::<u32>();

    ValidationOutcome {
        targets: TARGETS,
        best_throughput_gbps,
        best_latency_us,
        avg_cpu_percent,
        max_parallelism,
        throughput_met,
        latency_met,
        cpu_efficient,
        scaling_met,
        overall_score: tenths as f64 / 10.0,
    }
}
