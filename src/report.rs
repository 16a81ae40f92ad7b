//! Final report assembly, JSON output and the stdout summary table.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::analysis::{self, ValidationOutcome};
use crate::record::{BenchmarkRecord, Metric};
use crate::scenario::{RunConfiguration, RunStatus, Scenario};
use crate::system::HostSample;

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub tool_version: String,
    pub target: String,
    pub duration_secs: u64,
    pub scenarios: Vec<Scenario>,
    pub host: HostSample,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
}

impl RunMetadata {
    pub fn new(
        run: &RunConfiguration,
        host: HostSample,
        started_at: DateTime<Utc>,
        status: RunStatus,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            target: run.target.clone(),
            duration_secs: run.duration_secs,
            scenarios: run.scenarios.clone(),
            host,
            started_at,
            finished_at: Utc::now(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub max_throughput_gbps: f64,
    pub min_latency_us: Option<f64>,
    pub avg_cpu_percent: f64,
    /// Records whose throughput was measured and above zero.
    pub records_with_throughput: usize,
    pub total_records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub metadata: RunMetadata,
    pub records: Vec<BenchmarkRecord>,
    pub validation: ValidationOutcome,
    pub summary: SummaryStats,
}

/// Assemble the report. Validation is recomputed from `records`.
pub fn build(metadata: RunMetadata, records: &[BenchmarkRecord]) -> BenchmarkReport {
    let validation = analysis::score(records);
    let summary = SummaryStats {
        max_throughput_gbps: validation.best_throughput_gbps,
        min_latency_us: validation.best_latency_us,
        avg_cpu_percent: validation.avg_cpu_percent,
        records_with_throughput: records
            .iter()
            .filter(|r| r.throughput_gbps.or_zero() > 0.0)
            .count(),
        total_records: records.len(),
    };

    BenchmarkReport {
        metadata,
        records: records.to_vec(),
        validation,
        summary,
    }
}

impl BenchmarkReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialise report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), records = self.records.len(), "report written");
        Ok(())
    }
}

fn format_throughput(gbps: Metric) -> String {
    match gbps {
        Metric::Measured(g) if g >= 1.0 => format!("{:.2} Gbps", g),
        Metric::Measured(g) => format!("{:.1} Mbps", g * 1000.0),
        Metric::Unmeasured => "n/a".to_string(),
    }
}

fn format_micros(us: Metric) -> String {
    match us {
        Metric::Measured(v) => format!("{:.1} us", v),
        Metric::Unmeasured => "n/a".to_string(),
    }
}

fn format_percent(pct: Metric) -> String {
    match pct {
        Metric::Measured(v) => format!("{:.1}%", v),
        Metric::Unmeasured => "n/a".to_string(),
    }
}

fn pass_fail(met: bool) -> &'static str {
    if met {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Human-readable report for stdout.
pub fn format_summary(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    let meta = &report.metadata;

    out.push_str(&format!(
        "\nnetbench {} -- target {} ({}s per test)\n",
        meta.tool_version, meta.target, meta.duration_secs
    ));
    out.push_str(&format!(
        "Host: {} CPUs, {} NUMA node{}\n\n",
        meta.host.cpu_count,
        meta.host.numa_nodes,
        if meta.host.numa_nodes == 1 { "" } else { "s" }
    ));

    out.push_str(&format!(
        "{:<24} | {:>12} | {:>10} | {:>10} | {:>6} | {:>4} | {:>4}\n",
        "Scenario", "Throughput", "Latency", "Jitter", "CPU", "Node", "Par"
    ));
    out.push_str(&format!(
        "{:-<24}-|-{:-<12}-|-{:-<10}-|-{:-<10}-|-{:-<6}-|-{:-<4}-|-{:-<4}\n",
        "", "", "", "", "", "", ""
    ));
    for r in &report.records {
        out.push_str(&format!(
            "{:<24} | {:>12} | {:>10} | {:>10} | {:>6} | {:>4} | {:>4}\n",
            r.scenario_name,
            format_throughput(r.throughput_gbps),
            format_micros(r.latency_us),
            format_micros(r.jitter_us),
            format_percent(r.cpu_usage_percent),
            r.node_index,
            r.parallelism,
        ));
    }

    let v = &report.validation;
    out.push_str("\n=== Validation ===\n");
    out.push_str(&format!(
        "Throughput  >= {:>5.1} Gbps : {} (best {:.2} Gbps)\n",
        v.targets.min_throughput_gbps,
        pass_fail(v.throughput_met),
        v.best_throughput_gbps
    ));
    out.push_str(&format!(
        "Latency     <= {:>5.1} us   : {} (best {})\n",
        v.targets.max_latency_us,
        pass_fail(v.latency_met),
        v.best_latency_us
            .map(|l| format!("{:.1} us", l))
            .unwrap_or_else(|| "never measured".to_string())
    ));
    out.push_str(&format!(
        "Avg CPU     <= {:>5.1} %    : {} ({:.1}%)\n",
        v.targets.max_avg_cpu_percent,
        pass_fail(v.cpu_efficient),
        v.avg_cpu_percent
    ));
    out.push_str(&format!(
        "Parallelism >= {:>5}        : {} (max {})\n",
        v.targets.min_parallelism,
        pass_fail(v.scaling_met),
        v.max_parallelism
    ));
    out.push_str(&format!("Overall score: {:.1}/1.0\n", v.overall_score));
    out.push_str(&format!(
        "{} of {} record(s) measured throughput\n",
        report.summary.records_with_throughput, report.summary.total_records
    ));

    out
}
