//! netbench -- benchmark orchestration harness for network performance targets.
//!
//! Drives iperf3 and ping against a target host, samples host CPU counters,
//! merges everything into uniform records, and scores them against fixed
//! throughput, latency, CPU and scaling targets.

pub mod analysis;
pub mod config;
pub mod error;
pub mod probes;
pub mod record;
pub mod report;
pub mod scenario;
pub mod system;
pub mod throughput;

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use config::BenchConfig;
use probes::PingProbe;
use report::{BenchmarkReport, RunMetadata};
use scenario::{RunConfiguration, RunStatus, ScenarioExecutor, ScenarioSettings};
use system::{HostSampler, ProcHostSampler};
use throughput::Iperf3Runner;

/// Run the selected scenarios with the real external tools and build the
/// report from whatever was collected, including on interrupt.
pub async fn run_benchmark(
    config: &BenchConfig,
    run: &RunConfiguration,
    shutdown: &CancellationToken,
) -> BenchmarkReport {
    let sampler = Arc::new(ProcHostSampler::new(&config.host.proc_root));
    let host = sampler.sample();

    let executor = ScenarioExecutor::new(
        Arc::new(Iperf3Runner::new(&config.iperf3)),
        Arc::new(PingProbe::new(&config.ping)),
        sampler,
        ScenarioSettings::from_config(config),
    );

    execute(executor, run, host, shutdown).await
}

/// Drive an already-assembled executor and build its report.
pub async fn execute(
    mut executor: ScenarioExecutor,
    run: &RunConfiguration,
    host: system::HostSample,
    shutdown: &CancellationToken,
) -> BenchmarkReport {
    let started_at = Utc::now();
    tracing::info!(
        target = %run.target,
        duration_secs = run.duration_secs,
        scenarios = ?run.scenarios,
        cpus = host.cpu_count,
        numa_nodes = host.numa_nodes,
        "benchmark run starting"
    );

    let status = executor.run(run, shutdown).await;
    if status == RunStatus::Interrupted {
        tracing::warn!(records = executor.records().len(), "benchmark run interrupted");
    }

    let metadata = RunMetadata::new(run, host, started_at, status);
    report::build(metadata, executor.records())
}
