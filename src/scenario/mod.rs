//! Scenario executor: composes stream tests, RTT probes and host samples into
//! benchmark records.
//!
//! A failing sub-test never aborts a scenario. The affected figure is left
//! unmeasured and the record is still appended.

pub mod load;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BenchConfig;
use crate::probes::{ProbeRequest, RttProber};
use crate::record::{BenchmarkRecord, Metric, RecordLog};
use crate::system::HostSampler;
use crate::throughput::{Direction, Protocol, StreamOutput, StreamTester, TestRequest};

pub use load::{LoadDriver, LoadOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Throughput,
    Latency,
    MultiAz,
    Concurrent,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Throughput,
        Scenario::Latency,
        Scenario::MultiAz,
        Scenario::Concurrent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Throughput => "throughput",
            Scenario::Latency => "latency",
            Scenario::MultiAz => "multi_az",
            Scenario::Concurrent => "concurrent",
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the operator asked for. Never mutated once built.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfiguration {
    pub target: String,
    pub duration_secs: u64,
    pub scenarios: Vec<Scenario>,
    pub output: Option<PathBuf>,
}

impl RunConfiguration {
    /// 30 seconds for the full suite, 10 for a subset.
    pub fn default_duration(scenarios: &[Scenario]) -> u64 {
        if Scenario::ALL.iter().all(|s| scenarios.contains(s)) {
            30
        } else {
            10
        }
    }
}

/// Tunables the executor needs, extracted from [`BenchConfig`].
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    pub standard_grace_secs: u64,
    pub unit_grace_secs: u64,
    pub throughput_streams: u32,
    pub multi_az_streams: u32,
    pub concurrent_units: u32,
    pub endpoint_suffixes: Vec<String>,
    pub probe: ProbeRequest,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self::from_config(&BenchConfig::default())
    }
}

impl ScenarioSettings {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            standard_grace_secs: config.iperf3.standard_grace_secs,
            unit_grace_secs: config.iperf3.unit_grace_secs,
            throughput_streams: config.scenarios.throughput_streams.max(1),
            multi_az_streams: config.scenarios.multi_az_streams.max(1),
            concurrent_units: config.scenarios.concurrent_units,
            endpoint_suffixes: config.scenarios.endpoint_suffixes.clone(),
            probe: ProbeRequest {
                count: config.ping.count.max(1),
                interval: Duration::try_from_secs_f64(config.ping.interval_secs.max(0.0))
                    .unwrap_or(Duration::MAX),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped by the shutdown token; records collected so far are intact.
    Interrupted,
}

pub struct ScenarioExecutor {
    tester: Arc<dyn StreamTester>,
    prober: Arc<dyn RttProber>,
    sampler: Arc<dyn HostSampler>,
    settings: ScenarioSettings,
    log: RecordLog,
}

impl ScenarioExecutor {
    pub fn new(
        tester: Arc<dyn StreamTester>,
        prober: Arc<dyn RttProber>,
        sampler: Arc<dyn HostSampler>,
        settings: ScenarioSettings,
    ) -> Self {
        Self {
            tester,
            prober,
            sampler,
            settings,
            log: RecordLog::new(),
        }
    }

    pub fn records(&self) -> &[BenchmarkRecord] {
        self.log.records()
    }

    /// Run every scenario in order, appending their records.
    ///
    /// Cancelling `shutdown` stops before the next scenario and drops the one
    /// in flight, which terminates its child processes. Records the dropped
    /// scenario already appended stay in the log.
    pub async fn run(
        &mut self,
        run: &RunConfiguration,
        shutdown: &CancellationToken,
    ) -> RunStatus {
        let mut log = std::mem::take(&mut self.log);
        let status = self.run_into(run, shutdown, &mut log).await;
        self.log = log;
        status
    }

    async fn run_into(
        &self,
        run: &RunConfiguration,
        shutdown: &CancellationToken,
        log: &mut RecordLog,
    ) -> RunStatus {
        for &scenario in &run.scenarios {
            if shutdown.is_cancelled() {
                return RunStatus::Interrupted;
            }

            info!(
                %scenario,
                target = %run.target,
                duration_secs = run.duration_secs,
                "starting scenario"
            );
            let before = log.len();
            let finished = tokio::select! {
                biased;
                _ = shutdown.cancelled() => false,
                _ = self.execute(scenario, &run.target, run.duration_secs, log) => true,
            };
            let appended = log.len() - before;

            if !finished {
                warn!(
                    %scenario,
                    kept = appended,
                    "scenario interrupted, unfinished sub-test discarded"
                );
                return RunStatus::Interrupted;
            }
            info!(%scenario, records = appended, "scenario finished");
        }
        RunStatus::Completed
    }

    /// Execute one scenario, appending each record to `log` as soon as its
    /// sub-test completes.
    pub async fn execute(
        &self,
        scenario: Scenario,
        target: &str,
        duration_secs: u64,
        log: &mut RecordLog,
    ) {
        match scenario {
            Scenario::Throughput => log.append(self.throughput(target, duration_secs).await),
            Scenario::Latency => log.append(self.latency(target, duration_secs).await),
            Scenario::MultiAz => self.multi_endpoint(target, duration_secs, log).await,
            Scenario::Concurrent => log.append(self.concurrent(target, duration_secs).await),
        }
    }

    /// Forward then reverse TCP test, throughput summed.
    pub async fn throughput(&self, target: &str, duration_secs: u64) -> BenchmarkRecord {
        let streams = self.settings.throughput_streams;
        let grace = self.settings.standard_grace_secs;

        let forward = self
            .stream_test(
                target,
                TestRequest::new(
                    Direction::Forward,
                    Protocol::Stream,
                    duration_secs,
                    streams,
                    grace,
                ),
            )
            .await
            .map(|o| o.throughput_gbps())
            .unwrap_or_default();
        let reverse = self
            .stream_test(
                target,
                TestRequest::new(
                    Direction::Reverse,
                    Protocol::Stream,
                    duration_secs,
                    streams,
                    grace,
                ),
            )
            .await
            .map(|o| o.throughput_gbps())
            .unwrap_or_default();

        let rtt = self.prober.probe(target, &self.settings.probe).await;
        let host = self.sampler.sample();

        BenchmarkRecord::new("throughput_test", streams)
            .with_throughput(forward.combine(reverse))
            .with_latency(rtt.avg_us())
            .with_cpu(host.cpu_usage_percent)
    }

    /// UDP test for jitter plus a dedicated RTT probe. Throughput is not
    /// measured here.
    pub async fn latency(&self, target: &str, duration_secs: u64) -> BenchmarkRecord {
        let jitter = self
            .stream_test(
                target,
                TestRequest::new(
                    Direction::Forward,
                    Protocol::Datagram,
                    duration_secs,
                    1,
                    self.settings.standard_grace_secs,
                ),
            )
            .await
            .map(|o| o.jitter_us())
            .unwrap_or_default();

        let rtt = self.prober.probe(target, &self.settings.probe).await;
        let host = self.sampler.sample();

        // Jitter stands in for latency only when the probe had nothing.
        BenchmarkRecord::new("latency_test", 1)
            .with_throughput(Metric::Unmeasured)
            .with_latency(rtt.avg_us().or(jitter))
            .with_jitter(jitter)
            .with_cpu(host.cpu_usage_percent)
    }

    /// One forward test + probe + sample per derived endpoint. Each endpoint's
    /// record is appended before the next endpoint starts.
    pub async fn multi_endpoint(&self, target: &str, duration_secs: u64, log: &mut RecordLog) {
        let streams = self.settings.multi_az_streams;

        for (index, suffix) in self.settings.endpoint_suffixes.iter().enumerate() {
            let endpoint = format!("{}{}", target, suffix);
            info!(%endpoint, index, "resilience endpoint");

            let throughput = self
                .stream_test(
                    &endpoint,
                    TestRequest::new(
                        Direction::Forward,
                        Protocol::Stream,
                        duration_secs,
                        streams,
                        self.settings.standard_grace_secs,
                    ),
                )
                .await
                .map(|o| o.throughput_gbps())
                .unwrap_or_default();
            let rtt = self.prober.probe(&endpoint, &self.settings.probe).await;
            let host = self.sampler.sample();

            log.append(
                BenchmarkRecord::new(format!("az_resilience_test_{}", index), streams)
                    .with_throughput(throughput)
                    .with_latency(rtt.avg_us())
                    .with_cpu(host.cpu_usage_percent)
                    .with_node_index(index as u32),
            );
        }
    }

    pub async fn concurrent(&self, target: &str, duration_secs: u64) -> BenchmarkRecord {
        let units = self.settings.concurrent_units;
        let driver = LoadDriver::new(Arc::clone(&self.tester), self.settings.unit_grace_secs);
        let outcome = driver.run(target, units, duration_secs).await;
        let host = self.sampler.sample();

        let throughput = if outcome.succeeded > 0 {
            Metric::measured(outcome.aggregate_gbps)
        } else {
            Metric::Unmeasured
        };

        BenchmarkRecord::new("concurrent_load_test", units)
            .with_throughput(throughput)
            .with_cpu(host.cpu_usage_percent)
    }

    async fn stream_test(&self, target: &str, request: TestRequest) -> Option<StreamOutput> {
        match self.tester.run(target, &request).await {
            Ok(out) => Some(out),
            Err(e) => {
                warn!(
                    %target,
                    direction = ?request.direction,
                    protocol = ?request.protocol,
                    kind = e.kind(),
                    error = %e,
                    "stream test degraded"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_duration_depends_on_selection() {
        assert_eq!(RunConfiguration::default_duration(&Scenario::ALL), 30);
        assert_eq!(RunConfiguration::default_duration(&[Scenario::Latency]), 10);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = BenchConfig::default();
        config.ping.count = 20;
        config.ping.interval_secs = 0.2;
        config.scenarios.throughput_streams = 0;

        let settings = ScenarioSettings::from_config(&config);
        assert_eq!(settings.probe.count, 20);
        assert_eq!(settings.probe.interval, Duration::from_millis(200));
        assert_eq!(settings.throughput_streams, 1);
        assert_eq!(settings.concurrent_units, 32);
        assert_eq!(settings.standard_grace_secs, 10);
        assert_eq!(settings.unit_grace_secs, 5);
    }

    #[test]
    fn test_huge_ping_interval_does_not_overflow() {
        let mut config = BenchConfig::default();
        config.ping.interval_secs = 1e300;

        let settings = ScenarioSettings::from_config(&config);
        assert_eq!(settings.probe.interval, Duration::MAX);
        assert_eq!(settings.probe.timeout(), Duration::MAX);
    }

    #[test]
    fn test_scenario_names() {
        let names: Vec<String> = Scenario::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["throughput", "latency", "multi_az", "concurrent"]);
    }
}
