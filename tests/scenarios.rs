//! Scenario executor behaviour against stubbed external tools.

use std::sync::Arc;
use std::time::Duration;

use netbench::error::MeasureError;
use netbench::probes::{ProbeRequest, RttProber, RttReading};
use netbench::record::{Metric, RecordLog};
use netbench::scenario::{
    RunConfiguration, RunStatus, Scenario, ScenarioExecutor, ScenarioSettings,
};
use netbench::system::{HostSample, HostSampler};
use netbench::throughput::{Direction, Protocol, StreamOutput, StreamTester, TestRequest};
use tokio_util::sync::CancellationToken;

type Script = dyn Fn(&str, &TestRequest) -> Result<StreamOutput, MeasureError> + Send + Sync;

struct ScriptedTester {
    script: Box<Script>,
    hang_when: Option<fn(&str, &TestRequest) -> bool>,
}

impl ScriptedTester {
    fn new(
        script: impl Fn(&str, &TestRequest) -> Result<StreamOutput, MeasureError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            hang_when: None,
        }
    }

    /// Never return for requests matching `pred`.
    fn hanging_when(mut self, pred: fn(&str, &TestRequest) -> bool) -> Self {
        self.hang_when = Some(pred);
        self
    }
}

#[async_trait::async_trait]
impl StreamTester for ScriptedTester {
    async fn run(
        &self,
        target: &str,
        request: &TestRequest,
    ) -> Result<StreamOutput, MeasureError> {
        if self.hang_when.is_some_and(|hang| hang(target, request)) {
            std::future::pending::<()>().await;
        }
        (self.script)(target, request)
    }
}

struct FixedProber(RttReading);

#[async_trait::async_trait]
impl RttProber for FixedProber {
    async fn probe(&self, _target: &str, _request: &ProbeRequest) -> RttReading {
        self.0
    }
}

struct FixedSampler(HostSample);

impl HostSampler for FixedSampler {
    fn sample(&self) -> HostSample {
        self.0
    }
}

fn bps(bits_per_second: f64) -> Result<StreamOutput, MeasureError> {
    Ok(StreamOutput {
        bits_per_second: Some(bits_per_second),
        jitter_ms: None,
    })
}

fn timeout(request: &TestRequest) -> Result<StreamOutput, MeasureError> {
    Err(MeasureError::Timeout {
        tool: "iperf3".to_string(),
        after_secs: request.timeout.as_secs(),
    })
}

fn rtt(avg_us: f64) -> RttReading {
    RttReading::Available {
        min_us: avg_us * 0.8,
        avg_us,
        max_us: avg_us * 1.5,
    }
}

fn host(cpu: f64) -> HostSample {
    HostSample {
        cpu_count: 16,
        numa_nodes: 2,
        cpu_usage_percent: Metric::Measured(cpu),
    }
}

fn settings(units: u32) -> ScenarioSettings {
    ScenarioSettings {
        concurrent_units: units,
        ..ScenarioSettings::default()
    }
}

fn executor(
    tester: ScriptedTester,
    reading: RttReading,
    sample: HostSample,
    units: u32,
) -> ScenarioExecutor {
    ScenarioExecutor::new(
        Arc::new(tester),
        Arc::new(FixedProber(reading)),
        Arc::new(FixedSampler(sample)),
        settings(units),
    )
}

fn run_config(scenarios: Vec<Scenario>) -> RunConfiguration {
    RunConfiguration {
        target: "bench".to_string(),
        duration_secs: 8,
        scenarios,
        output: None,
    }
}

#[tokio::test]
async fn test_throughput_sums_forward_and_reverse() {
    let tester = ScriptedTester::new(|_, req| match req.direction {
        Direction::Forward => bps(10e9),
        Direction::Reverse => bps(5e9),
    });
    let exec = executor(tester, rtt(40.0), host(35.0), 32);

    let record = exec.throughput("bench", 8).await;
    assert_eq!(record.scenario_name, "throughput_test");
    assert_eq!(record.throughput_gbps, Metric::Measured(15.0));
    assert_eq!(record.latency_us, Metric::Measured(40.0));
    assert_eq!(record.cpu_usage_percent, Metric::Measured(35.0));
    assert_eq!(record.parallelism, 8);
}

#[tokio::test]
async fn test_throughput_keeps_surviving_direction() {
    let tester = ScriptedTester::new(|_, req| match req.direction {
        Direction::Forward => bps(9e9),
        Direction::Reverse => timeout(req),
    });
    let exec = executor(tester, rtt(40.0), host(35.0), 32);

    let record = exec.throughput("bench", 8).await;
    assert_eq!(record.throughput_gbps, Metric::Measured(9.0));
}

#[tokio::test]
async fn test_always_timing_out_still_yields_records() {
    let tester = ScriptedTester::new(|_, req| timeout(req));
    let mut exec = executor(tester, RttReading::Unavailable, HostSample::default(), 4);

    let status = exec
        .run(&run_config(Scenario::ALL.to_vec()), &CancellationToken::new())
        .await;
    assert_eq!(status, RunStatus::Completed);

    let records = exec.records();
    // throughput + latency + 3 endpoints + concurrent
    assert_eq!(records.len(), 6);
    for r in records {
        assert_eq!(r.throughput_gbps, Metric::Unmeasured);
        assert_eq!(r.throughput_gbps.or_zero(), 0.0);
        assert_eq!(r.latency_us, Metric::Unmeasured);
        assert_eq!(r.cpu_usage_percent, Metric::Unmeasured);
    }
    let names: Vec<_> = records.iter().map(|r| r.scenario_name.as_str()).collect();
    assert_eq!(
        names,
        [
            "throughput_test",
            "latency_test",
            "az_resilience_test_0",
            "az_resilience_test_1",
            "az_resilience_test_2",
            "concurrent_load_test",
        ]
    );
}

#[tokio::test]
async fn test_multi_endpoint_continues_past_failure() {
    let tester = ScriptedTester::new(|target, req| {
        if target.ends_with("-az1") {
            Err(MeasureError::ToolFailure {
                tool: "iperf3".to_string(),
                code: Some(1),
                detail: "unable to connect to server".to_string(),
            })
        } else {
            assert!(target.starts_with("bench-az"));
            assert_eq!(req.direction, Direction::Forward);
            bps(12e9)
        }
    });
    let exec = executor(tester, rtt(60.0), host(20.0), 32);

    let mut log = RecordLog::new();
    exec.multi_endpoint("bench", 8, &mut log).await;
    let records = log.records();
    assert_eq!(records.len(), 3);

    assert_eq!(records[0].throughput_gbps, Metric::Measured(12.0));
    assert_eq!(records[1].throughput_gbps.or_zero(), 0.0);
    assert!(!records[1].throughput_gbps.is_measured());
    assert_eq!(records[2].throughput_gbps, Metric::Measured(12.0));

    for (i, r) in records.iter().enumerate() {
        assert_eq!(r.node_index, i as u32);
        assert_eq!(r.scenario_name, format!("az_resilience_test_{}", i));
        assert_eq!(r.latency_us, Metric::Measured(60.0));
    }
}

#[tokio::test]
async fn test_latency_uses_probe_and_records_jitter() {
    let tester = ScriptedTester::new(|_, req| {
        assert_eq!(req.protocol, Protocol::Datagram);
        Ok(StreamOutput {
            bits_per_second: Some(1e6),
            jitter_ms: Some(0.5),
        })
    });
    let exec = executor(tester, rtt(3.0), host(10.0), 32);

    let record = exec.latency("bench", 8).await;
    assert_eq!(record.throughput_gbps, Metric::Unmeasured);
    assert_eq!(record.latency_us, Metric::Measured(3.0));
    assert_eq!(record.jitter_us, Metric::Measured(500.0));
    assert_eq!(record.latency_p99_us, Metric::Unmeasured);
    assert_eq!(record.parallelism, 1);
}

#[tokio::test]
async fn test_latency_falls_back_to_jitter_without_probe() {
    let tester = ScriptedTester::new(|_, _| {
        Ok(StreamOutput {
            bits_per_second: None,
            jitter_ms: Some(0.25),
        })
    });
    let exec = executor(tester, RttReading::Unavailable, host(10.0), 32);

    let record = exec.latency("bench", 8).await;
    assert_eq!(record.latency_us, Metric::Measured(250.0));
}

#[tokio::test]
async fn test_concurrent_aggregates_units() {
    let tester = ScriptedTester::new(|_, req| {
        assert_eq!(req.parallelism, 1);
        assert_eq!(req.duration_secs, 2);
        assert_eq!(req.timeout, Duration::from_secs(13));
        bps(2e9)
    });
    let exec = executor(tester, rtt(3.0), host(10.0), 4);

    let record = exec.concurrent("bench", 8).await;
    assert_eq!(record.scenario_name, "concurrent_load_test");
    assert_eq!(record.parallelism, 4);
    assert_eq!(record.throughput_gbps, Metric::Measured(8.0));
    assert_eq!(record.latency_us, Metric::Unmeasured);
}

#[tokio::test]
async fn test_record_invariants_hold_with_out_of_range_samples() {
    let tester = ScriptedTester::new(|_, _| bps(-5.0));
    let exec = executor(tester, rtt(3.0), host(150.0), 2);

    let mut log = RecordLog::new();
    for scenario in Scenario::ALL {
        exec.execute(scenario, "bench", 4, &mut log).await;
    }
    assert_eq!(log.len(), 6);
    for r in log.records() {
        assert!(r.throughput_gbps.or_zero() >= 0.0);
        let cpu = r.cpu_usage_percent.or_zero();
        assert!((0.0..=100.0).contains(&cpu), "cpu {} out of range", cpu);
    }
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let tester = ScriptedTester::new(|_, _| bps(1e9));
    let mut exec = executor(tester, rtt(3.0), host(10.0), 2);

    let token = CancellationToken::new();
    token.cancel();
    let status = exec.run(&run_config(Scenario::ALL.to_vec()), &token).await;

    assert_eq!(status, RunStatus::Interrupted);
    assert!(exec.records().is_empty());
}

#[tokio::test]
async fn test_interrupt_keeps_completed_records() {
    let tester = ScriptedTester::new(|_, _| bps(10e9))
        .hanging_when(|_, req| req.protocol == Protocol::Datagram);
    let mut exec = executor(tester, rtt(3.0), host(10.0), 2);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let scenarios = vec![Scenario::Throughput, Scenario::Latency, Scenario::Concurrent];
    let status = exec.run(&run_config(scenarios), &token).await;

    assert_eq!(status, RunStatus::Interrupted);
    let records = exec.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].scenario_name, "throughput_test");
    assert_eq!(records[0].throughput_gbps, Metric::Measured(20.0));
}

#[tokio::test]
async fn test_interrupt_mid_multi_endpoint_keeps_finished_endpoints() {
    let tester = ScriptedTester::new(|_, _| bps(10e9))
        .hanging_when(|target, _| target.ends_with("-az2"));
    let mut exec = executor(tester, rtt(3.0), host(10.0), 2);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let status = exec.run(&run_config(vec![Scenario::MultiAz]), &token).await;

    assert_eq!(status, RunStatus::Interrupted);
    let records = exec.records();
    assert_eq!(records.len(), 2);
    for (i, r) in records.iter().enumerate() {
        assert_eq!(r.scenario_name, format!("az_resilience_test_{}", i));
        assert_eq!(r.node_index, i as u32);
        assert_eq!(r.throughput_gbps, Metric::Measured(10.0));
    }
}

#[tokio::test]
async fn test_end_to_end_report_scores_full_marks() {
    let tester = ScriptedTester::new(|_, _| bps(1e9));
    let exec = executor(tester, rtt(3.0), host(50.0), 32);
    let run = run_config(vec![Scenario::Latency, Scenario::Concurrent]);

    let report = netbench::execute(exec, &run, host(50.0), &CancellationToken::new()).await;

    assert_eq!(report.metadata.status, RunStatus::Completed);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.validation.best_throughput_gbps, 32.0);
    assert_eq!(report.validation.best_latency_us, Some(3.0));
    assert_eq!(report.validation.overall_score, 1.0);
    assert_eq!(report.summary.records_with_throughput, 1);
}
