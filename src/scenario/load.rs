//! Concurrent load driver: N independent single-stream units, summed.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::throughput::{Direction, Protocol, StreamTester, TestRequest};

/// Result of one concurrent load run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadOutcome {
    /// Sum over the units that reported a throughput. Never an average.
    pub aggregate_gbps: f64,
    pub launched: u32,
    pub succeeded: u32,
    /// Individual contributions, in completion order.
    pub unit_gbps: Vec<f64>,
}

#[derive(Debug)]
struct UnitReport {
    unit: u32,
    gbps: Option<f64>,
}

pub struct LoadDriver {
    tester: Arc<dyn StreamTester>,
    grace_secs: u64,
}

impl LoadDriver {
    pub fn new(tester: Arc<dyn StreamTester>, grace_secs: u64) -> Self {
        Self { tester, grace_secs }
    }

    /// Launch `unit_count` forward single-stream tests against `target` and
    /// wait for all of them.
    ///
    /// Each unit runs for a quarter of `duration_secs` (at least one second)
    /// and is killed after `duration_secs + grace`. Units report over a
    /// channel to this task, which is the only place results are gathered.
    /// Dropping the returned future aborts every unit and its child process.
    pub async fn run(&self, target: &str, unit_count: u32, duration_secs: u64) -> LoadOutcome {
        let unit_duration = (duration_secs / 4).max(1);
        let timeout = Duration::from_secs(duration_secs.saturating_add(self.grace_secs));

        info!(
            %target,
            units = unit_count,
            unit_duration_secs = unit_duration,
            timeout_secs = timeout.as_secs(),
            "launching concurrent load units"
        );

        let (tx, mut rx) = mpsc::channel::<UnitReport>(unit_count.max(1) as usize);
        let mut units = JoinSet::new();

        for unit in 0..unit_count {
            let tester = Arc::clone(&self.tester);
            let tx = tx.clone();
            let target = target.to_string();
            let request = TestRequest::new(
                Direction::Forward,
                Protocol::Stream,
                unit_duration,
                1,
                0,
            )
            .with_timeout(timeout);

            units.spawn(async move {
                let gbps = match tester.run(&target, &request).await {
                    Ok(out) => {
                        let gbps = out.throughput_gbps().value();
                        if gbps.is_none() {
                            warn!(unit, "load unit reported no throughput");
                        }
                        gbps
                    }
                    Err(e) => {
                        warn!(unit, kind = e.kind(), error = %e, "load unit failed");
                        None
                    }
                };
                // The collector only goes away if the driver itself was dropped.
                let _ = tx.send(UnitReport { unit, gbps }).await;
            });
        }
        drop(tx);

        let mut unit_gbps = Vec::with_capacity(unit_count as usize);
        while let Some(report) = rx.recv().await {
            debug!(unit = report.unit, gbps = ?report.gbps, "load unit finished");
            if let Some(gbps) = report.gbps {
                unit_gbps.push(gbps);
            }
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "load unit task did not complete");
            }
        }

        let aggregate_gbps: f64 = unit_gbps.iter().sum();
        let outcome = LoadOutcome {
            aggregate_gbps,
            launched: unit_count,
            succeeded: unit_gbps.len() as u32,
            unit_gbps,
        };
        info!(
            aggregate_gbps = outcome.aggregate_gbps,
            succeeded = outcome.succeeded,
            launched = outcome.launched,
            "concurrent load complete"
        );
        outcome
    }
}
