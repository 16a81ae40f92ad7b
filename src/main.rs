use std::future::Future;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use netbench::config::{BenchConfig, LogFormat};
use netbench::report;
use netbench::scenario::{RunConfiguration, RunStatus, Scenario};
use netbench::throughput::validate_target;

#[derive(Parser)]
#[command(
    name = "netbench",
    about = "Network benchmark harness: throughput, latency and CPU against fixed targets",
    version,
    long_about = None
)]
struct Cli {
    /// Target host running an iperf3 server
    #[arg(long)]
    target: String,

    /// Seconds per test (default: 30 for the full suite, 10 for a subset)
    #[arg(long)]
    duration: Option<u64>,

    /// Write the JSON report to this path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Scenarios to run, comma-separated
    #[arg(long, value_enum, value_delimiter = ',', default_value = "all")]
    tests: Vec<TestChoice>,

    /// Configuration file (overrides NETBENCH_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Units launched by the concurrent scenario
    #[arg(long)]
    units: Option<u32>,

    /// Print the JSON report on stdout instead of the table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TestChoice {
    Throughput,
    Latency,
    #[value(name = "multi_az")]
    MultiAz,
    Concurrent,
    All,
}

/// Expand the selection in canonical order, without duplicates.
fn selected_scenarios(choices: &[TestChoice]) -> Vec<Scenario> {
    if choices.contains(&TestChoice::All) {
        return Scenario::ALL.to_vec();
    }
    Scenario::ALL
        .into_iter()
        .filter(|s| {
            choices.iter().any(|c| {
                matches!(
                    (c, s),
                    (TestChoice::Throughput, Scenario::Throughput)
                        | (TestChoice::Latency, Scenario::Latency)
                        | (TestChoice::MultiAz, Scenario::MultiAz)
                        | (TestChoice::Concurrent, Scenario::Concurrent)
                )
            })
        })
        .collect()
}

fn init_tracing(config: &BenchConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Cancel `token` on the first interrupt. Resolves to `true` once a second
/// interrupt arrives, `false` if the signal handler cannot be installed.
async fn wait_for_force_quit<F, Fut>(mut interrupt: F, token: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    tracing::warn!("interrupt received, stopping benchmark (interrupt again to force quit)");
    token.cancel();
    interrupt().await.is_ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BenchConfig::resolve(cli.config.as_deref())?;
    if let Some(units) = cli.units {
        config.scenarios.concurrent_units = units;
    }
    init_tracing(&config);

    validate_target(&cli.target).map_err(anyhow::Error::msg)?;

    let scenarios = selected_scenarios(&cli.tests);
    let run = RunConfiguration {
        target: cli.target,
        duration_secs: cli
            .duration
            .unwrap_or_else(|| RunConfiguration::default_duration(&scenarios)),
        scenarios,
        output: cli.output,
    };

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if wait_for_force_quit(tokio::signal::ctrl_c, token).await {
            tracing::error!("second interrupt, exiting without a report");
            std::process::exit(130);
        }
    });

    let report = netbench::run_benchmark(&config, &run, &shutdown).await;

    // A partial report is still written so collected records are not lost.
    if let Some(path) = &run.output {
        report.write_json(path)?;
    }

    if report.metadata.status == RunStatus::Interrupted {
        eprint!("{}", report::format_summary(&report));
        anyhow::bail!(
            "benchmark interrupted after {} record(s)",
            report.records.len()
        );
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report::format_summary(&report));
    }

    Ok(())
}
