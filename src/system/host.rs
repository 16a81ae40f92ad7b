use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::MeasureError;
use crate::record::Metric;

/// Host counters captured at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HostSample {
    /// Logical processors, 0 when unreadable.
    pub cpu_count: usize,
    /// Memory-topology (NUMA) nodes, 0 when unreadable.
    pub numa_nodes: usize,
    pub cpu_usage_percent: Metric,
}

/// Best-effort host sampler. Implementations never fail.
pub trait HostSampler: Send + Sync {
    fn sample(&self) -> HostSample;
}

/// Reads `/proc/cpuinfo`, `/proc/buddyinfo` and `/proc/stat` under `root`.
#[derive(Debug, Clone)]
pub struct ProcHostSampler {
    root: PathBuf,
}

impl Default for ProcHostSampler {
    fn default() -> Self {
        Self::new("/")
    }
}

impl ProcHostSampler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, rel: &str) -> Result<String, MeasureError> {
        let path = self.root.join(rel);
        fs::read_to_string(&path).map_err(|e| unavailable(&path, e.to_string()))
    }

    pub fn cpu_count(&self) -> Result<usize, MeasureError> {
        let cpuinfo = self.read("proc/cpuinfo")?;
        match parse_cpu_count(&cpuinfo) {
            0 => Err(unavailable(
                &self.root.join("proc/cpuinfo"),
                "no processor entries".to_string(),
            )),
            n => Ok(n),
        }
    }

    pub fn numa_nodes(&self) -> Result<usize, MeasureError> {
        let buddyinfo = self.read("proc/buddyinfo")?;
        Ok(parse_numa_nodes(&buddyinfo))
    }

    pub fn cpu_usage_percent(&self) -> Result<f64, MeasureError> {
        let stat = self.read("proc/stat")?;
        parse_cpu_busy_percent(&stat).ok_or_else(|| {
            unavailable(
                &self.root.join("proc/stat"),
                "no aggregate cpu line".to_string(),
            )
        })
    }
}

impl HostSampler for ProcHostSampler {
    fn sample(&self) -> HostSample {
        let cpu_count = self.cpu_count().unwrap_or_else(|e| {
            warn!(error = %e, "cpu count unavailable, falling back to available_parallelism");
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(0)
        });

        let numa_nodes = self.numa_nodes().unwrap_or_else(|e| {
            warn!(error = %e, "numa node count unavailable");
            0
        });

        let cpu_usage_percent = match self.cpu_usage_percent() {
            Ok(pct) => Metric::measured(pct),
            Err(e) => {
                warn!(error = %e, "cpu usage unavailable");
                Metric::Unmeasured
            }
        };

        let sample = HostSample {
            cpu_count,
            numa_nodes,
            cpu_usage_percent,
        };
        debug!(?sample, "host sample");
        sample
    }
}

fn unavailable(path: &Path, reason: String) -> MeasureError {
    MeasureError::MetricUnavailable {
        counter: path.display().to_string(),
        reason,
    }
}

/// Count `processor : N` entries.
pub fn parse_cpu_count(cpuinfo: &str) -> usize {
    cpuinfo
        .lines()
        .filter(|l| {
            l.split_once(':')
                .map(|(key, _)| key.trim() == "processor")
                .unwrap_or(false)
        })
        .count()
}

/// Count distinct `Node N,` prefixes in buddyinfo.
///
/// `Node 0, zone   Normal   1024  512 ...`
pub fn parse_numa_nodes(buddyinfo: &str) -> usize {
    buddyinfo
        .lines()
        .filter_map(|l| l.trim_start().strip_prefix("Node "))
        .filter_map(|rest| rest.split(',').next())
        .filter_map(|id| id.trim().parse::<u32>().ok())
        .collect::<BTreeSet<_>>()
        .len()
}

/// CPU busy percentage from the aggregate `cpu` line of `/proc/stat`.
///
/// `100 * (1 - idle / total)` over the since-boot tick counters, read once.
/// This is an instantaneous approximation, not a windowed measurement.
/// Idle includes iowait; total covers user..steal (guest time is already
/// folded into user).
pub fn parse_cpu_busy_percent(stat: &str) -> Option<f64> {
    let line = stat
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))?;

    let ticks: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|v| v.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    if ticks.len() < 4 {
        return None;
    }

    let idle = ticks[3] + ticks.get(4).copied().unwrap_or(0);
    let total: u64 = ticks.iter().sum();
    if total == 0 {
        return None;
    }

    let busy = 1.0 - (idle as f64 / total as f64);
    Some((busy * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "\
processor\t: 0
model name\t: AMD EPYC 7763
flags\t\t: fpu vme de pse

processor\t: 1
model name\t: AMD EPYC 7763

processor\t: 2

processor\t: 3
";

    const BUDDYINFO: &str = "\
Node 0, zone      DMA      0      0      0      0      0      0      0      0      1      1      3
Node 0, zone    DMA32      5      4      5      6      4      6      6      5      6      5    480
Node 0, zone   Normal   2071   1483    930    540    280    120     52     21     10      4  30012
Node 1, zone   Normal   1877   1210    860    502    251    110     48     20      9      3  30211
";

    const STAT: &str = "\
cpu  600 0 200 800 200 0 200 0 0 0
cpu0 300 0 100 400 100 0 100 0 0 0
intr 123456
";

    #[test]
    fn test_parse_cpu_count() {
        assert_eq!(parse_cpu_count(CPUINFO), 4);
        assert_eq!(parse_cpu_count(""), 0);
    }

    #[test]
    fn test_parse_numa_nodes() {
        assert_eq!(parse_numa_nodes(BUDDYINFO), 2);
        assert_eq!(parse_numa_nodes("garbage\n"), 0);
    }

    #[test]
    fn test_parse_cpu_busy_percent() {
        // total 2000, idle 800 + iowait 200 -> 50% busy
        let pct = parse_cpu_busy_percent(STAT).unwrap();
        assert!((pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_cpu_busy_rejects_bad_lines() {
        assert!(parse_cpu_busy_percent("cpu0 1 2 3 4\n").is_none());
        assert!(parse_cpu_busy_percent("cpu  0 0 0 0 0 0 0 0\n").is_none());
        assert!(parse_cpu_busy_percent("cpu  a b c d\n").is_none());
    }

    fn write_proc(dir: &Path, name: &str, content: &str) {
        let proc_dir = dir.join("proc");
        fs::create_dir_all(&proc_dir).unwrap();
        fs::write(proc_dir.join(name), content).unwrap();
    }

    #[test]
    fn test_sample_from_fixture_root() {
        let dir = tempfile::TempDir::new().unwrap();
        write_proc(dir.path(), "cpuinfo", CPUINFO);
        write_proc(dir.path(), "buddyinfo", BUDDYINFO);
        write_proc(dir.path(), "stat", STAT);

        let sample = ProcHostSampler::new(dir.path()).sample();
        assert_eq!(sample.cpu_count, 4);
        assert_eq!(sample.numa_nodes, 2);
        assert_eq!(sample.cpu_usage_percent, Metric::Measured(50.0));
    }

    #[test]
    fn test_sample_degrades_when_counters_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let sampler = ProcHostSampler::new(dir.path());

        assert!(matches!(
            sampler.cpu_usage_percent(),
            Err(MeasureError::MetricUnavailable { .. })
        ));

        let sample = sampler.sample();
        assert_eq!(sample.numa_nodes, 0);
        assert_eq!(sample.cpu_usage_percent, Metric::Unmeasured);
    }
}
