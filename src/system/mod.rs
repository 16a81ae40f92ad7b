//! Host facts read from kernel pseudo-files.

pub mod host;

pub use host::{HostSample, HostSampler, ProcHostSampler};
