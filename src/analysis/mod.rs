//! Scoring of collected records against performance targets.

pub mod score;

pub use score::{score, Targets, ValidationOutcome, TARGETS};
