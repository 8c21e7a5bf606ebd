//! Command line runner for healthprobe probes.
//!
//! Loads probe definitions from YAML, runs each selected probe once and
//! reports the result through the process exit code:
//!
//! - `0`: every probe is healthy
//! - `1`: at least one probe is unhealthy
//! - `2`: a probe timed out and its health is unknown
//! - `3`: the configuration could not be loaded or is invalid
//!
//! Intended for cron jobs, container `exec` probes and CI pipelines.

pub mod app;
pub mod config;

pub use app::{AppError, Cli, Outcome, execute};
pub use config::{CheckSettings, Config, ConfigError, ProbeSettings};
