//! Async health probes for services and their dependencies.
//!
//! A [`Probe`] groups named checks (liveness, readiness, startup, ...). The
//! [`ProbeRunner`] executes all checks of a probe concurrently and folds their
//! outcomes into a [`Report`]:
//! - every check runs on its own task, so a fault or panic in one check
//!   only marks that check unhealthy
//! - results keep the order the checks were declared in
//! - a single deadline bounds the whole run, after which unsettled checks are
//!   aborted and either reported as timed out or surfaced as an error
//!
//! # Checks
//!
//! - [`FunctionCheck`]: wraps an async or blocking closure
//! - [`UrlCheck`]: HTTP GET with optional basic auth and SSRF protection
//! - [`TcpCheck`]: TCP connect with optional SSRF protection
//!
//! Checks holding a connection (such as [`UrlCheck`]) create it on first use
//! and keep it until [`close_probes`] is called at shutdown.
//!
//! # Example
//!
//! ```no_run
//! use healthprobe::{FunctionCheck, Probe, ProbeRunner, UrlCheck, UrlConfig, close_probes};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut api = UrlConfig::new("https://api.internal.example.com/health");
//! api.block_private_hosts = true;
//!
//! let probe = Probe::new(
//!     "readiness",
//!     vec![
//!         Arc::new(UrlCheck::new("API", api)?),
//!         Arc::new(FunctionCheck::new("Cache warm", || async { Ok(true) })),
//!     ],
//! );
//!
//! let runner = ProbeRunner::new()
//!     .with_timeout(Duration::from_secs(2))
//!     .on_timeout_return_failure(true);
//! let report = runner.run(&probe).await?;
//! println!("{report}");
//!
//! close_probes([&probe]).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod checkers;
pub mod dsn;
pub mod response;
pub mod runner;
pub mod ssrf;
pub mod types;

pub use checkers::{Check, FunctionCheck, TcpCheck, UrlCheck};
pub use common::{Error, Result};
pub use response::{EndpointOptions, ProbeEndpoint, ProbeResponse, route_path};
pub use runner::{CheckHooks, ProbeRunner, close_probes, run_probe};
pub use types::{CheckOutcome, CheckResult, Probe, Report, TcpConfig, UrlConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn result(name: &str, healthy: bool) -> CheckResult {
        CheckResult::from_outcome(name, CheckOutcome::from(healthy), Duration::from_millis(1))
    }

    #[test]
    fn test_aggregate_all_must_pass() {
        assert!(Report::aggregate(&[], false));
        assert!(Report::aggregate(&[result("a", true)], false));
        assert!(!Report::aggregate(&[result("a", false)], false));
        assert!(!Report::aggregate(&[result("a", true), result("b", false)], false));
    }

    #[test]
    fn test_aggregate_partial_failure() {
        assert!(!Report::aggregate(&[], true));
        assert!(Report::aggregate(&[result("a", true)], true));
        assert!(!Report::aggregate(&[result("a", false)], true));
        assert!(Report::aggregate(&[result("a", false), result("b", true)], true));
    }

    #[test]
    fn test_report_display() {
        let report = Report::new("liveness", vec![result("db", true), result("cache", false)], false);
        assert_eq!(report.to_string(), "db: healthy\ncache: unhealthy");
        assert!(!report.is_healthy());
        assert!(report.result("cache").is_some());
        assert!(report.result("queue").is_none());
    }

    #[test]
    fn test_report_serializes_results() {
        let report = Report::new("startup", vec![result("db", false)], true);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["probe"], "startup");
        assert_eq!(value["allow_partial_failure"], true);
        assert_eq!(value["results"][0]["healthy"], false);
        assert_eq!(value["results"][0]["duration"], "1ms");
    }

    #[test]
    fn test_endpoint_summary() {
        let probe = Probe::new("readiness", vec![]);
        assert_eq!(probe.endpoint_summary(), "Readiness probe");

        let probe = Probe::new("deep_health-check", vec![]);
        assert_eq!(probe.endpoint_summary(), "Deep health check probe");

        let probe = Probe::new("liveness", vec![]).with_summary("Is the process alive");
        assert_eq!(probe.endpoint_summary(), "Is the process alive");
    }

    #[test]
    fn test_probe_debug_lists_check_names() {
        let check: Arc<dyn Check> = Arc::new(FunctionCheck::new("db", || async { Ok(true) }));
        let probe = Probe::new("readiness", vec![check]).allow_partial_failure(true);

        let debug = format!("{probe:?}");
        assert!(debug.contains("readiness"));
        assert!(debug.contains("db"));
        assert!(probe.allows_partial_failure());
    }
}
