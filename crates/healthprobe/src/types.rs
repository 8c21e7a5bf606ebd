//! Probe, result and report types.

use crate::checkers::Check;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied by checks that bound their own I/O.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Detail attached to checks that had not settled when the probe deadline passed.
pub const PROBE_TIMEOUT_DETAIL: &str = "Probe timed out";

/// What a single check execution concluded.
///
/// Ordinary failure is an unhealthy outcome, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub healthy: bool,
    pub detail: Option<String>,
}

impl CheckOutcome {
    /// Create a healthy outcome
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            detail: None,
        }
    }

    /// Create an unhealthy outcome with a reason
    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: Some(detail.into()),
        }
    }
}

impl From<bool> for CheckOutcome {
    fn from(healthy: bool) -> Self {
        Self {
            healthy,
            detail: None,
        }
    }
}

/// Result of one check within one probe run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub healthy: bool,

    /// Failure details, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Time from dispatch until the check settled (or the probe gave up on it)
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl CheckResult {
    /// Build a result from what the check reported
    pub fn from_outcome(name: impl Into<String>, outcome: CheckOutcome, duration: Duration) -> Self {
        Self {
            name: name.into(),
            healthy: outcome.healthy,
            detail: outcome.detail,
            duration,
        }
    }

    /// Create a failed result for a check that faulted
    pub fn failed(name: impl Into<String>, detail: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            healthy: false,
            detail: Some(detail.into()),
            duration,
        }
    }

    /// Create the synthesized result for a check cut off by the probe deadline
    pub fn timed_out(name: impl Into<String>, duration: Duration) -> Self {
        Self::failed(name, PROBE_TIMEOUT_DETAIL, duration)
    }

    /// Check if the result is healthy
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.healthy { "healthy" } else { "unhealthy" };
        write!(f, "{}: {}", self.name, state)
    }
}

/// Immutable outcome of one probe run.
///
/// `results` follow the order of the probe's checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    probe: String,
    healthy: bool,
    allow_partial_failure: bool,
    results: Vec<CheckResult>,
}

impl Report {
    /// Build a report, aggregating the verdict from `results`.
    pub fn new(
        probe: impl Into<String>,
        results: Vec<CheckResult>,
        allow_partial_failure: bool,
    ) -> Self {
        let healthy = Self::aggregate(&results, allow_partial_failure);
        Self {
            probe: probe.into(),
            healthy,
            allow_partial_failure,
            results,
        }
    }

    /// All results must pass, or with `allow_partial_failure` at least one.
    ///
    /// An empty set is healthy under all-must-pass and unhealthy under
    /// any-must-pass.
    pub fn aggregate(results: &[CheckResult], allow_partial_failure: bool) -> bool {
        if allow_partial_failure {
            results.iter().any(CheckResult::is_healthy)
        } else {
            results.iter().all(CheckResult::is_healthy)
        }
    }

    pub fn probe_name(&self) -> &str {
        &self.probe
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn allow_partial_failure(&self) -> bool {
        self.allow_partial_failure
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    /// Result for the named check, if present
    pub fn result(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, result) in self.results.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{result}")?;
        }
        Ok(())
    }
}

/// A named, ordered set of checks plus its aggregation policy.
#[derive(Clone)]
pub struct Probe {
    name: String,
    checks: Vec<Arc<dyn Check>>,
    summary: Option<String>,
    allow_partial_failure: bool,
}

impl Probe {
    /// Create a probe that requires every check to pass
    pub fn new(name: impl Into<String>, checks: Vec<Arc<dyn Check>>) -> Self {
        Self {
            name: name.into(),
            checks,
            summary: None,
            allow_partial_failure: false,
        }
    }

    /// Set the display summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Treat the probe as healthy when at least one check passes
    pub fn allow_partial_failure(mut self, allow: bool) -> Self {
        self.allow_partial_failure = allow;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn allows_partial_failure(&self) -> bool {
        self.allow_partial_failure
    }

    /// The configured summary, or one derived from the name ("Readiness probe").
    pub fn endpoint_summary(&self) -> String {
        if let Some(summary) = self.summary.as_deref().filter(|s| !s.is_empty()) {
            return summary.to_string();
        }

        let lower = self.name.to_lowercase();
        let mut chars = lower.chars();
        let capitalized: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };

        let mut title = String::with_capacity(capitalized.len());
        let mut in_gap = false;
        for c in capitalized.chars() {
            if c.is_ascii_alphanumeric() {
                title.push(c);
                in_gap = false;
            } else if !in_gap {
                title.push(' ');
                in_gap = true;
            }
        }
        format!("{title} probe")
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.checks.iter().map(|c| c.name()).collect();
        f.debug_struct("Probe")
            .field("name", &self.name)
            .field("checks", &names)
            .field("summary", &self.summary)
            .field("allow_partial_failure", &self.allow_partial_failure)
            .finish()
    }
}

/// HTTP check configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlConfig {
    /// Target URL (http or https)
    pub url: String,

    /// Basic auth user
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Verify TLS certificates
    pub verify_ssl: bool,

    /// Follow redirects
    pub follow_redirects: bool,

    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Refuse loopback, private and reserved targets
    pub block_private_hosts: bool,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            verify_ssl: true,
            follow_redirects: true,
            timeout: DEFAULT_CHECK_TIMEOUT,
            block_private_hosts: false,
        }
    }
}

impl UrlConfig {
    /// Config for `url` with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// TCP connect check configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Hostname or IP address
    pub host: String,

    /// Port to connect to
    pub port: u16,

    /// Connect timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Refuse loopback, private and reserved targets
    #[serde(default)]
    pub block_private_hosts: bool,
}

impl TcpConfig {
    /// Config for `host:port` with default settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_CHECK_TIMEOUT,
            block_private_hosts: false,
        }
    }
}

fn default_timeout() -> Duration {
    DEFAULT_CHECK_TIMEOUT
}
