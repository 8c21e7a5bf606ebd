//! Framework-agnostic rendering of probe runs into HTTP responses.
//!
//! A [`ProbeEndpoint`] runs its probe with failure results on timeout and maps
//! the report to a status code, headers and an optional JSON body. Mounting the
//! result on a router is left to the embedding application.

use crate::runner::{CheckHooks, ProbeRunner};
use crate::types::{Probe, Report};
use common::Result;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builds the JSON body for a report. `None` means no body.
pub type ResponseHandler = Arc<dyn Fn(&Report) -> Option<Value> + Send + Sync>;

/// `{"status": "healthy"}` or `{"status": "unhealthy"}`
pub fn default_handler() -> ResponseHandler {
    Arc::new(|report: &Report| {
        let status = if report.is_healthy() { "healthy" } else { "unhealthy" };
        Some(json!({ "status": status }))
    })
}

/// Build the route path of `probe_name` under `prefix`.
///
/// ```
/// assert_eq!(healthprobe::response::route_path("/health/", "readiness"), "/health/readiness");
/// ```
pub fn route_path(prefix: &str, probe_name: &str) -> String {
    let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
    let name = probe_name.strip_prefix('/').unwrap_or(probe_name);
    format!("{prefix}/{name}")
}

/// Status, body and timeout settings shared by the endpoints of an application.
#[derive(Clone)]
pub struct EndpointOptions {
    pub success_status: StatusCode,
    pub failure_status: StatusCode,
    /// Return the full report when the probe is unhealthy
    pub debug: bool,
    pub timeout: Option<Duration>,
    pub success_handler: ResponseHandler,
    pub failure_handler: ResponseHandler,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            success_status: StatusCode::NO_CONTENT,
            failure_status: StatusCode::SERVICE_UNAVAILABLE,
            debug: false,
            timeout: None,
            success_handler: default_handler(),
            failure_handler: default_handler(),
        }
    }
}

impl std::fmt::Debug for EndpointOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointOptions")
            .field("success_status", &self.success_status)
            .field("failure_status", &self.failure_status)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A rendered probe response
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ProbeResponse {
    /// Parse the body as JSON, `None` when empty
    pub fn json(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }
}

/// One probe exposed as an HTTP endpoint.
pub struct ProbeEndpoint {
    probe: Probe,
    options: EndpointOptions,
    runner: ProbeRunner,
}

impl ProbeEndpoint {
    pub fn new(probe: Probe, options: EndpointOptions) -> Self {
        let mut runner = ProbeRunner::new().on_timeout_return_failure(true);
        if let Some(timeout) = options.timeout {
            runner = runner.with_timeout(timeout);
        }
        Self {
            probe,
            options,
            runner,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CheckHooks>) -> Self {
        self.runner = self.runner.with_hooks(hooks);
        self
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    /// Path this endpoint is served at under `prefix`
    pub fn route_path(&self, prefix: &str) -> String {
        route_path(prefix, self.probe.name())
    }

    /// Run the probe and render the response.
    ///
    /// Timeouts never fail here; only a failing hook does.
    pub async fn respond(&self) -> Result<ProbeResponse> {
        let report = self.runner.run(&self.probe).await?;
        self.render(&report)
    }

    /// Render an already computed report
    pub fn render(&self, report: &Report) -> Result<ProbeResponse> {
        let healthy = report.is_healthy();
        let status = if healthy {
            self.options.success_status
        } else {
            self.options.failure_status
        };

        let mut headers = HeaderMap::new();
        let mut body = Vec::new();
        if needs_content(status, healthy) {
            let content = if self.options.debug && !healthy {
                Some(serde_json::to_value(report)?)
            } else if healthy {
                (self.options.success_handler)(report)
            } else {
                (self.options.failure_handler)(report)
            };

            if let Some(content) = content {
                body = serde_json::to_vec(&content)?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
            }
        }

        debug!(
            probe = self.probe.name(),
            status = status.as_u16(),
            body_len = body.len(),
            "Rendered probe response"
        );
        Ok(ProbeResponse {
            status,
            headers,
            body,
        })
    }
}

fn needs_content(status: StatusCode, healthy: bool) -> bool {
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return false;
    }
    !(healthy && status.is_informational())
}
