//! Probe execution.
//!
//! All checks of a probe are spawned at once onto a [`JoinSet`]. The runner
//! then collects results as they settle. Only the wait for the next settled
//! task is bounded by the probe-level deadline; a result is recorded as soon
//! as its task settles, before any hook runs. When the deadline passes every
//! outstanding task is aborted and awaited before the runner returns, so no
//! check work outlives a run.

use crate::types::{CheckOutcome, CheckResult, Probe, Report};
use async_trait::async_trait;
use common::logging::{LogFields, ProbeLogger, emit_probe_event, probe_logger};
use common::{Error, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::timeout_at;
use tracing::{Level, debug, info, warn};

type CheckTaskOutput = (anyhow::Result<CheckOutcome>, Duration);

/// Observability hooks invoked around each check.
///
/// Hooks are awaited inline and are not bounded by the probe timeout, so a
/// slow hook delays the report. An error from a hook aborts the run.
#[async_trait]
pub trait CheckHooks: Send + Sync {
    /// Called right before the check at `index` is dispatched, in dispatch order.
    async fn on_check_start(&self, _probe: &str, _check: &str, _index: usize) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called right after the check at `index` settles, in completion order.
    ///
    /// Also called for results synthesized when the probe times out.
    async fn on_check_end(
        &self,
        _probe: &str,
        _check: &str,
        _index: usize,
        _result: &CheckResult,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs probes under a shared time budget.
#[derive(Clone, Default)]
pub struct ProbeRunner {
    timeout: Option<Duration>,
    on_timeout_return_failure: bool,
    hooks: Option<Arc<dyn CheckHooks>>,
    logger: Option<Arc<dyn ProbeLogger>>,
}

impl ProbeRunner {
    /// Create an unbounded runner without hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Total wall-clock budget for each run, measured once all checks are dispatched
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// On timeout, report unsettled checks as failed instead of returning [`Error::Timeout`]
    pub fn on_timeout_return_failure(mut self, enabled: bool) -> Self {
        self.on_timeout_return_failure = enabled;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CheckHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Send probe events to `logger` instead of the process-wide probe logger
    pub fn with_logger(mut self, logger: Arc<dyn ProbeLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run every check of `probe` concurrently and build its report.
    ///
    /// Faults and panics inside a check become unhealthy results. A timeout
    /// yields [`Error::Timeout`] unless failure results were requested; a
    /// failing hook yields [`Error::Hook`].
    pub async fn run(&self, probe: &Probe) -> Result<Report> {
        let logger = self.logger.clone().unwrap_or_else(probe_logger);
        let logger = logger.as_ref();
        let started = Instant::now();

        debug!(probe = probe.name(), checks = probe.checks().len(), "Running probe");
        emit_probe_event(
            logger,
            Level::INFO,
            "probe_start",
            &fields(json!({
                "probe": probe.name(),
                "checks": probe.checks().len(),
                "timeout_ms": self.timeout.map(|t| t.as_millis() as u64),
            })),
        );

        let mut tasks: JoinSet<CheckTaskOutput> = JoinSet::new();
        let mut indices: HashMap<Id, usize> = HashMap::with_capacity(probe.checks().len());
        for (index, check) in probe.checks().iter().enumerate() {
            if let Some(hooks) = &self.hooks {
                if let Err(e) = hooks.on_check_start(probe.name(), check.name(), index).await {
                    tasks.shutdown().await;
                    return Err(Error::Hook(e));
                }
            }
            emit_probe_event(
                logger,
                Level::DEBUG,
                "check_start",
                &fields(json!({
                    "probe": probe.name(),
                    "check": check.name(),
                    "index": index,
                    "config": Value::Object(check.describe()),
                })),
            );

            let check = Arc::clone(check);
            let handle = tasks.spawn(async move {
                let started = Instant::now();
                let outcome = check.check().await;
                (outcome, started.elapsed())
            });
            indices.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<CheckResult>> = vec![None; probe.checks().len()];
        let deadline = self.timeout.map(|budget| tokio::time::Instant::now() + budget);
        let collected = self
            .collect(probe, &mut tasks, &indices, &mut slots, deadline, logger)
            .await;
        tasks.shutdown().await;
        match collected {
            Ok(true) => {}
            Ok(false) => {
                self.handle_timeout(probe, &mut slots, started.elapsed(), logger)
                    .await?;
            }
            Err(e) => return Err(e),
        }

        let results = slots
            .into_iter()
            .zip(probe.checks())
            .map(|(slot, check)| {
                slot.unwrap_or_else(|| {
                    CheckResult::failed(check.name(), "Check did not report a result", Duration::ZERO)
                })
            })
            .collect();
        let report = Report::new(probe.name(), results, probe.allows_partial_failure());

        let elapsed = started.elapsed();
        if report.is_healthy() {
            debug!(probe = probe.name(), duration_ms = elapsed.as_millis(), "Probe healthy");
        } else {
            info!(probe = probe.name(), duration_ms = elapsed.as_millis(), "Probe unhealthy");
        }
        emit_probe_event(
            logger,
            Level::INFO,
            "probe_end",
            &fields(json!({
                "probe": probe.name(),
                "healthy": report.is_healthy(),
                "duration_ms": elapsed.as_millis() as u64,
            })),
        );
        Ok(report)
    }

    /// Drain settled tasks into `slots`, firing end hooks in completion order.
    ///
    /// Returns `Ok(false)` once `deadline` passes with tasks still running.
    /// End hooks are not raced against the deadline, and a slot is filled
    /// before its hook is awaited.
    async fn collect(
        &self,
        probe: &Probe,
        tasks: &mut JoinSet<CheckTaskOutput>,
        indices: &HashMap<Id, usize>,
        slots: &mut [Option<CheckResult>],
        deadline: Option<tokio::time::Instant>,
        logger: &dyn ProbeLogger,
    ) -> Result<bool> {
        loop {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, tasks.join_next_with_id()).await {
                    Ok(next) => next,
                    Err(_) => return Ok(false),
                },
                None => tasks.join_next_with_id().await,
            };
            let Some(joined) = next else {
                return Ok(true);
            };
            let id = match &joined {
                Ok((id, _)) => *id,
                Err(e) => e.id(),
            };
            let Some(&index) = indices.get(&id) else {
                continue;
            };
            let name = probe.checks()[index].name();
            let result = match joined {
                Ok((_, (Ok(outcome), duration))) => CheckResult::from_outcome(name, outcome, duration),
                Ok((_, (Err(e), duration))) => CheckResult::failed(name, format!("{e:#}"), duration),
                Err(e) => CheckResult::failed(name, join_error_detail(e), Duration::ZERO),
            };

            let result = slots[index].insert(result);
            self.finish_check(probe, index, result, logger).await?;
        }
    }

    async fn handle_timeout(
        &self,
        probe: &Probe,
        slots: &mut [Option<CheckResult>],
        elapsed: Duration,
        logger: &dyn ProbeLogger,
    ) -> Result<()> {
        let budget = self.timeout.unwrap_or_default();
        let pending: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect();
        let pending_names: Vec<&str> = pending
            .iter()
            .map(|&index| probe.checks()[index].name())
            .collect();

        warn!(
            probe = probe.name(),
            timeout_ms = budget.as_millis(),
            pending = ?pending_names,
            "Probe timed out"
        );
        emit_probe_event(
            logger,
            Level::WARN,
            "probe_timeout",
            &fields(json!({
                "probe": probe.name(),
                "timeout_ms": budget.as_millis() as u64,
                "pending": pending_names,
            })),
        );

        if !self.on_timeout_return_failure {
            return Err(Error::Timeout {
                probe: probe.name().to_string(),
                timeout: budget,
            });
        }

        for index in pending {
            let result = CheckResult::timed_out(probe.checks()[index].name(), elapsed);
            self.finish_check(probe, index, &result, logger).await?;
            slots[index] = Some(result);
        }
        Ok(())
    }

    async fn finish_check(
        &self,
        probe: &Probe,
        index: usize,
        result: &CheckResult,
        logger: &dyn ProbeLogger,
    ) -> Result<()> {
        if result.healthy {
            debug!(
                probe = probe.name(),
                check = %result.name,
                duration_ms = result.duration.as_millis(),
                "Check passed"
            );
        } else {
            warn!(
                probe = probe.name(),
                check = %result.name,
                detail = result.detail.as_deref().unwrap_or("unknown"),
                "Check failed"
            );
        }
        emit_probe_event(
            logger,
            Level::DEBUG,
            "check_end",
            &fields(json!({
                "probe": probe.name(),
                "check": result.name,
                "index": index,
                "healthy": result.healthy,
                "detail": result.detail,
                "duration_ms": result.duration.as_millis() as u64,
            })),
        );

        if let Some(hooks) = &self.hooks {
            hooks
                .on_check_end(probe.name(), &result.name, index, result)
                .await
                .map_err(Error::Hook)?;
        }
        Ok(())
    }
}

/// Run `probe` with an optional timeout, failing with [`Error::Timeout`] when it elapses.
pub async fn run_probe(probe: &Probe, timeout: Option<Duration>) -> Result<Report> {
    let mut runner = ProbeRunner::new();
    if let Some(timeout) = timeout {
        runner = runner.with_timeout(timeout);
    }
    runner.run(probe).await
}

/// Release resources held by the checks of `probes`.
///
/// Intended for application shutdown; the runner never calls it. Failures
/// are logged and do not stop the remaining releases.
pub async fn close_probes<'a>(probes: impl IntoIterator<Item = &'a Probe>) {
    for probe in probes {
        for check in probe.checks().iter().filter(|c| c.holds_resources()) {
            if let Err(e) = check.release().await {
                warn!(
                    probe = probe.name(),
                    check = check.name(),
                    error = %e,
                    "Failed to release check resources"
                );
            }
        }
    }
}

fn join_error_detail(err: JoinError) -> String {
    if !err.is_panic() {
        return "Check was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("Check panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("Check panicked: {msg}")
    } else {
        "Check panicked".to_string()
    }
}

fn fields(value: Value) -> LogFields {
    match value {
        Value::Object(map) => map,
        _ => LogFields::new(),
    }
}
