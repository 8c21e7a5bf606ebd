//! One-shot probe execution for the command line.

use crate::config::{Config, ConfigError, LoggingSettings, RunSettings};
use clap::Parser;
use common::logging::{self, TracingProbeLogger};
use healthprobe::{Probe, ProbeRunner, Report, close_probes};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use validator::Validate;

#[derive(Debug, Parser)]
#[command(name = "healthprobe-cli")]
#[command(about = "Run health probes once and report their status")]
#[command(version)]
pub struct Cli {
    /// Configuration file (searched in standard locations when omitted)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Probe to run; repeat to run several (default: all)
    #[arg(long = "probe", value_name = "NAME")]
    pub probes: Vec<String>,

    /// Time budget per probe, e.g. 500ms or 2s (overrides run.timeout)
    #[arg(long, value_name = "DUR", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Report checks cut off by the timeout as failed instead of aborting the probe
    #[arg(long)]
    pub return_failure_on_timeout: bool,

    /// Print one JSON report per line
    #[arg(long)]
    pub json: bool,
}

/// Process outcome, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    Healthy = 0,
    Unhealthy = 1,
    /// A probe hit its deadline and its health is unknown
    TimedOut = 2,
    ConfigError = 3,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome as u8)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Probe run failed: {0}")]
    Probe(#[from] common::Error),

    #[error("Failed to write report: {0}")]
    Output(#[from] std::io::Error),
}

impl AppError {
    pub fn outcome(&self) -> Outcome {
        match self {
            AppError::Config(_) => Outcome::ConfigError,
            AppError::Probe(_) | AppError::Output(_) => Outcome::Unhealthy,
        }
    }
}

/// Install the tracing subscriber and, if requested, the probe event logger
pub fn init_logging(settings: &LoggingSettings) {
    let level = settings.level.as_deref().unwrap_or("warn");
    if settings.is_json() {
        logging::init_json_with_level(level);
    } else {
        logging::init_with_level(level);
    }

    if settings.probe_events {
        logging::set_probe_logger(Arc::new(TracingProbeLogger));
    }
}

/// Build the runner for `config` with command line overrides applied.
///
/// Overrides are validated like the file settings they replace.
pub fn runner(cli: &Cli, config: &Config) -> Result<ProbeRunner, ConfigError> {
    let run = RunSettings {
        timeout: cli.timeout.unwrap_or(config.run.timeout),
        on_timeout_return_failure: cli.return_failure_on_timeout
            || config.run.on_timeout_return_failure,
    };
    run.validate()?;

    Ok(ProbeRunner::new()
        .with_timeout(run.timeout)
        .on_timeout_return_failure(run.on_timeout_return_failure))
}

/// Run the selected probes one after another and write their reports to `out`.
///
/// Checks are released before returning, whatever the outcome.
pub async fn execute<W: Write>(cli: &Cli, config: &Config, out: &mut W) -> Result<Outcome, AppError> {
    let runner = runner(cli, config)?;
    let probes = config.build_probes(&cli.probes)?;
    if probes.is_empty() {
        return Err(ConfigError::NoProbes.into());
    }

    let result = run_all(&runner, &probes, cli.json, out).await;
    close_probes(&probes).await;
    result
}

async fn run_all<W: Write>(
    runner: &ProbeRunner,
    probes: &[Probe],
    json: bool,
    out: &mut W,
) -> Result<Outcome, AppError> {
    let mut outcome = Outcome::Healthy;
    for probe in probes {
        match runner.run(probe).await {
            Ok(report) => {
                info!(probe = probe.name(), healthy = report.is_healthy(), "Probe finished");
                write_report(out, &report, json)?;
                if !report.is_healthy() {
                    outcome = outcome.max(Outcome::Unhealthy);
                }
            }
            Err(e) if e.is_timeout() => {
                warn!(probe = probe.name(), error = %e, "Probe health unknown");
                write_timeout(out, probe, runner.timeout().unwrap_or_default(), json)?;
                outcome = outcome.max(Outcome::TimedOut);
            }
            Err(e) => return Err(e.into()),
        }
    }
    out.flush()?;
    Ok(outcome)
}

fn write_report<W: Write>(out: &mut W, report: &Report, json: bool) -> std::io::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, report)?;
        return writeln!(out);
    }

    let state = if report.is_healthy() { "healthy" } else { "unhealthy" };
    writeln!(out, "{}: {state}", report.probe_name())?;
    for result in report.results() {
        let state = if result.healthy { "healthy" } else { "unhealthy" };
        match &result.detail {
            Some(detail) => writeln!(out, "  {}: {state} ({:?}) {detail}", result.name, result.duration)?,
            None => writeln!(out, "  {}: {state} ({:?})", result.name, result.duration)?,
        }
    }
    Ok(())
}

fn write_timeout<W: Write>(out: &mut W, probe: &Probe, timeout: Duration, json: bool) -> std::io::Result<()> {
    if json {
        let line = json!({
            "probe": probe.name(),
            "healthy": null,
            "error": "timeout",
            "timeout": format!("{timeout:?}"),
        });
        serde_json::to_writer(&mut *out, &line)?;
        return writeln!(out);
    }
    writeln!(out, "{}: timed out after {timeout:?}", probe.name())
}
