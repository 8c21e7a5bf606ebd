//! Logging utilities for healthprobe components.
//!
//! Besides subscriber setup, this module owns the probe event sink: a
//! pluggable [`ProbeLogger`] that receives structured `probe_start`,
//! `check_start`, `check_end`, `probe_end` and `probe_timeout` events.
//! The sink is disabled by default ([`NullLogger`]). Every event goes through
//! [`redact_fields`] before any sink sees it.

use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Structured fields attached to a probe event.
pub type LogFields = Map<String, Value>;

/// Replacement written over credential values.
pub const REDACT_PLACEHOLDER: &str = "***";

const SECRET_KEYS: &[&str] = &[
    "http_auth",
    "password",
    "sasl_plain_password",
    "sasl_plain_username",
    "user",
    "username",
];

const SECRET_FRAGMENTS: &[&str] = &["password", "secret", "token", "api_key", "authorization"];

/// Initialize tracing with sensible defaults.
///
/// Uses the RUST_LOG environment variable to control log levels.
/// Default level is INFO.
pub fn init() {
    init_with_level("info");
}

/// Initialize tracing with JSON formatting (useful for structured logging).
pub fn init_json() {
    init_json_with_level("info");
}

/// Initialize text logging, falling back to `level` when RUST_LOG is unset.
pub fn init_with_level(level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Initialize JSON logging, falling back to `level` when RUST_LOG is unset.
pub fn init_json_with_level(level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Whether `key` names a credential-bearing field.
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEYS.contains(&key.as_str()) || SECRET_FRAGMENTS.iter().any(|f| key.contains(f))
}

/// Return a copy of `fields` with credential values replaced by [`REDACT_PLACEHOLDER`].
///
/// Objects nested at any depth, including inside arrays, are redacted as well.
pub fn redact_fields(fields: &LogFields) -> LogFields {
    fields
        .iter()
        .map(|(key, value)| {
            let value = if is_secret_key(key) {
                Value::String(REDACT_PLACEHOLDER.to_string())
            } else {
                redact_value(value)
            };
            (key.clone(), value)
        })
        .collect()
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(inner) => Value::Object(redact_fields(inner)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

/// Sink for probe and check events.
///
/// Fields handed to a sink have already been redacted.
pub trait ProbeLogger: Send + Sync {
    fn log(&self, level: Level, event: &str, fields: &LogFields);
}

/// Logger that emits nothing. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl ProbeLogger for NullLogger {
    fn log(&self, _level: Level, _event: &str, _fields: &LogFields) {}
}

/// Forwards probe events to `tracing` under the `healthprobe::probe` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProbeLogger;

impl ProbeLogger for TracingProbeLogger {
    fn log(&self, level: Level, event: &str, fields: &LogFields) {
        let fields = Value::Object(fields.clone());
        match level {
            Level::ERROR => tracing::error!(target: "healthprobe::probe", event, %fields),
            Level::WARN => tracing::warn!(target: "healthprobe::probe", event, %fields),
            Level::INFO => tracing::info!(target: "healthprobe::probe", event, %fields),
            Level::DEBUG => tracing::debug!(target: "healthprobe::probe", event, %fields),
            Level::TRACE => tracing::trace!(target: "healthprobe::probe", event, %fields),
        }
    }
}

static PROBE_LOGGER: LazyLock<RwLock<Arc<dyn ProbeLogger>>> =
    LazyLock::new(|| RwLock::new(Arc::new(NullLogger)));

/// Install the process-wide probe logger.
///
/// Meant to be called once at startup. Probe runs already in flight may still
/// observe the previous logger.
pub fn set_probe_logger(logger: Arc<dyn ProbeLogger>) {
    *PROBE_LOGGER.write().unwrap_or_else(PoisonError::into_inner) = logger;
}

/// The current process-wide probe logger.
pub fn probe_logger() -> Arc<dyn ProbeLogger> {
    PROBE_LOGGER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Restore the default [`NullLogger`].
pub fn reset_probe_logger() {
    set_probe_logger(Arc::new(NullLogger));
}

/// Redact `fields` and hand them to `logger`.
pub fn emit_probe_event(logger: &dyn ProbeLogger, level: Level, event: &str, fields: &LogFields) {
    logger.log(level, event, &redact_fields(fields));
}
