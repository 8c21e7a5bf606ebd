//! Configuration loading and validation for the probe runner

use healthprobe::{Check, Probe, TcpCheck, TcpConfig, UrlCheck, UrlConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found in search paths")]
    FileNotFound,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Invalid check in probe {probe:?}: {source}")]
    InvalidCheck {
        probe: String,
        #[source]
        source: common::Error,
    },

    #[error("Unknown probe {0:?}")]
    UnknownProbe(String),

    #[error("No probes configured")]
    NoProbes,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub run: RunSettings,

    #[serde(default)]
    pub probes: Vec<ProbeSettings>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.run.validate()?;

        let mut seen = HashSet::new();
        for probe in &self.probes {
            probe.validate()?;
            if !seen.insert(probe.name.as_str()) {
                let mut error = ValidationError::new("duplicate_probe_name");
                error.add_param("name".into(), &probe.name);
                let mut errors = ValidationErrors::new();
                errors.add("probes", error);
                return Err(errors);
            }
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,

    /// `text` (default) or `json`
    pub format: Option<String>,

    /// Forward probe lifecycle events to the log
    #[serde(default)]
    pub probe_events: bool,
}

impl LoggingSettings {
    pub fn is_json(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

/// Probe execution settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunSettings {
    #[serde(default = "default_run_timeout", with = "humantime_serde")]
    #[validate(custom = "validate_run_timeout")]
    pub timeout: Duration,

    /// Report unsettled checks as failed instead of aborting with a timeout
    #[serde(default)]
    pub on_timeout_return_failure: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout: default_run_timeout(),
            on_timeout_return_failure: false,
        }
    }
}

/// One probe and its checks
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProbeSettings {
    #[validate(custom = "validate_probe_name")]
    pub name: String,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub allow_partial_failure: bool,

    #[validate(length(min = 1))]
    pub checks: Vec<CheckSettings>,
}

/// A check definition, selected by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckSettings {
    Url {
        name: String,
        #[serde(flatten)]
        config: UrlConfig,
    },
    Tcp {
        name: String,
        #[serde(flatten)]
        config: TcpConfig,
    },
}

impl CheckSettings {
    pub fn name(&self) -> &str {
        match self {
            CheckSettings::Url { name, .. } | CheckSettings::Tcp { name, .. } => name,
        }
    }

    /// Construct the check, applying static SSRF validation
    pub fn build(&self) -> common::Result<Arc<dyn Check>> {
        let check: Arc<dyn Check> = match self {
            CheckSettings::Url { name, config } => Arc::new(UrlCheck::new(name.as_str(), config.clone())?),
            CheckSettings::Tcp { name, config } => Arc::new(TcpCheck::new(name.as_str(), config.clone())?),
        };
        Ok(check)
    }
}

impl ProbeSettings {
    pub fn build(&self) -> Result<Probe, ConfigError> {
        let checks = self
            .checks
            .iter()
            .map(CheckSettings::build)
            .collect::<common::Result<Vec<_>>>()
            .map_err(|source| ConfigError::InvalidCheck {
                probe: self.name.clone(),
                source,
            })?;

        let mut probe = Probe::new(self.name.as_str(), checks)
            .allow_partial_failure(self.allow_partial_failure);
        if let Some(summary) = &self.summary {
            probe = probe.with_summary(summary.as_str());
        }
        Ok(probe)
    }
}

fn default_run_timeout() -> Duration {
    Duration::from_secs(10)
}

// Custom validators

fn validate_run_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 1 || millis > 600_000 {
        return Err(ValidationError::new("run_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_probe_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("probe_name_empty"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load from `path`, or from the first file found in the standard locations
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::find_config_file().ok_or(ConfigError::FileNotFound)?,
        };
        tracing::debug!("Loading configuration from: {}", path.display());
        Self::load_from_file(&path)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/healthprobe/probes.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./probes.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/healthprobe/probes.yaml"))
    }

    /// Build the probes named in `selected`, or all of them when empty.
    ///
    /// Probes keep configuration order.
    pub fn build_probes(&self, selected: &[String]) -> Result<Vec<Probe>, ConfigError> {
        if let Some(unknown) = selected
            .iter()
            .find(|name| !self.probes.iter().any(|p| &p.name == *name))
        {
            return Err(ConfigError::UnknownProbe(unknown.clone()));
        }

        self.probes
            .iter()
            .filter(|p| selected.is_empty() || selected.contains(&p.name))
            .map(ProbeSettings::build)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBES_YAML: &str = r#"
logging:
  level: debug
  format: json
  probe_events: true

run:
  timeout: 2s
  on_timeout_return_failure: true

probes:
  - name: liveness
    checks:
      - name: API
        type: url
        url: https://api.example.com/health
        timeout: 500ms
  - name: readiness
    summary: Ready to serve traffic
    allow_partial_failure: true
    checks:
      - name: Primary DB
        type: tcp
        host: db-primary.example.com
        port: 5432
      - name: Replica DB
        type: tcp
        host: db-replica.example.com
        port: 5432
        block_private_hosts: true
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.run.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_valid_yaml_parsing() {
        let config = Config::from_yaml(PROBES_YAML).unwrap();

        assert!(config.logging.is_json());
        assert!(config.logging.probe_events);
        assert_eq!(config.run.timeout, Duration::from_secs(2));
        assert!(config.run.on_timeout_return_failure);
        assert_eq!(config.probes.len(), 2);

        match &config.probes[0].checks[0] {
            CheckSettings::Url { name, config } => {
                assert_eq!(name, "API");
                assert_eq!(config.url, "https://api.example.com/health");
                assert_eq!(config.timeout, Duration::from_millis(500));
                assert!(config.verify_ssl);
            }
            other => panic!("expected url check, got {other:?}"),
        }
        match &config.probes[1].checks[1] {
            CheckSettings::Tcp { config, .. } => {
                assert_eq!(config.port, 5432);
                assert!(config.block_private_hosts);
                assert_eq!(config.timeout, Duration::from_secs(5));
            }
            other => panic!("expected tcp check, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
probes:
  - name: liveness
    checks:
      - name: Local
        type: tcp
        host: 127.0.0.1
        port: 8080
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.run.timeout, Duration::from_secs(10));
        assert!(!config.run.on_timeout_return_failure);
        assert!(!config.logging.is_json());
        assert!(!config.probes[0].allow_partial_failure);
    }

    #[test]
    fn test_invalid_run_timeout() {
        let too_small = r#"
run:
  timeout: 0ms
"#;
        assert!(matches!(
            Config::from_yaml(too_small),
            Err(ConfigError::ValidationError(_))
        ));

        let too_large = r#"
run:
  timeout: 11m
"#;
        assert!(Config::from_yaml(too_large).is_err());
    }

    #[test]
    fn test_probe_without_checks_is_invalid() {
        let yaml = r#"
probes:
  - name: startup
    checks: []
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_duplicate_probe_names_are_invalid() {
        let yaml = r#"
probes:
  - name: liveness
    checks:
      - { name: A, type: tcp, host: a.example.com, port: 80 }
  - name: liveness
    checks:
      - { name: B, type: tcp, host: b.example.com, port: 80 }
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate_probe_name"));
    }

    #[test]
    fn test_probe_name_validation() {
        assert!(validate_probe_name("readiness").is_ok());
        assert!(validate_probe_name("").is_err());
        assert!(validate_probe_name("   ").is_err());
    }

    #[test]
    fn test_unknown_check_type_fails_to_parse() {
        let yaml = r#"
probes:
  - name: liveness
    checks:
      - { name: Cache, type: redis, host: cache, port: 6379 }
"#;
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_build_probes() {
        let config = Config::from_yaml(PROBES_YAML).unwrap();

        let all = config.build_probes(&[]).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].endpoint_summary(), "Ready to serve traffic");
        assert!(all[1].allows_partial_failure());

        let selected = config.build_probes(&["readiness".to_string()]).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].checks().len(), 2);

        assert!(matches!(
            config.build_probes(&["startup".to_string()]),
            Err(ConfigError::UnknownProbe(name)) if name == "startup"
        ));
    }

    #[test]
    fn test_build_rejects_blocked_target() {
        let yaml = r#"
probes:
  - name: liveness
    checks:
      - name: Metadata
        type: url
        url: http://169.254.169.254/latest
        block_private_hosts: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let err = config.build_probes(&[]).unwrap_err();
        match err {
            ConfigError::InvalidCheck { probe, source } => {
                assert_eq!(probe, "liveness");
                assert!(source.is_invalid_input());
            }
            other => panic!("expected invalid check, got {other:?}"),
        }
    }
}
