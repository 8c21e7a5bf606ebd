//! Integration tests for configuration file loading

use healthprobe_cli::{Config, ConfigError};
use std::path::PathBuf;
use std::time::Duration;

/// Write `contents` to a unique file under the system temp directory
fn temp_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "healthprobe-cli-{}-{}.yaml",
        name,
        std::process::id()
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_explicit_path() {
    let path = temp_config(
        "explicit",
        r#"
run:
  timeout: 750ms
probes:
  - name: liveness
    checks:
      - name: API
        type: url
        url: https://api.example.com/health
        username: probe
        password: s3cret
"#,
    );

    let config = Config::load(Some(path.as_path())).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.run.timeout, Duration::from_millis(750));
    assert_eq!(config.probes[0].checks[0].name(), "API");

    let probes = config.build_probes(&[]).unwrap();
    assert_eq!(probes[0].name(), "liveness");
    assert_eq!(probes[0].endpoint_summary(), "Liveness probe");
}

#[test]
fn test_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("healthprobe-cli-does-not-exist.yaml");
    assert!(matches!(
        Config::load(Some(path.as_path())),
        Err(ConfigError::IoError(_))
    ));
}

#[test]
fn test_invalid_file_is_rejected() {
    let path = temp_config(
        "invalid",
        r#"
probes:
  - name: ""
    checks:
      - { name: A, type: tcp, host: a.example.com, port: 80 }
"#,
    );

    let result = Config::load(Some(path.as_path()));
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_disallowed_scheme_is_rejected_on_build() {
    let path = temp_config(
        "scheme",
        r#"
probes:
  - name: readiness
    checks:
      - { name: Local file, type: url, url: "file:///etc/passwd" }
"#,
    );

    let config = Config::load(Some(path.as_path())).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        config.build_probes(&[]),
        Err(ConfigError::InvalidCheck { .. })
    ));
}
