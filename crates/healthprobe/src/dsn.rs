//! DSN scheme validation shared by checks constructible from a connection string.

use crate::ssrf::url_scheme;
use common::{Error, Result};

/// Validate that `dsn` uses one of `allowed_schemes` and return it trimmed.
///
/// Comparison is case-insensitive. Compound schemes such as
/// `postgresql+asyncpg` pass when their base (`postgresql`) is allowed.
pub fn validate_dsn<'a>(dsn: &'a str, allowed_schemes: &[&str]) -> Result<&'a str> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(Error::invalid_input("DSN cannot be empty"));
    }
    if allowed_schemes.is_empty() {
        return Err(Error::invalid_input("allowed schemes cannot be empty"));
    }

    let scheme = url_scheme(dsn).to_ascii_lowercase();
    let base = scheme.split('+').next().unwrap_or_default();
    let allowed = allowed_schemes
        .iter()
        .any(|s| s.eq_ignore_ascii_case(&scheme) || s.eq_ignore_ascii_case(base));
    if scheme.is_empty() || !allowed {
        let mut expected: Vec<String> = allowed_schemes.iter().map(|s| s.to_ascii_lowercase()).collect();
        expected.sort();
        return Err(Error::invalid_input(format!(
            "DSN scheme must be one of {} (or compound e.g. postgresql+driver), got {scheme:?}",
            expected.join(", ")
        )));
    }
    Ok(dsn)
}
