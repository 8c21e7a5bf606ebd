//! Health check implementations.

use crate::cache::{ClientCache, Connector};
use crate::dsn::validate_dsn;
use crate::ssrf::{self, HostResolver, SystemResolver};
use crate::types::{CheckOutcome, DEFAULT_CHECK_TIMEOUT, TcpConfig, UrlConfig};
use anyhow::anyhow;
use async_trait::async_trait;
use common::logging::{LogFields, REDACT_PLACEHOLDER};
use common::{Error, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{StatusCode, Url, redirect};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One unit of dependency verification.
#[async_trait]
pub trait Check: Send + Sync {
    /// Perform the check.
    ///
    /// Ordinary failure is `Ok` with an unhealthy outcome. `Err` means the
    /// check itself faulted; the probe runner records it as unhealthy.
    async fn check(&self) -> anyhow::Result<CheckOutcome>;

    /// Get the name of this check
    fn name(&self) -> &str;

    /// Settings for probe events. Credentials are redacted before emission.
    fn describe(&self) -> LogFields {
        LogFields::new()
    }

    /// Whether [`Check::release`] frees anything
    fn holds_resources(&self) -> bool {
        false
    }

    /// Release held resources. Must be idempotent.
    async fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

type CheckFn = dyn Fn() -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync;

/// Check backed by a user-provided function
pub struct FunctionCheck {
    name: String,
    func: Box<CheckFn>,
    timeout_duration: Duration,
}

impl FunctionCheck {
    /// Wrap an async function. `Ok(false)` is unhealthy; `Err` is a fault.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(move || func().boxed()),
            timeout_duration: DEFAULT_CHECK_TIMEOUT,
        }
    }

    /// Wrap a blocking function; each call runs on the blocking thread pool.
    pub fn blocking<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(name, move || {
            let func = func.clone();
            async move {
                match tokio::task::spawn_blocking(move || func()).await {
                    Ok(result) => result,
                    Err(e) => Err(anyhow!("blocking check did not complete: {e}")),
                }
            }
        })
    }

    /// Bound each call; a call that exceeds it is a fault
    pub fn with_timeout(mut self, timeout_duration: Duration) -> Self {
        self.timeout_duration = timeout_duration;
        self
    }
}

#[async_trait]
impl Check for FunctionCheck {
    async fn check(&self) -> anyhow::Result<CheckOutcome> {
        match timeout(self.timeout_duration, (self.func)()).await {
            Ok(result) => Ok(CheckOutcome::from(result?)),
            Err(_) => Err(anyhow!(
                "function check timed out after {:?}",
                self.timeout_duration
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> LogFields {
        let mut fields = LogFields::new();
        fields.insert("name".into(), Value::from(self.name.as_str()));
        fields.insert(
            "timeout".into(),
            Value::from(format!("{:?}", self.timeout_duration)),
        );
        fields
    }
}

const MAX_REDIRECTS: usize = 10;

/// Builds the cached `reqwest` client for [`UrlCheck`]
pub struct HttpConnector {
    timeout_duration: Duration,
    verify_ssl: bool,
    follow_redirects: bool,
    block_private_hosts: bool,
}

impl HttpConnector {
    /// Redirect handling for the client.
    ///
    /// With `block_private_hosts`, every hop must pass [`ssrf::validate_url`]
    /// or the request fails. Hop hostnames are not resolved.
    fn redirect_policy(&self) -> redirect::Policy {
        if !self.follow_redirects {
            return redirect::Policy::none();
        }
        if !self.block_private_hosts {
            return redirect::Policy::limited(MAX_REDIRECTS);
        }
        redirect::Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error(format!("stopped after {MAX_REDIRECTS} redirects"));
            }
            let verdict = ssrf::validate_url(attempt.url().as_str(), true);
            match verdict {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    type Client = reqwest::Client;

    async fn connect(&self) -> anyhow::Result<Self::Client> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout_duration)
            .redirect(self.redirect_policy())
            .danger_accept_invalid_certs(!self.verify_ssl)
            .build()?;
        Ok(client)
    }
}

/// HTTP health check with a cached client and optional SSRF protection
pub struct UrlCheck {
    name: String,
    config: UrlConfig,
    url: Url,
    resolver: Arc<dyn HostResolver>,
    clients: ClientCache<HttpConnector>,
}

impl UrlCheck {
    /// Create a new HTTP check.
    ///
    /// Fails with an SSRF error for non-http(s) schemes, and for blocked
    /// literal hosts when `block_private_hosts` is set.
    pub fn new(name: impl Into<String>, config: UrlConfig) -> Result<Self> {
        ssrf::validate_url(&config.url, config.block_private_hosts)?;
        let url = Url::parse(config.url.trim())
            .map_err(|e| Error::invalid_input(format!("invalid URL {:?}: {e}", config.url)))?;

        let connector = HttpConnector {
            timeout_duration: config.timeout,
            verify_ssl: config.verify_ssl,
            follow_redirects: config.follow_redirects,
            block_private_hosts: config.block_private_hosts,
        };
        Ok(Self {
            name: name.into(),
            config,
            url,
            resolver: Arc::new(SystemResolver),
            clients: ClientCache::new(connector),
        })
    }

    /// Create an HTTP check from an `http://` or `https://` DSN
    pub fn from_dsn(dsn: &str, name: Option<&str>) -> Result<Self> {
        let dsn = validate_dsn(dsn, &["http", "https"])?;
        Self::new(name.unwrap_or("HTTP"), UrlConfig::new(dsn))
    }

    /// Use a custom resolver for request-time host validation
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &UrlConfig {
        &self.config
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether a client is currently cached
    pub async fn has_client(&self) -> bool {
        self.clients.is_cached().await
    }
}

#[async_trait]
impl Check for UrlCheck {
    async fn check(&self) -> anyhow::Result<CheckOutcome> {
        if self.config.block_private_hosts {
            if let Some(host) = self.url.host_str() {
                ssrf::validate_host(host, self.resolver.as_ref()).await?;
            }
        }

        let client = self.clients.get_or_create().await?;
        let mut request = client.get(self.url.clone());
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(check = %self.name, error = %e, "HTTP request failed");
                self.clients.invalidate().await;
                return Err(anyhow::Error::new(e).context("HTTP request failed"));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(check = %self.name, status = status.as_u16(), "HTTP check successful");
            return Ok(CheckOutcome::healthy());
        }

        warn!(check = %self.name, status = status.as_u16(), "HTTP check failed");
        let auth_rejected = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN);
        if self.config.username.is_some() && auth_rejected {
            Ok(CheckOutcome::unhealthy(format!("Authentication rejected: {status}")))
        } else {
            Ok(CheckOutcome::unhealthy(format!("Unexpected status code: {status}")))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> LogFields {
        let mut fields = match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map,
            _ => LogFields::new(),
        };
        let mut url = self.url.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some(REDACT_PLACEHOLDER));
        }
        fields.insert("url".into(), Value::from(url.to_string()));
        fields.insert("name".into(), Value::from(self.name.as_str()));
        fields
    }

    fn holds_resources(&self) -> bool {
        true
    }

    async fn release(&self) -> anyhow::Result<()> {
        self.clients.release().await
    }
}

/// TCP connect check. Opens a fresh connection on every run.
pub struct TcpCheck {
    name: String,
    config: TcpConfig,
    resolver: Arc<dyn HostResolver>,
}

impl TcpCheck {
    /// Create a new TCP check.
    ///
    /// With `block_private_hosts`, localhost names and blocked literal
    /// addresses are rejected here; other names are checked on every run.
    pub fn new(name: impl Into<String>, config: TcpConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(Error::invalid_input("TCP check host cannot be empty"));
        }
        if config.block_private_hosts {
            ssrf::validate_literal_host(&config.host)?;
        }
        Ok(Self {
            name: name.into(),
            config,
            resolver: Arc::new(SystemResolver),
        })
    }

    /// Use a custom resolver for connect-time host validation
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn connect_host(&self) -> &str {
        let host = self.config.host.trim();
        host.strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host)
    }
}

#[async_trait]
impl Check for TcpCheck {
    async fn check(&self) -> anyhow::Result<CheckOutcome> {
        let host = self.connect_host();
        if self.config.block_private_hosts {
            ssrf::validate_host(host, self.resolver.as_ref()).await?;
        }

        match timeout(self.config.timeout, TcpStream::connect((host, self.config.port))).await {
            Ok(Ok(_stream)) => {
                debug!(check = %self.name, host, port = self.config.port, "TCP check successful");
                Ok(CheckOutcome::healthy())
            }
            Ok(Err(e)) => {
                warn!(check = %self.name, host, port = self.config.port, error = %e, "TCP check failed");
                Ok(CheckOutcome::unhealthy(format!("Connection failed: {e}")))
            }
            Err(_) => {
                warn!(check = %self.name, host, port = self.config.port, "TCP check timed out");
                Ok(CheckOutcome::unhealthy(format!(
                    "Connection timed out after {:?}",
                    self.config.timeout
                )))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> LogFields {
        let mut fields = match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map,
            _ => LogFields::new(),
        };
        fields.insert("name".into(), Value::from(self.name.as_str()));
        fields
    }
}
