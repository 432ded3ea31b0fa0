//! Public address resolution through third-party side channels

use std::future::Future;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::{DnsSettings, NetmonSettings};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("{command} exited with {status}")]
    Failed {
        command: &'static str,
        status: std::process::ExitStatus,
    },
    #[error("malformed answer: {0:?}")]
    Malformed(String),
    #[error("http lookup failed: {0}")]
    Http(String),
}

/// Something that can find this host's public IPv4 address
pub trait AddressResolver {
    fn resolve(&self) -> impl Future<Output = Result<Ipv4Addr, ResolveError>> + Send;
}

/// Accept only a single well-formed dotted-decimal answer
///
/// Blank lines and `;;` diagnostics are skipped; the last remaining line
/// (after any CNAME chain) must be the address.
pub fn parse_address(output: &str) -> Result<Ipv4Addr, ResolveError> {
    let answer = output
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty() && !l.starts_with(';'))
        .unwrap_or("");

    answer
        .parse::<Ipv4Addr>()
        .map_err(|_| ResolveError::Malformed(output.trim().to_string()))
}

/// `dig +short <query> @<server>` with bounded time and tries
#[derive(Debug, Clone)]
pub struct DigResolver {
    server: String,
    query: String,
    timeout: Duration,
    tries: u32,
}

impl DigResolver {
    pub fn new(settings: &DnsSettings) -> Self {
        Self {
            server: settings.server.clone(),
            query: settings.query.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            tries: settings.tries,
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "+short".to_string(),
            format!("+time={}", self.timeout.as_secs().max(1)),
            format!("+tries={}", self.tries.max(1)),
            self.query.clone(),
            format!("@{}", self.server),
        ]
    }

    /// Outer bound in case dig itself hangs
    fn deadline(&self) -> Duration {
        self.timeout * self.tries.max(1) + Duration::from_secs(1)
    }
}

impl AddressResolver for DigResolver {
    async fn resolve(&self) -> Result<Ipv4Addr, ResolveError> {
        let run = Command::new("dig")
            .args(self.args())
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.deadline(), run)
            .await
            .map_err(|_| ResolveError::Timeout("dig"))?
            .map_err(|source| ResolveError::Spawn {
                command: "dig",
                source,
            })?;

        if !output.status.success() {
            return Err(ResolveError::Failed {
                command: "dig",
                status: output.status,
            });
        }
        parse_address(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Plain-text "what is my IP" HTTPS endpoint
#[derive(Debug, Clone)]
pub struct HttpResolver {
    url: String,
    timeout: Duration,
}

impl HttpResolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl AddressResolver for HttpResolver {
    async fn resolve(&self) -> Result<Ipv4Addr, ResolveError> {
        let url = self.url.clone();
        let timeout = self.timeout;

        // ureq is synchronous
        let body = tokio::task::spawn_blocking(move || -> Result<String, ResolveError> {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build()
                .into();
            let mut response = agent
                .get(&url)
                .call()
                .map_err(|e| ResolveError::Http(e.to_string()))?;
            response
                .body_mut()
                .read_to_string()
                .map_err(|e| ResolveError::Http(e.to_string()))
        })
        .await
        .map_err(|e| ResolveError::Http(e.to_string()))??;

        parse_address(&body)
    }
}

/// DNS side channel first, HTTPS fallback second
#[derive(Debug, Clone)]
pub struct PublicAddressResolver {
    dns: DigResolver,
    http: Option<HttpResolver>,
}

impl PublicAddressResolver {
    pub fn from_settings(settings: &NetmonSettings) -> Self {
        Self {
            dns: DigResolver::new(&settings.dns),
            http: settings
                .http_fallback
                .as_ref()
                .filter(|url| !url.is_empty())
                .map(|url| {
                    HttpResolver::new(url.clone(), Duration::from_secs(settings.http_timeout_secs))
                }),
        }
    }
}

impl AddressResolver for PublicAddressResolver {
    async fn resolve(&self) -> Result<Ipv4Addr, ResolveError> {
        let dns_err = match self.dns.resolve().await {
            Ok(addr) => return Ok(addr),
            Err(e) => e,
        };
        tracing::debug!("DNS side channel failed: {}", dns_err);

        match &self.http {
            Some(http) => http.resolve().await,
            None => Err(dns_err),
        }
    }
}
