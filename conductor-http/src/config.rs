use std::time::Duration;

use crate::TransportError;

/// Default overall deadline for a single logical request, retries included.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of retries after the initial attempt.
pub(crate) const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default base delay before the first retry.
pub(crate) const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(250);
/// Default ceiling for the exponential delay.
pub(crate) const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Configuration for the outbound transport.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Overall deadline for a logical request including every retry and wait.
    pub timeout: Duration,
    /// Number of retries after the initial attempt. Zero disables retries.
    pub retry_attempts: u32,
    /// Base delay for the exponential backoff schedule.
    pub base_backoff: Duration,
    /// Ceiling applied to the exponential delay before jitter.
    pub max_backoff: Duration,
    /// Value injected as `User-Agent` when the request carries none.
    pub user_agent: String,
    /// Permit retries of methods other than GET, HEAD, and OPTIONS.
    pub allow_non_idempotent_retry: bool,
}

impl TransportConfig {
    /// Configuration with the given user agent and the default policy.
    pub fn new(user_agent: impl Into<String>) -> Self {
        TransportConfig {
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            user_agent: user_agent.into(),
            allow_non_idempotent_retry: false,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), TransportError> {
        if self.user_agent.trim().is_empty() {
            return Err(TransportError::Config("user_agent must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(TransportError::Config("timeout must be non-zero".into()));
        }
        if self.base_backoff.is_zero() {
            return Err(TransportError::Config("base_backoff must be non-zero".into()));
        }
        if self.max_backoff < self.base_backoff {
            return Err(TransportError::Config(
                "max_backoff must be >= base_backoff".into(),
            ));
        }
        Ok(())
    }
}

/// TLS protocol versions the transport can be pinned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0, rejected by validation.
    Tls10,
    /// TLS 1.1, rejected by validation.
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    fn to_reqwest(self) -> Option<reqwest::tls::Version> {
        match self {
            TlsVersion::Tls10 | TlsVersion::Tls11 => None,
            TlsVersion::Tls12 => Some(reqwest::tls::Version::TLS_1_2),
            TlsVersion::Tls13 => Some(reqwest::tls::Version::TLS_1_3),
        }
    }
}

/// TLS settings applied on top of the system defaults.
///
/// The defaults are a TLS 1.2 floor, a TLS 1.3 ceiling, system roots, and
/// full certificate validation. A builder exists so exporters can pin a
/// private CA or present a client identity without touching the defaults
/// anywhere else.
#[derive(Clone, Debug, Default)]
pub struct TlsOptions {
    pub(crate) min_version: Option<TlsVersion>,
    pub(crate) max_version: Option<TlsVersion>,
    pub(crate) root_ca_pem: Option<Vec<u8>>,
    pub(crate) identity_pem: Option<Vec<u8>>,
    pub(crate) sni_host: Option<(String, std::net::SocketAddr)>,
    pub(crate) skip_verify: bool,
}

impl TlsOptions {
    /// Start from the defaults.
    pub fn builder() -> TlsOptionsBuilder {
        TlsOptionsBuilder {
            options: TlsOptions::default(),
        }
    }

    pub(crate) fn apply(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, TransportError> {
        let min = self.min_version.unwrap_or(TlsVersion::Tls12);
        if min < TlsVersion::Tls12 {
            return Err(TransportError::Config(
                "minimum TLS version must be 1.2 or newer".into(),
            ));
        }
        let max = self.max_version.unwrap_or(TlsVersion::Tls13);
        if max < min {
            return Err(TransportError::Config(
                "maximum TLS version is below the minimum".into(),
            ));
        }
        if let Some(version) = min.to_reqwest() {
            builder = builder.min_tls_version(version);
        }
        if let Some(version) = max.to_reqwest() {
            builder = builder.max_tls_version(version);
        }
        if let Some(pem) = &self.root_ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| TransportError::Config(format!("invalid root CA: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(pem) = &self.identity_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| TransportError::Config(format!("invalid client identity: {e}")))?;
            builder = builder.identity(identity);
        }
        if let Some((host, addr)) = &self.sni_host {
            builder = builder.resolve(host, *addr);
        }
        if self.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder)
    }
}

/// Builder for [`TlsOptions`].
#[derive(Debug)]
pub struct TlsOptionsBuilder {
    options: TlsOptions,
}

impl TlsOptionsBuilder {
    /// Set the minimum accepted protocol version. Anything below 1.2 fails
    /// validation when the transport is built.
    pub fn with_min_version(mut self, version: TlsVersion) -> Self {
        self.options.min_version = Some(version);
        self
    }

    /// Set the maximum accepted protocol version.
    pub fn with_max_version(mut self, version: TlsVersion) -> Self {
        self.options.max_version = Some(version);
        self
    }

    /// Trust an additional root certificate (PEM).
    pub fn with_root_ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.options.root_ca_pem = Some(pem.into());
        self
    }

    /// Present a client certificate for mutual TLS (PEM bundle with key).
    pub fn with_identity_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.options.identity_pem = Some(pem.into());
        self
    }

    /// Present `host` in SNI while connecting to `addr`.
    pub fn with_sni_override(mut self, host: impl Into<String>, addr: std::net::SocketAddr) -> Self {
        self.options.sni_host = Some((host.into(), addr));
        self
    }

    /// Disable certificate validation. Testing only.
    pub fn with_danger_skip_verify(mut self, skip: bool) -> Self {
        self.options.skip_verify = skip;
        self
    }

    /// Finish the builder.
    pub fn build(self) -> TlsOptions {
        self.options
    }
}
