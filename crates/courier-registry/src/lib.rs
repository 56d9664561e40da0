//! Registry API client for courier.
//!
//! This crate provides the blocking HTTP client used to notify a module
//! registry: a liveness probe, posting a module descriptor, promoting a module
//! version, and fetching the dependency report of a posted module.
//!
//! # Example
//!
//! ```no_run
//! use courier_registry::{DeliveryClient, RegistryClient};
//! use courier_types::{Credentials, ModuleIdentity};
//!
//! let client = RegistryClient::new("http://registry.example.com:8074");
//!
//! if client.is_reachable() {
//!     let module = ModuleIdentity::new("core", "1.2.3");
//!     client
//!         .promote_module(&module, &Credentials::anonymous())
//!         .expect("promote");
//! }
//! ```

use std::time::Duration;

use courier_types::{Credentials, Dependency, Module, ModuleIdentity};
use reqwest::Url;
use reqwest::blocking::RequestBuilder;
use thiserror::Error;

/// Default timeout for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for API requests
pub const USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Path of the module resource on the registry
pub const MODULE_RESOURCE: &str = "/module";

/// A failed registry call.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Connection refused, timeout, TLS failure and the like
    #[error("failed to send request to registry: {0}")]
    Transport(#[from] reqwest::Error),

    /// The registry answered with a non-success status
    #[error("registry responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The registry answered but the body could not be read
    #[error("failed to decode registry response: {0}")]
    Decode(String),

    /// No valid request URL could be built from the registry address
    #[error("invalid registry url {0}")]
    Url(String),
}

/// Acknowledgement of a successful registry call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// HTTP status returned by the registry
    pub status: u16,
}

/// The registry operations a delivery needs.
pub trait DeliveryClient {
    /// Base URL of the registry, for logs and receipts
    fn base_url(&self) -> &str;

    /// Liveness probe. Never fails: any error means unreachable.
    fn is_reachable(&self) -> bool;

    /// Push a full module descriptor.
    fn post_module(&self, module: &Module, credentials: &Credentials) -> Result<Ack, RegistryError>;

    /// Mark a module version as promoted.
    fn promote_module(
        &self,
        module: &ModuleIdentity,
        credentials: &Credentials,
    ) -> Result<Ack, RegistryError>;

    /// Fetch the dependencies the registry knows for a module.
    fn dependencies(&self, module: &ModuleIdentity) -> Result<Vec<Dependency>, RegistryError>;
}

/// Registry API client
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl RegistryClient {
    /// Create a new registry client for the given base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client: build_http(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = build_http(timeout);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base}/module/{name}/{version}/{tail}`, each segment percent-encoded.
    fn module_url(&self, module: &ModuleIdentity, tail: &str) -> Result<Url, RegistryError> {
        let base = format!("{}{}", self.base_url, MODULE_RESOURCE);
        let mut url = Url::parse(&base).map_err(|e| RegistryError::Url(format!("{base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| RegistryError::Url(format!("{base}: cannot be a base")))?
            .extend([module.name.as_str(), module.version.as_str(), tail]);
        Ok(url)
    }
}

fn build_http(timeout: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

fn with_credentials(request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
    match &credentials.username {
        Some(user) if !credentials.is_anonymous() => {
            request.basic_auth(user, credentials.password.as_deref())
        }
        _ => request,
    }
}

fn expect_success(response: reqwest::blocking::Response) -> Result<Ack, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(Ack {
            status: status.as_u16(),
        });
    }

    Err(RegistryError::Status {
        status: status.as_u16(),
        body: response.text().unwrap_or_default(),
    })
}

impl DeliveryClient for RegistryClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn is_reachable(&self) -> bool {
        match self.client.get(format!("{}/", self.base_url)).send() {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn post_module(
        &self,
        module: &Module,
        credentials: &Credentials,
    ) -> Result<Ack, RegistryError> {
        let url = format!("{}{}", self.base_url, MODULE_RESOURCE);
        let request = with_credentials(self.client.post(url).json(module), credentials);
        expect_success(request.send()?)
    }

    fn promote_module(
        &self,
        module: &ModuleIdentity,
        credentials: &Credentials,
    ) -> Result<Ack, RegistryError> {
        let request = with_credentials(
            self.client.post(self.module_url(module, "promote")?),
            credentials,
        );
        expect_success(request.send()?)
    }

    fn dependencies(&self, module: &ModuleIdentity) -> Result<Vec<Dependency>, RegistryError> {
        let response = self.client.get(self.module_url(module, "dependencies")?).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        response
            .json::<Vec<Dependency>>()
            .map_err(|e| RegistryError::Decode(e.to_string()))
    }
}
