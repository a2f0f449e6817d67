use crate::error::{Error, Result};
use serde::Deserialize;
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

/// The Let's Encrypt production ACMEv2 API, which supports wildcard certificates
pub const LETS_ENCRYPT_PRODUCTION_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// The Let's Encrypt staging ACMEv2 API
pub const LETS_ENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// The DNS authenticator used when no plugin is configured
pub const DEFAULT_DNS_PLUGIN: &str = "dns-route53";

/// Where the parameters for an invocation come from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputSource {
    /// `EMAILS`, `DOMAINS`, `DNS_PLUGIN`, `S3_BUCKET`, `S3_PREFIX` and `S3_REGION`
    #[default]
    Environment,
    /// The invocation event, see [`Payload`]
    Payload,
}

impl FromStr for InputSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "env" | "environment" => Ok(Self::Environment),
            "payload" | "event" => Ok(Self::Payload),
            _ => Err(Error::InvalidParameter("INPUT_SOURCE", s.to_owned())),
        }
    }
}

/// The DNS-01 authenticator handed to the ACME client
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DnsAuthenticator {
    /// A named authenticator plugin, e.g. `dns-cloudflare`
    Plugin(String),
    /// The built-in provider, [`DEFAULT_DNS_PLUGIN`]
    #[default]
    Fixed,
}

impl DnsAuthenticator {
    /// The plugin identifier passed to `--authenticator`
    pub fn name(&self) -> &str {
        match self {
            Self::Plugin(name) => name,
            Self::Fixed => DEFAULT_DNS_PLUGIN,
        }
    }
}

impl Display for DnsAuthenticator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the issued certificates are published
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageTarget {
    pub bucket: String,
    /// Key prefix, empty to publish at the bucket root
    pub prefix: String,
    /// Region override, the ambient AWS configuration is used when unset
    pub region: Option<String>,
}

/// Everything needed to issue and publish one certificate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Comma separated administrator emails
    pub emails: String,
    pub domains: Vec<String>,
    pub authenticator: DnsAuthenticator,
    /// ACME directory URL
    pub server: String,
    pub storage: StorageTarget,
}

impl ProvisioningRequest {
    /// Start building a request by hand
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Resolve a request from the given source. The payload is ignored for
    /// [`InputSource::Environment`].
    pub fn resolve(source: InputSource, payload: serde_json::Value) -> Result<Self> {
        match source {
            InputSource::Environment => Self::from_env(),
            InputSource::Payload => Self::from_payload(payload),
        }
    }

    /// Read the request from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the request using the environment variable names, looking values up with `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(emails) = lookup("EMAILS") {
            builder = builder.emails(emails);
        }
        if let Some(domains) = lookup("DOMAINS") {
            builder = builder.domains(&domains);
        }
        if let Some(plugin) = lookup("DNS_PLUGIN") {
            builder = builder.dns_plugin(plugin);
        }
        if let Some(server) = lookup("ACME_SERVER") {
            builder = builder.server(server);
        }
        if let Some(bucket) = lookup("S3_BUCKET") {
            builder = builder.bucket(bucket);
        }
        if let Some(prefix) = lookup("S3_PREFIX") {
            builder = builder.prefix(prefix);
        }
        if let Some(region) = lookup("S3_REGION") {
            builder = builder.region(region);
        }

        builder.build()
    }

    /// Read the request from an invocation event
    pub fn from_payload(payload: serde_json::Value) -> Result<Self> {
        let payload: Payload = serde_json::from_value(payload)?;
        payload.into_request()
    }
}

/// The invocation event accepted with [`InputSource::Payload`]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Payload {
    #[serde(alias = "emails")]
    pub email: Option<String>,
    pub domains: Option<DomainList>,
    pub dns_plugin: Option<String>,
    pub acme_server: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub s3_region: Option<String>,
}

/// Domains either as a comma separated string or a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DomainList {
    Joined(String),
    List(Vec<String>),
}

impl Payload {
    fn into_request(self) -> Result<ProvisioningRequest> {
        let mut builder = ProvisioningRequest::builder();
        if let Some(email) = self.email {
            builder = builder.emails(email);
        }
        match self.domains {
            Some(DomainList::Joined(domains)) => builder = builder.domains(&domains),
            Some(DomainList::List(domains)) => {
                for domain in domains {
                    builder = builder.add_domain(domain);
                }
            }
            None => {}
        }
        if let Some(plugin) = self.dns_plugin {
            builder = builder.dns_plugin(plugin);
        }
        if let Some(server) = self.acme_server {
            builder = builder.server(server);
        }
        if let Some(bucket) = self.s3_bucket {
            builder = builder.bucket(bucket);
        }
        if let Some(prefix) = self.s3_prefix {
            builder = builder.prefix(prefix);
        }
        if let Some(region) = self.s3_region {
            builder = builder.region(region);
        }

        builder.build()
    }
}

/// Used to assemble and validate a [`ProvisioningRequest`]
#[derive(Debug, Default)]
pub struct RequestBuilder {
    emails: Option<String>,
    domains: Vec<String>,
    plugin: Option<String>,
    server: Option<String>,
    bucket: Option<String>,
    prefix: Option<String>,
    region: Option<String>,
}

impl RequestBuilder {
    /// Set the administrator email(s), comma separated
    pub fn emails<S: Into<String>>(mut self, emails: S) -> Self {
        self.emails = Some(emails.into());
        self
    }

    /// Add a single domain to the certificate
    pub fn add_domain<S: Into<String>>(mut self, domain: S) -> Self {
        let domain = domain.into();
        let domain = domain.trim();
        if !domain.is_empty() {
            self.domains.push(domain.to_owned());
        }
        self
    }

    /// Add every domain from a comma separated list
    pub fn domains(mut self, domains: &str) -> Self {
        for domain in domains.split(',') {
            self = self.add_domain(domain);
        }
        self
    }

    /// Use a named DNS authenticator plugin instead of the built-in provider
    pub fn dns_plugin<S: Into<String>>(mut self, plugin: S) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Use a different ACME directory, defaults to [`LETS_ENCRYPT_PRODUCTION_URL`]
    pub fn server<S: Into<String>>(mut self, url: S) -> Self {
        self.server = Some(url.into());
        self
    }

    pub fn bucket<S: Into<String>>(mut self, bucket: S) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Validate the parameters and build the request
    pub fn build(self) -> Result<ProvisioningRequest> {
        let emails = present(self.emails).ok_or(Error::MissingParameter("emails"))?;
        if self.domains.is_empty() {
            return Err(Error::MissingParameter("domains"));
        }
        let bucket = present(self.bucket).ok_or(Error::MissingParameter("s3_bucket"))?;

        let authenticator = match present(self.plugin) {
            Some(plugin) => DnsAuthenticator::Plugin(plugin),
            None => DnsAuthenticator::Fixed,
        };
        let server =
            present(self.server).unwrap_or_else(|| LETS_ENCRYPT_PRODUCTION_URL.to_owned());

        Ok(ProvisioningRequest {
            emails,
            domains: self.domains,
            authenticator,
            server,
            storage: StorageTarget {
                bucket,
                prefix: present(self.prefix).unwrap_or_default(),
                region: present(self.region),
            },
        })
    }
}

/// Treat blank values the same as missing ones
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
