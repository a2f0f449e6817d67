//! Certificate issuance
//!
//! Issuance is delegated to an external ACME client behind the [`IssuanceClient`] trait. The
//! client is responsible for the whole protocol exchange: account registration, the DNS-01
//! challenge, polling and retries. When it succeeds it must leave the following layout below
//! the working directory:
//!
//! ```text
//! live/
//! └── <domain>/
//!     ├── README
//!     ├── cert.pem
//!     ├── chain.pem
//!     ├── fullchain.pem
//!     └── privkey.pem
//! ```
//!
//! [`Certbot`] is the production implementation.

use crate::{
    config::{DnsAuthenticator, ProvisioningRequest},
    error::BoxError,
    workdir::WorkingDirectory,
};
use std::{
    ffi::OsString,
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};
use tokio::process::Command;
use tracing::{debug, warn};

/// Parameters for a single certificate request
#[derive(Clone, Copy, Debug)]
pub struct IssuanceParams<'a> {
    /// Comma separated administrator emails
    pub emails: &'a str,
    pub domains: &'a [String],
    pub authenticator: &'a DnsAuthenticator,
    /// ACME directory URL
    pub server: &'a str,
    pub work_dir: &'a Path,
}

impl<'a> IssuanceParams<'a> {
    pub fn new(request: &'a ProvisioningRequest, work_dir: &'a WorkingDirectory) -> Self {
        IssuanceParams {
            emails: &request.emails,
            domains: &request.domains,
            authenticator: &request.authenticator,
            server: &request.server,
            work_dir: work_dir.path(),
        }
    }
}

/// The status reported by the ACME client once it finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IssuanceStatus {
    code: Option<i32>,
}

impl IssuanceStatus {
    pub fn success() -> Self {
        Self::from_code(0)
    }

    pub fn from_code(code: i32) -> Self {
        IssuanceStatus { code: Some(code) }
    }

    /// The exit code, `None` if the client was terminated by a signal
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for IssuanceStatus {
    fn from(status: ExitStatus) -> Self {
        IssuanceStatus {
            code: status.code(),
        }
    }
}

impl Display for IssuanceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Requests certificates from an ACME server.
///
/// Implementations only return an error when the client could not be run at all, a failed
/// issuance is reported through [`IssuanceStatus`].
#[async_trait::async_trait]
pub trait IssuanceClient: Send + Sync {
    /// Obtain a certificate, writing the bundle below `params.work_dir`
    async fn issue(&self, params: &IssuanceParams<'_>) -> Result<IssuanceStatus, BoxError>;
}

/// Runs the `certbot` executable in certificate-only mode
#[derive(Clone, Debug)]
pub struct Certbot {
    program: PathBuf,
}

impl Default for Certbot {
    fn default() -> Self {
        Self::new("certbot")
    }
}

impl Certbot {
    /// Use the executable at `program`, looked up in `PATH` if it is a bare name
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Certbot {
            program: program.into(),
        }
    }

    /// The command line for a request
    pub fn arguments(params: &IssuanceParams<'_>) -> Vec<OsString> {
        let dir = params.work_dir.as_os_str();

        let mut args = Vec::with_capacity(20);
        // Keep everything in the working directory so no root access is needed
        for flag in ["--config-dir", "--work-dir", "--logs-dir"] {
            args.push(OsString::from(flag));
            args.push(dir.to_owned());
        }
        args.extend(
            [
                "certonly",
                "--non-interactive",
                "--agree-tos",
                "--email",
                params.emails,
                "--authenticator",
                params.authenticator.name(),
                "--preferred-challenges",
                "dns-01",
                "--server",
                params.server,
                "--domains",
            ]
            .map(OsString::from),
        );
        args.push(params.domains.join(",").into());
        args
    }
}

#[async_trait::async_trait]
impl IssuanceClient for Certbot {
    async fn issue(&self, params: &IssuanceParams<'_>) -> Result<IssuanceStatus, BoxError> {
        let args = Self::arguments(params);
        debug!(program = %self.program.display(), ?args, "running acme client");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await?;

        let status = IssuanceStatus::from(output.status);
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(target: "certbot", "{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if status.is_success() {
                debug!(target: "certbot", "{line}");
            } else {
                warn!(target: "certbot", "{line}");
            }
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::{Certbot, IssuanceClient, IssuanceParams, IssuanceStatus};
    use crate::config::{DnsAuthenticator, LETS_ENCRYPT_PRODUCTION_URL};
    use std::path::Path;

    fn arguments(authenticator: &DnsAuthenticator, domains: &[String]) -> Vec<String> {
        let params = IssuanceParams {
            emails: "ops@example.com",
            domains,
            authenticator,
            server: LETS_ENCRYPT_PRODUCTION_URL,
            work_dir: Path::new("/tmp/certbot"),
        };
        Certbot::arguments(&params)
            .into_iter()
            .map(|arg| arg.into_string().unwrap())
            .collect()
    }

    #[test]
    fn argument_order() {
        let domains = vec!["example.com".to_owned(), "*.example.com".to_owned()];
        let args = arguments(&DnsAuthenticator::Plugin("dns-cloudflare".into()), &domains);

        assert_eq!(
            args,
            vec![
                "--config-dir",
                "/tmp/certbot",
                "--work-dir",
                "/tmp/certbot",
                "--logs-dir",
                "/tmp/certbot",
                "certonly",
                "--non-interactive",
                "--agree-tos",
                "--email",
                "ops@example.com",
                "--authenticator",
                "dns-cloudflare",
                "--preferred-challenges",
                "dns-01",
                "--server",
                "https://acme-v02.api.letsencrypt.org/directory",
                "--domains",
                "example.com,*.example.com",
            ]
        );
    }

    #[test]
    fn fixed_authenticator() {
        let domains = vec!["example.com".to_owned()];
        let args = arguments(&DnsAuthenticator::Fixed, &domains);

        let position = args.iter().position(|a| a == "--authenticator").unwrap();
        assert_eq!(args[position + 1], "dns-route53");
        assert_eq!(args.last().unwrap(), "example.com");
    }

    #[test]
    fn status() {
        assert!(IssuanceStatus::success().is_success());
        assert!(!IssuanceStatus::from_code(1).is_success());
        assert_eq!(IssuanceStatus::from_code(1).to_string(), "exit code 1");
        assert_eq!(IssuanceStatus::from_code(2).code(), Some(2));
    }

    #[tokio::test]
    async fn missing_executable() {
        let certbot = Certbot::new("/nonexistent/certbot");
        let domains = vec!["example.com".to_owned()];
        let params = IssuanceParams {
            emails: "ops@example.com",
            domains: &domains,
            authenticator: &DnsAuthenticator::Fixed,
            server: LETS_ENCRYPT_PRODUCTION_URL,
            work_dir: Path::new("/tmp/certbot"),
        };

        assert!(certbot.issue(&params).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_is_reported() {
        let domains = vec!["example.com".to_owned()];
        let params = IssuanceParams {
            emails: "ops@example.com",
            domains: &domains,
            authenticator: &DnsAuthenticator::Fixed,
            server: LETS_ENCRYPT_PRODUCTION_URL,
            work_dir: Path::new("/tmp/certbot"),
        };

        // `true` and `false` ignore their arguments
        let status = Certbot::new("true").issue(&params).await.unwrap();
        assert!(status.is_success());

        let status = Certbot::new("false").issue(&params).await.unwrap();
        assert_eq!(status, IssuanceStatus::from_code(1));
    }
}
