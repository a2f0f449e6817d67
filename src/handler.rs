use crate::{
    config::ProvisioningRequest,
    error::{Error, Result},
    issuer::{Certbot, IssuanceClient, IssuanceParams},
    publisher::{self, UploadedArtifact},
    store::{S3Connector, StoreConnector},
    workdir::WorkingDirectory,
};
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    fmt::{Debug, Formatter},
    path::PathBuf,
};
use tracing::{error, info};

/// Returned by [`Handler::handle`] once the certificates are published
pub const SUCCESS_MESSAGE: &str = "Certificates obtained and uploaded successfully.";

/// Where working directories are created unless configured otherwise
pub const DEFAULT_WORK_DIR: &str = "/tmp/certbot";

/// A builder used to create a [`Handler`]
pub struct HandlerBuilder {
    issuer: Option<Box<dyn IssuanceClient>>,
    connector: Option<Box<dyn StoreConnector>>,
    work_dir: PathBuf,
    isolate: bool,
}

impl HandlerBuilder {
    fn new() -> Self {
        HandlerBuilder {
            issuer: None,
            connector: None,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            isolate: true,
        }
    }

    /// Set the ACME client, defaults to [`Certbot`]
    pub fn issuer(mut self, issuer: Box<dyn IssuanceClient>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Set how object storage is reached, defaults to [`S3Connector`]
    pub fn connector(mut self, connector: Box<dyn StoreConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the working directory, defaults to [`DEFAULT_WORK_DIR`]
    pub fn work_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.work_dir = path.into();
        self
    }

    /// Whether every invocation gets its own randomly named directory below the working
    /// directory. Enabled by default; when disabled the working directory itself is used.
    ///
    /// With isolation, anything below the working directory that doesn't belong to an
    /// invocation currently running on this handler is removed when an invocation starts.
    pub fn isolate(mut self, isolate: bool) -> Self {
        self.isolate = isolate;
        self
    }

    pub fn build(self) -> Handler {
        Handler {
            issuer: self.issuer.unwrap_or_else(|| Box::new(Certbot::default())),
            connector: self.connector.unwrap_or_else(|| Box::new(S3Connector)),
            work_dir: self.work_dir,
            isolate: self.isolate,
            active: Mutex::default(),
        }
    }
}

/// Issues certificates and publishes them to object storage, one request at a time
pub struct Handler {
    issuer: Box<dyn IssuanceClient>,
    connector: Box<dyn StoreConnector>,
    work_dir: PathBuf,
    isolate: bool,
    /// Isolated working directories of in-flight invocations
    active: Mutex<HashSet<PathBuf>>,
}

impl Handler {
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::new()
    }

    /// Run a request and return the status message for the host
    pub async fn handle(&self, request: &ProvisioningRequest) -> Result<&'static str> {
        self.provision(request).await?;
        Ok(SUCCESS_MESSAGE)
    }

    /// Run a request, returning everything that was uploaded.
    ///
    /// The working directory is cleared before issuance and again afterwards, whether or not
    /// the request succeeded.
    pub async fn provision(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<Vec<UploadedArtifact>> {
        let workdir = self.working_directory();
        if self.isolate {
            self.active.lock().insert(workdir.path().to_owned());
        }

        let result = self.guarded(&workdir, request).await;
        let cleanup = workdir.ensure_clean().await.map_err(Error::Cleanup);

        if self.isolate {
            self.active.lock().remove(workdir.path());
        }

        match (result, cleanup) {
            (Ok(uploaded), Ok(())) => Ok(uploaded),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                error!(
                    path = %workdir.path().display(),
                    error = %cleanup,
                    "failed to clean up after a failed request"
                );
                Err(e)
            }
        }
    }

    fn working_directory(&self) -> WorkingDirectory {
        if self.isolate {
            WorkingDirectory::unique_in(&self.work_dir)
        } else {
            WorkingDirectory::new(&self.work_dir)
        }
    }

    async fn guarded(
        &self,
        workdir: &WorkingDirectory,
        request: &ProvisioningRequest,
    ) -> Result<Vec<UploadedArtifact>> {
        if self.isolate {
            let keep = self.active.lock().clone();
            WorkingDirectory::sweep(&self.work_dir, &keep)
                .await
                .map_err(Error::Cleanup)?;
        }
        workdir.ensure_clean().await.map_err(Error::Cleanup)?;

        info!(
            domains = ?request.domains,
            authenticator = %request.authenticator,
            server = %request.server,
            "requesting certificate"
        );
        let params = IssuanceParams::new(request, workdir);
        let status = self
            .issuer
            .issue(&params)
            .await
            .map_err(Error::IssuanceLaunch)?;
        if !status.is_success() {
            return Err(Error::Issuance(status));
        }

        let store = self
            .connector
            .connect(&request.storage)
            .await
            .map_err(Error::Connect)?;
        let uploaded =
            publisher::publish(&workdir.live_dir(), &request.storage.prefix, store.as_ref())
                .await?;

        info!(
            count = uploaded.len(),
            bucket = %request.storage.bucket,
            "certificates published"
        );
        Ok(uploaded)
    }
}

impl Debug for Handler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // The collaborators are trait objects, so only show the directory settings
        f.debug_struct("Handler")
            .field("work_dir", &self.work_dir)
            .field("isolate", &self.isolate)
            .finish_non_exhaustive()
    }
}
