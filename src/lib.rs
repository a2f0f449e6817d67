//! Issue TLS certificates with an ACME client over the DNS-01 challenge and publish the
//! resulting bundle to object storage.
//!
//! ```no_run
//! use certpush::{Handler, ProvisioningRequest};
//!
//! # async fn run() -> Result<(), certpush::Error> {
//! let request = ProvisioningRequest::builder()
//!     .emails("ops@example.com")
//!     .domains("example.com,*.example.com")
//!     .dns_plugin("dns-route53")
//!     .bucket("my-certificates")
//!     .prefix("tls")
//!     .build()?;
//!
//! let handler = Handler::builder().build();
//! let message = handler.handle(&request).await?;
//! println!("{message}");
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handler;
mod issuer;
mod publisher;
mod store;
mod workdir;

pub use config::{
    DnsAuthenticator, DomainList, InputSource, Payload, ProvisioningRequest, RequestBuilder,
    StorageTarget, DEFAULT_DNS_PLUGIN, LETS_ENCRYPT_PRODUCTION_URL, LETS_ENCRYPT_STAGING_URL,
};
pub use error::{BoxError, Error};
pub use handler::{Handler, HandlerBuilder, DEFAULT_WORK_DIR, SUCCESS_MESSAGE};
pub use issuer::{Certbot, IssuanceClient, IssuanceParams, IssuanceStatus};
pub use publisher::{object_key, publish, UploadedArtifact};
pub use store::{ArtifactStore, S3Connector, S3Store, StoreConnector};
pub use workdir::WorkingDirectory;
