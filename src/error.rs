use crate::issuer::IssuanceStatus;
use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
    io,
};

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by the external collaborators (ACME client and object storage)
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug)]
pub enum Error {
    /// A required parameter was missing or empty
    MissingParameter(&'static str),
    /// A parameter was present but could not be understood
    InvalidParameter(&'static str, String),
    /// The invocation payload could not be deserialized
    Payload(serde_json::Error),
    /// The ACME client could not be started
    IssuanceLaunch(BoxError),
    /// The ACME client ran but reported failure
    Issuance(IssuanceStatus),
    /// Object storage could not be reached
    Connect(BoxError),
    /// Failed to walk or read the issued certificate files
    Io(io::Error),
    /// Uploading a single artifact failed
    Upload { key: String, source: BoxError },
    /// The working directory could not be removed
    Cleanup(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingParameter(name) => write!(f, "the `{name}` parameter is required"),
            Self::InvalidParameter(name, value) => {
                write!(f, "the value {value:?} is invalid for the `{name}` parameter")
            }
            Self::Payload(_) => write!(f, "failed to deserialize the invocation payload"),
            Self::IssuanceLaunch(_) => write!(f, "failed to run the acme client"),
            Self::Issuance(status) => write!(f, "the acme client exited unsuccessfully ({status})"),
            Self::Connect(_) => write!(f, "failed to connect to object storage"),
            Self::Io(_) => write!(f, "failed to read the issued certificates"),
            Self::Upload { key, .. } => write!(f, "failed to upload `{key}`"),
            Self::Cleanup(_) => write!(f, "failed to remove the working directory"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::MissingParameter(_) => None,
            Self::InvalidParameter(_, _) => None,
            Self::Payload(e) => Some(e),
            Self::IssuanceLaunch(e) => Some(e.as_ref()),
            Self::Issuance(_) => None,
            Self::Connect(e) => Some(e.as_ref()),
            Self::Io(e) => Some(e),
            Self::Upload { source, .. } => Some(source.as_ref()),
            Self::Cleanup(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
