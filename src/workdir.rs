use std::{
    collections::HashSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Scratch space the ACME client uses for its configuration, account keys, logs and the
/// issued certificates. It only lives for the duration of one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkingDirectory {
    path: PathBuf,
}

impl WorkingDirectory {
    /// Use exactly `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        WorkingDirectory { path: path.into() }
    }

    /// Use a randomly named directory below `base` so concurrent invocations on the same
    /// host never share state
    pub fn unique_in<P: AsRef<Path>>(base: P) -> Self {
        Self::new(base.as_ref().join(Uuid::new_v4().to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The root of the issued certificates, one directory per certificate name
    pub fn live_dir(&self) -> PathBuf {
        self.path.join("live")
    }

    /// Remove the directory and everything in it. Succeeds when nothing is there and removes
    /// the path as a plain file if something other than a directory is in the way.
    pub async fn ensure_clean(&self) -> io::Result<()> {
        let metadata = match fs::symlink_metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let removed = if metadata.is_dir() {
            debug!(path = %self.path.display(), "removing working directory");
            fs::remove_dir_all(&self.path).await
        } else {
            debug!(path = %self.path.display(), "removing non-directory working path");
            fs::remove_file(&self.path).await
        };

        match removed {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Remove every entry below `base` except the paths in `keep`. Clears what invocations that
    /// never reached their own cleanup left behind.
    pub async fn sweep<P: AsRef<Path>>(base: P, keep: &HashSet<PathBuf>) -> io::Result<()> {
        let base = base.as_ref();
        let mut entries = match fs::read_dir(base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if keep.contains(&path) {
                continue;
            }
            debug!(path = %path.display(), "removing stale working directory");
            Self::new(path).ensure_clean().await?;
        }

        Ok(())
    }
}
