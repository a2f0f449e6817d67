use crate::{error::Error, error::Result, store::ArtifactStore};
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use tokio::fs;
use tracing::{info, warn};

/// A file that was copied to object storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedArtifact {
    pub source: PathBuf,
    pub key: String,
}

/// Build the object key for a file at `relative` below the issuance root.
///
/// An empty prefix places the file at the root of the bucket.
pub fn object_key(prefix: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        relative
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Upload every file below `root` to `store`, keyed by `prefix` joined with the file's path
/// relative to `root`. Stops at the first failed upload.
pub async fn publish(
    root: &Path,
    prefix: &str,
    store: &dyn ArtifactStore,
) -> Result<Vec<UploadedArtifact>> {
    match fs::metadata(root).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(root = %root.display(), "no certificates to publish");
            return Ok(Vec::new());
        }
        Err(e) => return Err(Error::Io(e)),
    }
    let files = collect_files(root).await?;

    let mut uploaded = Vec::with_capacity(files.len());
    for source in files {
        let relative = source.strip_prefix(root).unwrap_or(source.as_path());
        let key = object_key(prefix, relative);

        let destination = store.location(&key);
        info!(
            source = %source.display(),
            %destination,
            "Uploading: {} => {}",
            source.display(),
            destination
        );

        let body = fs::read(&source).await?;
        store
            .put(&key, body)
            .await
            .map_err(|source| Error::Upload {
                key: key.clone(),
                source,
            })?;

        uploaded.push(UploadedArtifact { source, key });
    }

    Ok(uploaded)
}

/// Find all files below `root`. Symlinks to files are followed, symlinks to directories are
/// skipped so a link back to an ancestor can't loop.
async fn collect_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_symlink() && fs::metadata(&path).await?.is_dir() {
                warn!(path = %path.display(), "skipping symlinked directory");
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::{object_key, publish};
    use crate::{
        test::{write_bundle, MemoryStore, BUNDLE_FILES},
        Error,
    };
    use std::path::Path;

    #[test]
    fn key_with_prefix() {
        assert_eq!(
            object_key("certs", Path::new("example.com/cert.pem")),
            "certs/example.com/cert.pem"
        );
        assert_eq!(
            object_key("certs/", Path::new("example.com/cert.pem")),
            "certs/example.com/cert.pem"
        );
        assert_eq!(
            object_key("a/b", Path::new("example.com/privkey.pem")),
            "a/b/example.com/privkey.pem"
        );
    }

    #[test]
    fn key_without_prefix() {
        assert_eq!(
            object_key("", Path::new("example.com/cert.pem")),
            "example.com/cert.pem"
        );
        assert_eq!(object_key("", Path::new("README")), "README");
    }

    #[test_log::test(tokio::test)]
    async fn uploads_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live");
        let domains = ["a.example.com", "b.example.com", "*.c.example.com"];
        for domain in domains {
            write_bundle(&live, domain);
        }

        let store = MemoryStore::new();
        let uploaded = publish(&live, "tls", &store).await.unwrap();

        assert_eq!(uploaded.len(), 5 * domains.len());
        assert_eq!(store.attempts(), 5 * domains.len());

        let mut expected = domains
            .iter()
            .flat_map(|domain| {
                BUNDLE_FILES
                    .into_iter()
                    .map(move |file| format!("tls/{domain}/{file}"))
            })
            .collect::<Vec<_>>();
        expected.sort();
        assert_eq!(store.keys(), expected);

        for (key, body) in store.objects() {
            let relative = key.strip_prefix("tls/").unwrap();
            assert_eq!(body, relative.as_bytes());
        }
        for artifact in &uploaded {
            assert!(artifact.source.starts_with(&live));
        }
    }

    #[tokio::test]
    async fn uploads_to_bucket_root() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live");
        write_bundle(&live, "example.com");

        let store = MemoryStore::new();
        publish(&live, "", &store).await.unwrap();

        let expected = {
            let mut keys = BUNDLE_FILES
                .into_iter()
                .map(|file| format!("example.com/{file}"))
                .collect::<Vec<_>>();
            keys.sort();
            keys
        };
        assert_eq!(store.keys(), expected);
    }

    #[tokio::test]
    async fn binary_contents_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live");
        std::fs::create_dir_all(live.join("example.com")).unwrap();
        let body = (0..=255u8).collect::<Vec<_>>();
        std::fs::write(live.join("example.com/privkey.pem"), &body).unwrap();

        let store = MemoryStore::new();
        publish(&live, "p", &store).await.unwrap();

        assert_eq!(
            store.objects(),
            vec![("p/example.com/privkey.pem".to_owned(), body)]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive/example.com");
        let live = dir.path().join("live");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::create_dir_all(live.join("example.com")).unwrap();
        std::fs::write(archive.join("cert1.pem"), "cert").unwrap();
        std::os::unix::fs::symlink(
            archive.join("cert1.pem"),
            live.join("example.com/cert.pem"),
        )
        .unwrap();

        let store = MemoryStore::new();
        publish(&live, "", &store).await.unwrap();

        assert_eq!(
            store.objects(),
            vec![("example.com/cert.pem".to_owned(), b"cert".to_vec())]
        );
    }

    #[tokio::test]
    async fn stops_at_failed_upload() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live");
        write_bundle(&live, "example.com");

        let store = MemoryStore::failing_on(3);
        let error = publish(&live, "tls", &store).await.unwrap_err();

        let Error::Upload { key, .. } = error else {
            panic!("expected Error::Upload")
        };
        assert!(key.starts_with("tls/example.com/"));
        assert_eq!(store.attempts(), 3);
        assert_eq!(store.objects().len(), 2);
    }

    #[tokio::test]
    async fn missing_root() {
        let dir = tempfile::tempdir().unwrap();

        let store = MemoryStore::new();
        let uploaded = publish(&dir.path().join("live"), "tls", &store)
            .await
            .unwrap();

        assert!(uploaded.is_empty());
        assert_eq!(store.attempts(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_symlink_fails() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live");
        write_bundle(&live, "a.example.com");
        std::os::unix::fs::symlink(
            dir.path().join("archive/a.example.com/cert9.pem"),
            live.join("a.example.com/zz-dangling.pem"),
        )
        .unwrap();

        let store = MemoryStore::new();
        let error = publish(&live, "tls", &store).await.unwrap_err();

        let Error::Io(error) = error else {
            panic!("expected Error::Io")
        };
        assert_eq!(error.kind(), std::io::ErrorKind::NotFound);
        assert_eq!(store.attempts(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live");
        write_bundle(&live, "example.com");
        std::os::unix::fs::symlink(&live, live.join("example.com/loop")).unwrap();

        let store = MemoryStore::new();
        let uploaded = publish(&live, "", &store).await.unwrap();

        assert_eq!(uploaded.len(), BUNDLE_FILES.len());
        assert!(store.keys().iter().all(|key| !key.contains("loop")));
    }
}
