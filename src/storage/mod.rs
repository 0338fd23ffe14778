//! Listing image storage.
//!
//! Listings reference images by a relative path ("path ref"). The store maps
//! refs to files on disk and to public URLs.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Directory (relative to the store root) listing images live in
const LISTING_DIR: &str = "announcements";

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist an image for a listing slot and return its path ref
    async fn save(
        &self,
        listing_id: &str,
        slot: usize,
        extension: &str,
        bytes: Bytes,
    ) -> io::Result<String>;

    /// Remove a stored image. Missing files are not an error.
    async fn delete(&self, path_ref: &str) -> io::Result<()>;

    /// Public URL of a stored image
    fn url_for(&self, path_ref: &str) -> String;
}

/// Images on the local filesystem, served by the static file route
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    root: PathBuf,
    public_url: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a path ref under the root, refusing anything that escapes it
    fn resolve(&self, path_ref: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path_ref);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path_ref.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid image path: {}", path_ref),
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(
        &self,
        listing_id: &str,
        slot: usize,
        extension: &str,
        bytes: Bytes,
    ) -> io::Result<String> {
        let file_name = format!(
            "announcement_{}_{}_{}.{}",
            listing_id,
            slot,
            uuid::Uuid::new_v4().simple(),
            extension
        );
        let path_ref = format!("{}/{}", LISTING_DIR, file_name);
        let path = self.resolve(&path_ref)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        debug!(path = %path.display(), size = bytes.len(), "Stored listing image");
        Ok(path_ref)
    }

    async fn delete(&self, path_ref: &str) -> io::Result<()> {
        let path = self.resolve(path_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted listing image");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn url_for(&self, path_ref: &str) -> String {
        format!("{}/{}", self.public_url, path_ref)
    }
}

/// Best-effort removal of several images; failures are logged, not returned
pub async fn discard_images(store: &dyn ImageStore, path_refs: &[String]) {
    for path_ref in path_refs {
        if let Err(e) = store.delete(path_ref).await {
            warn!(path = %path_ref, error = %e, "Failed to delete listing image");
        }
    }
}
